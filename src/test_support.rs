//! Fixtures shared by the unit tests

use base64::Engine;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::directory::{Directory, NewUser};
use crate::models::{CreateDossierRequest, DossierFiles, EvidenceUpload, Narrative, Role};
use crate::store::MIGRATOR;

pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    MIGRATOR
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub async fn register(pool: &SqlitePool, employee_number: &str, roles: &[Role]) -> Uuid {
    Directory::new(pool.clone())
        .register_user(NewUser {
            employee_number: employee_number.to_string(),
            full_name: format!("User {}", employee_number),
            email: format!("{}@example.com", employee_number.to_lowercase()),
            roles: roles.to_vec(),
        })
        .await
        .expect("Failed to register user")
        .id
}

/// Maker, receiver and the two zone managers of a typical handover
pub struct Roster {
    pub maker: Uuid,
    pub receiver: Uuid,
    pub zone_manager_a: Uuid,
    pub zone_manager_b: Uuid,
}

pub const RECEIVER_EMPLOYEE_NUMBER: &str = "W-200";

pub async fn roster(pool: &SqlitePool) -> Roster {
    Roster {
        maker: register(pool, "W-100", &[Role::Worker]).await,
        receiver: register(pool, RECEIVER_EMPLOYEE_NUMBER, &[Role::Worker]).await,
        zone_manager_a: register(pool, "ZM-1", &[Role::ZoneManager]).await,
        zone_manager_b: register(pool, "ZM-2", &[Role::ZoneManager]).await,
    }
}

pub fn upload(category: &str, content: &[u8]) -> EvidenceUpload {
    EvidenceUpload {
        category: category.to_string(),
        name: format!("{}.pdf", category),
        content: base64::engine::general_purpose::STANDARD.encode(content),
    }
}

pub fn uploads(content: &[u8]) -> DossierFiles<EvidenceUpload> {
    DossierFiles {
        procedure_report_file: upload("report", content),
        financial_resources_file: upload("finance", content),
        human_resources_file: upload("human", content),
        material_resources_file: upload("material", content),
        area_budget_status_file: upload("budget", content),
        programmatic_status_file: upload("programmatic", content),
    }
}

pub fn narrative(tag: &str) -> Narrative {
    Narrative {
        general_data: format!("General data {}", tag),
        procedure_report: format!("Procedure report {}", tag),
        other_facts: format!("Other facts {}", tag),
        financial_resources: format!("Financial resources {}", tag),
        human_resources: format!("Human resources {}", tag),
        material_resources: format!("Material resources {}", tag),
        area_budget_status: format!("Area budget status {}", tag),
        programmatic_status: format!("Programmatic status {}", tag),
    }
}

pub fn create_request(receiver_employee_number: &str) -> CreateDossierRequest {
    CreateDossierRequest {
        narrative: narrative("1"),
        files: uploads(b"Sample content"),
        employee_number_receiver: receiver_employee_number.to_string(),
    }
}
