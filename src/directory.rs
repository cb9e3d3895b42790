//! Typed queries over users and their roles

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{AppError, ErrorCode, Result};
use crate::models::{Caller, Participant, Role};

/// Roles currently held by a user
pub async fn roles_of(conn: &mut SqliteConnection, user_id: Uuid) -> Result<HashSet<Role>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT role FROM user_roles WHERE user_id = ?
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| r.parse().map_err(AppError::Internal))
        .collect()
}

/// Ids of every user holding a role, in employee number order
pub async fn users_with_role(conn: &mut SqliteConnection, role: Role) -> Result<Vec<Uuid>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT u.id
        FROM users u
        JOIN user_roles r ON r.user_id = u.id
        WHERE r.role = ?
        ORDER BY u.employee_number ASC
        "#,
    )
    .bind(role.as_str())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(|id| parse_uuid(id)).collect()
}

pub async fn zone_managers(conn: &mut SqliteConnection) -> Result<Vec<Uuid>> {
    users_with_role(conn, Role::ZoneManager).await
}

/// Look up the receiving worker of a new dossier
pub async fn worker_by_employee_number(
    conn: &mut SqliteConnection,
    employee_number: &str,
) -> Result<Participant> {
    sqlx::query_as::<_, ParticipantRow>(
        r#"
        SELECT u.id, u.employee_number, u.full_name
        FROM users u
        JOIN user_roles r ON r.user_id = u.id
        WHERE u.employee_number = ? AND r.role = ?
        "#,
    )
    .bind(employee_number)
    .bind(Role::Worker.as_str())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(ErrorCode::ReceivingWorkerNotFound))?
    .try_into()
}

/// Load several participants at once, keyed by id
pub async fn participants(
    conn: &mut SqliteConnection,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, Participant>> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, employee_number, full_name FROM users WHERE id IN (");
    let mut ids = builder.separated(", ");
    for id in user_ids {
        ids.push_bind(id.to_string());
    }
    ids.push_unseparated(")");

    let rows = builder
        .build_query_as::<ParticipantRow>()
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter()
        .map(|row| {
            let participant: Participant = row.try_into()?;
            Ok((participant.id, participant))
        })
        .collect()
}

/// A user to register along with their roles
#[derive(Debug, Clone)]
pub struct NewUser {
    pub employee_number: String,
    pub full_name: String,
    pub email: String,
    pub roles: Vec<Role>,
}

/// Pool-backed access to users for the identity layer
#[derive(Clone)]
pub struct Directory {
    pool: SqlitePool,
}

impl Directory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve an authenticated user id into a caller with roles
    pub async fn caller(&self, user_id: Uuid) -> Result<Caller> {
        let mut conn = self.pool.acquire().await?;

        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

        if !exists {
            return Err(AppError::Unauthenticated(format!(
                "User {} is not registered",
                user_id
            )));
        }

        let roles = roles_of(&mut conn, user_id).await?;
        Ok(Caller { user_id, roles })
    }

    /// Register a user with their roles in one transaction
    pub async fn register_user(&self, user: NewUser) -> Result<Participant> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, employee_number, full_name, email, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&user.employee_number)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await?;

        let roles: HashSet<Role> = user.roles.iter().copied().collect();
        for role in roles {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role) VALUES (?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(user_id = %id, employee_number = %user.employee_number, "Registered user");

        Ok(Participant {
            id,
            employee_number: user.employee_number,
            full_name: user.full_name,
        })
    }
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    employee_number: String,
    full_name: String,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Participant {
            id: parse_uuid(&row.id)?,
            employee_number: row.employee_number,
            full_name: row.full_name,
        })
    }
}
