//! Dossier store: owns dossier records and runs every write as one transaction

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::directory::{self, parse_uuid};
use crate::error::{AppError, ErrorCode, Result};
use crate::evidence;
use crate::guard;
use crate::ledger;
use crate::models::{
    Caller, Comment, CommentView, CreateCommentRequest, CreateDossierRequest, Dossier,
    DossierDetail, DossierFiles, DossierStatus, DossierSummary, EncodedEvidence, EvidenceCategory,
    EvidenceFile, EvidenceUpload, ListQuery, Narrative, Participant, Role, SignatureRecord,
    UpdateDossierRequest,
};
use crate::notify::{NotificationEvent, Notifier, Participants};
use crate::status;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    notifier: Notifier,
}

impl Store {
    pub fn new(pool: SqlitePool, notifier: Notifier) -> Self {
        Self { pool, notifier }
    }

    // Write operations

    /// Create a dossier with its six attachments and an unset signature for
    /// the receiver and every zone manager
    pub async fn create(&self, caller: &Caller, req: CreateDossierRequest) -> Result<Dossier> {
        authorize(caller, &[Role::Worker], "create dossiers")?;
        let files = decode_files(req.files)?;

        let mut tx = self.pool.begin().await?;

        guard::can_create(&mut tx, caller.user_id).await?;
        let receiver =
            directory::worker_by_employee_number(&mut tx, &req.employee_number_receiver).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let narrative = req.narrative;

        sqlx::query(
            r#"
            INSERT INTO dossiers (id, maker_id, receiver_id, general_data, procedure_report, other_facts,
                financial_resources, human_resources, material_resources, area_budget_status,
                programmatic_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(caller.user_id.to_string())
        .bind(receiver.id.to_string())
        .bind(&narrative.general_data)
        .bind(&narrative.procedure_report)
        .bind(&narrative.other_facts)
        .bind(&narrative.financial_resources)
        .bind(&narrative.human_resources)
        .bind(&narrative.material_resources)
        .bind(&narrative.area_budget_status)
        .bind(&narrative.programmatic_status)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut signers = vec![receiver.id];
        signers.extend(directory::zone_managers(&mut tx).await?);
        let records = ledger::create(&mut tx, id, &signers).await?;

        evidence::insert_all(&mut tx, id, &files).await?;

        tx.commit().await?;
        tracing::info!(dossier_id = %id, maker_id = %caller.user_id, signers = records.len(), "Created dossier");

        self.notifier.publish(NotificationEvent::DossierCreated {
            dossier_id: id,
            participants: Participants::from_ledger(caller.user_id, receiver.id, &records),
        });

        Ok(Dossier {
            id,
            maker_id: caller.user_id,
            receiver_id: receiver.id,
            narrative,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the narrative and attachments of a dossier nobody has signed
    pub async fn update(
        &self,
        caller: &Caller,
        dossier_id: Uuid,
        req: UpdateDossierRequest,
    ) -> Result<Dossier> {
        authorize(caller, &[Role::Worker], "update dossiers")?;
        let files = decode_files(req.files)?;

        let mut tx = self.pool.begin().await?;

        let records = guard::can_update(&mut tx, dossier_id, caller.user_id).await?;
        let narrative = req.narrative;

        sqlx::query(
            r#"
            UPDATE dossiers SET general_data = ?, procedure_report = ?, other_facts = ?,
                financial_resources = ?, human_resources = ?, material_resources = ?,
                area_budget_status = ?, programmatic_status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&narrative.general_data)
        .bind(&narrative.procedure_report)
        .bind(&narrative.other_facts)
        .bind(&narrative.financial_resources)
        .bind(&narrative.human_resources)
        .bind(&narrative.material_resources)
        .bind(&narrative.area_budget_status)
        .bind(&narrative.programmatic_status)
        .bind(Utc::now())
        .bind(dossier_id.to_string())
        .execute(&mut *tx)
        .await?;

        evidence::update_all(&mut tx, dossier_id, &files).await?;
        let dossier = fetch_dossier(&mut tx, dossier_id).await?;

        tx.commit().await?;
        tracing::info!(dossier_id = %dossier_id, "Updated dossier");

        self.notifier.publish(NotificationEvent::DossierUpdated {
            dossier_id,
            participants: Participants::from_ledger(dossier.maker_id, dossier.receiver_id, &records),
        });

        Ok(dossier)
    }

    /// Withdraw a dossier nobody has signed, along with everything attached to it
    pub async fn delete(&self, caller: &Caller, dossier_id: Uuid) -> Result<()> {
        authorize(caller, &[Role::Worker], "delete dossiers")?;

        let mut tx = self.pool.begin().await?;

        let records = guard::can_delete(&mut tx, dossier_id, caller.user_id).await?;
        let dossier = fetch_dossier(&mut tx, dossier_id).await?;

        for statement in [
            "DELETE FROM comments WHERE dossier_id = ?",
            "DELETE FROM evidence WHERE dossier_id = ?",
            "DELETE FROM signatures WHERE dossier_id = ?",
            "DELETE FROM dossiers WHERE id = ?",
        ] {
            sqlx::query(statement)
                .bind(dossier_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(dossier_id = %dossier_id, "Deleted dossier");

        self.notifier.publish(NotificationEvent::DossierDeleted {
            dossier_id,
            participants: Participants::from_ledger(dossier.maker_id, dossier.receiver_id, &records),
        });

        Ok(())
    }

    /// Record the caller's acceptance and return the status they now observe
    pub async fn accept(&self, caller: &Caller, dossier_id: Uuid) -> Result<DossierStatus> {
        authorize(
            caller,
            &[Role::Worker, Role::Witness, Role::ZoneManager],
            "accept dossiers",
        )?;

        let mut tx = self.pool.begin().await?;

        let dossier = fetch_dossier(&mut tx, dossier_id).await?;
        ledger::accept(&mut tx, dossier_id, caller.user_id).await?;
        let records = ledger::records(&mut tx, dossier_id).await?;

        tx.commit().await?;

        let observed = status::resolve_for(&records, Some(caller));
        tracing::info!(
            dossier_id = %dossier_id,
            signer_id = %caller.user_id,
            signed = status::signed_count(&records),
            "Accepted dossier"
        );

        self.notifier.publish(NotificationEvent::DossierAccepted {
            dossier_id,
            signer_id: caller.user_id,
            participants: Participants::from_ledger(dossier.maker_id, dossier.receiver_id, &records),
        });

        Ok(observed)
    }

    /// Annotate one section of a dossier
    pub async fn create_comment(
        &self,
        caller: &Caller,
        dossier_id: Uuid,
        req: CreateCommentRequest,
    ) -> Result<Comment> {
        authorize(caller, &[Role::ZoneManager], "comment on dossiers")?;

        let mut tx = self.pool.begin().await?;

        let dossier = fetch_dossier(&mut tx, dossier_id).await?;
        let category = evidence::validate_category(&mut tx, &req.category_name).await?;
        let records = ledger::records(&mut tx, dossier_id).await?;

        let comment = Comment {
            id: Uuid::new_v4(),
            dossier_id,
            author_id: caller.user_id,
            category_id: category.id,
            text: req.text,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO comments (id, dossier_id, author_id, category_id, text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.id.to_string())
        .bind(dossier_id.to_string())
        .bind(caller.user_id.to_string())
        .bind(category.id)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(dossier_id = %dossier_id, comment_id = %comment.id, category = %category.name, "Created comment");

        self.notifier.publish(NotificationEvent::CommentCreated {
            dossier_id,
            comment_id: comment.id,
            author_id: caller.user_id,
            category: category.name,
            participants: Participants::from_ledger(dossier.maker_id, dossier.receiver_id, &records),
        });

        Ok(comment)
    }

    // Read operations

    pub async fn get(&self, caller: &Caller, dossier_id: Uuid) -> Result<DossierDetail> {
        authorize(caller, &[Role::Worker, Role::ZoneManager], "view dossiers")?;

        let mut conn = self.pool.acquire().await?;

        let dossier = fetch_dossier(&mut conn, dossier_id).await?;
        let records = ledger::records(&mut conn, dossier_id).await?;
        let files = slot_files(dossier_id, evidence::for_dossier(&mut conn, dossier_id).await?)?;
        let people =
            directory::participants(&mut conn, &[dossier.maker_id, dossier.receiver_id]).await?;

        Ok(DossierDetail {
            maker: participant_of(&people, dossier.maker_id)?,
            receiver: participant_of(&people, dossier.receiver_id)?,
            status: status::resolve_for(&records, Some(caller)),
            files,
            dossier,
        })
    }

    /// Dossiers the caller handed over, newest first. The text filter matches
    /// the receiver's name or employee number.
    pub async fn list_made(&self, caller: &Caller, query: &ListQuery) -> Result<Vec<DossierSummary>> {
        authorize(caller, &[Role::Worker], "list their dossiers")?;
        let page = query.page();

        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, DossierRow>(
            r#"
            SELECT id, maker_id, receiver_id, general_data, procedure_report, other_facts,
                financial_resources, human_resources, material_resources, area_budget_status,
                programmatic_status, created_at, updated_at
            FROM dossiers
            WHERE maker_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(caller.user_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        let summaries = summarize(&mut conn, rows, None).await?;
        Ok(page.apply(
            summaries
                .into_iter()
                .filter(|s| page.matches(&[s.receiver.full_name.as_str(), s.receiver.employee_number.as_str()]))
                .collect(),
        ))
    }

    /// Dossiers the caller must sign, newest first. The text filter matches
    /// the maker's name or employee number. Filtering by status is the zone
    /// manager queue view.
    pub async fn list_received(
        &self,
        caller: &Caller,
        query: &ListQuery,
        status_filter: Option<DossierStatus>,
    ) -> Result<Vec<DossierSummary>> {
        match status_filter {
            Some(_) => authorize(caller, &[Role::ZoneManager], "review dossier queues")?,
            None => authorize(
                caller,
                &[Role::Worker, Role::ZoneManager, Role::Witness],
                "list received dossiers",
            )?,
        }
        let page = query.page();

        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, DossierRow>(
            r#"
            SELECT d.id, d.maker_id, d.receiver_id, d.general_data, d.procedure_report, d.other_facts,
                d.financial_resources, d.human_resources, d.material_resources, d.area_budget_status,
                d.programmatic_status, d.created_at, d.updated_at
            FROM dossiers d
            JOIN signatures s ON s.dossier_id = d.id
            WHERE s.signer_id = ?
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(caller.user_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

        let summaries = summarize(&mut conn, rows, Some(caller)).await?;
        Ok(page.apply(
            summaries
                .into_iter()
                .filter(|s| status_filter.map_or(true, |wanted| s.status == wanted))
                .filter(|s| page.matches(&[s.maker.full_name.as_str(), s.maker.employee_number.as_str()]))
                .collect(),
        ))
    }

    /// Comments left on one section of a dossier, oldest first
    pub async fn list_comments(
        &self,
        caller: &Caller,
        dossier_id: Uuid,
        category_name: &str,
    ) -> Result<Vec<CommentView>> {
        authorize(caller, &[Role::Worker, Role::ZoneManager], "read comments")?;

        let mut conn = self.pool.acquire().await?;

        fetch_dossier(&mut conn, dossier_id).await?;
        let category = evidence::validate_category(&mut conn, category_name).await?;

        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.text, c.created_at, u.id AS author_id, u.employee_number, u.full_name
            FROM comments c
            JOIN users u ON u.id = c.author_id
            WHERE c.dossier_id = ? AND c.category_id = ?
            ORDER BY c.created_at ASC
            "#,
        )
        .bind(dossier_id.to_string())
        .bind(category.id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CommentView {
                    id: parse_uuid(&row.id)?,
                    text: row.text,
                    category_name: category.name.clone(),
                    author: Participant {
                        id: parse_uuid(&row.author_id)?,
                        employee_number: row.employee_number,
                        full_name: row.full_name,
                    },
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

fn authorize(caller: &Caller, roles: &[Role], action: &str) -> Result<()> {
    if caller.has_any(roles) {
        return Ok(());
    }

    tracing::debug!(user_id = %caller.user_id, action, "Role check failed");
    Err(AppError::Unauthorized(format!(
        "User {} is not allowed to {}",
        caller.user_id, action
    )))
}

/// Decode and slot-check every upload before the transaction opens
fn decode_files(files: DossierFiles<EvidenceUpload>) -> Result<[EvidenceFile; 6]> {
    let files = files.try_map(EvidenceUpload::decode)?.into_array();
    evidence::check_slots(&files)?;
    Ok(files)
}

/// Place stored attachments into their slots of the detail view
fn slot_files(dossier_id: Uuid, files: Vec<EvidenceFile>) -> Result<DossierFiles<EncodedEvidence>> {
    let mut by_category: HashMap<EvidenceCategory, EvidenceFile> = HashMap::new();
    for file in files {
        if let Ok(category) = file.category.parse::<EvidenceCategory>() {
            by_category.insert(category, file);
        }
    }

    let mut take = |category: EvidenceCategory| -> Result<EncodedEvidence> {
        by_category.remove(&category).map(Into::into).ok_or_else(|| {
            AppError::Internal(format!(
                "Dossier {} has no {} evidence",
                dossier_id,
                category.as_str()
            ))
        })
    };

    Ok(DossierFiles {
        procedure_report_file: take(EvidenceCategory::Report)?,
        financial_resources_file: take(EvidenceCategory::Finance)?,
        human_resources_file: take(EvidenceCategory::Human)?,
        material_resources_file: take(EvidenceCategory::Material)?,
        area_budget_status_file: take(EvidenceCategory::Budget)?,
        programmatic_status_file: take(EvidenceCategory::Programmatic)?,
    })
}

fn participant_of(people: &HashMap<Uuid, Participant>, id: Uuid) -> Result<Participant> {
    people
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::not_found(ErrorCode::UserNotFound))
}

async fn fetch_dossier(conn: &mut SqliteConnection, id: Uuid) -> Result<Dossier> {
    sqlx::query_as::<_, DossierRow>(
        r#"
        SELECT id, maker_id, receiver_id, general_data, procedure_report, other_facts,
            financial_resources, human_resources, material_resources, area_budget_status,
            programmatic_status, created_at, updated_at
        FROM dossiers
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found(ErrorCode::DossierNotFound))?
    .try_into()
}

/// Build listing entries, resolving each status from its ledger
async fn summarize(
    conn: &mut SqliteConnection,
    rows: Vec<DossierRow>,
    viewer: Option<&Caller>,
) -> Result<Vec<DossierSummary>> {
    let dossiers = rows
        .into_iter()
        .map(Dossier::try_from)
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<Uuid> = dossiers.iter().map(|d| d.id).collect();
    let ledgers = ledger::records_by_dossier(conn, &ids).await?;

    let mut user_ids: Vec<Uuid> = dossiers
        .iter()
        .flat_map(|d| [d.maker_id, d.receiver_id])
        .collect();
    user_ids.sort();
    user_ids.dedup();
    let people = directory::participants(conn, &user_ids).await?;

    dossiers
        .into_iter()
        .map(|d| {
            let records: &[SignatureRecord] = ledgers.get(&d.id).map(Vec::as_slice).unwrap_or(&[]);
            Ok(DossierSummary {
                dossier_id: d.id,
                maker: participant_of(&people, d.maker_id)?,
                receiver: participant_of(&people, d.receiver_id)?,
                status: status::resolve_for(records, viewer),
                created_at: d.created_at,
            })
        })
        .collect()
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct DossierRow {
    id: String,
    maker_id: String,
    receiver_id: String,
    general_data: String,
    procedure_report: String,
    other_facts: String,
    financial_resources: String,
    human_resources: String,
    material_resources: String,
    area_budget_status: String,
    programmatic_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DossierRow> for Dossier {
    type Error = AppError;

    fn try_from(row: DossierRow) -> Result<Self> {
        Ok(Dossier {
            id: parse_uuid(&row.id)?,
            maker_id: parse_uuid(&row.maker_id)?,
            receiver_id: parse_uuid(&row.receiver_id)?,
            narrative: Narrative {
                general_data: row.general_data,
                procedure_report: row.procedure_report,
                other_facts: row.other_facts,
                financial_resources: row.financial_resources,
                human_resources: row.human_resources,
                material_resources: row.material_resources,
                area_budget_status: row.area_budget_status,
                programmatic_status: row.programmatic_status,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: String,
    text: String,
    created_at: DateTime<Utc>,
    author_id: String,
    employee_number: String,
    full_name: String,
}
