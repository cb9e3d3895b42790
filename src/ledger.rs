//! Signature ledger: one acceptance row per required signer of a dossier

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use uuid::Uuid;

use crate::directory::parse_uuid;
use crate::error::{AppError, ErrorCode, Result};
use crate::models::{Acceptance, SignatureRecord};

/// Insert an unset row for every signer. Must run on the transaction that
/// creates the dossier. Repeated signer ids get a single row.
pub async fn create(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    signer_ids: &[Uuid],
) -> Result<Vec<SignatureRecord>> {
    let now = Utc::now();
    let mut records: Vec<SignatureRecord> = Vec::with_capacity(signer_ids.len());

    for signer_id in signer_ids {
        if records.iter().any(|r| r.signer_id == *signer_id) {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO signatures (dossier_id, signer_id, accepted, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(dossier_id.to_string())
        .bind(signer_id.to_string())
        .bind(Acceptance::Unset.to_column())
        .bind(now)
        .execute(&mut *conn)
        .await?;

        records.push(SignatureRecord {
            dossier_id,
            signer_id: *signer_id,
            accepted: Acceptance::Unset,
        });
    }

    Ok(records)
}

/// Grant a signer's acceptance. Granting twice leaves the row granted.
pub async fn accept(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    signer_id: Uuid,
) -> Result<SignatureRecord> {
    let result = sqlx::query(
        r#"
        UPDATE signatures SET accepted = ?, updated_at = ?
        WHERE dossier_id = ? AND signer_id = ?
        "#,
    )
    .bind(Acceptance::Granted.to_column())
    .bind(Utc::now())
    .bind(dossier_id.to_string())
    .bind(signer_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(ErrorCode::SignatureNotFound));
    }

    Ok(SignatureRecord {
        dossier_id,
        signer_id,
        accepted: Acceptance::Granted,
    })
}

/// All ledger rows of one dossier, in creation order
pub async fn records(conn: &mut SqliteConnection, dossier_id: Uuid) -> Result<Vec<SignatureRecord>> {
    let rows = sqlx::query_as::<_, SignatureRow>(
        r#"
        SELECT dossier_id, signer_id, accepted
        FROM signatures
        WHERE dossier_id = ?
        ORDER BY rowid ASC
        "#,
    )
    .bind(dossier_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

/// Ledger rows of several dossiers grouped by dossier id. Dossiers without
/// rows map to an empty ledger.
pub async fn records_by_dossier(
    conn: &mut SqliteConnection,
    dossier_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<SignatureRecord>>> {
    let mut grouped: HashMap<Uuid, Vec<SignatureRecord>> =
        dossier_ids.iter().map(|id| (*id, Vec::new())).collect();
    if dossier_ids.is_empty() {
        return Ok(grouped);
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT dossier_id, signer_id, accepted FROM signatures WHERE dossier_id IN (",
    );
    let mut ids = builder.separated(", ");
    for id in dossier_ids {
        ids.push_bind(id.to_string());
    }
    ids.push_unseparated(") ORDER BY rowid ASC");

    let rows = builder
        .build_query_as::<SignatureRow>()
        .fetch_all(&mut *conn)
        .await?;

    for row in rows {
        let record: SignatureRecord = row.try_into()?;
        grouped.entry(record.dossier_id).or_default().push(record);
    }

    Ok(grouped)
}

#[derive(sqlx::FromRow)]
struct SignatureRow {
    dossier_id: String,
    signer_id: String,
    accepted: Option<bool>,
}

impl TryFrom<SignatureRow> for SignatureRecord {
    type Error = AppError;

    fn try_from(row: SignatureRow) -> Result<Self> {
        Ok(SignatureRecord {
            dossier_id: parse_uuid(&row.dossier_id)?,
            signer_id: parse_uuid(&row.signer_id)?,
            accepted: Acceptance::from_column(row.accepted),
        })
    }
}
