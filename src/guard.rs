//! Mutation guard: create/update/delete eligibility checks
//!
//! Every check takes the connection of the transaction that performs the
//! write, so a signature granted after the check cannot slip in before the
//! write commits.

use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::directory::parse_uuid;
use crate::error::{AppError, ErrorCode, Result};
use crate::ledger;
use crate::models::{DossierStatus, SignatureRecord};
use crate::status;

/// A maker may start a new handover only when all of their earlier
/// dossiers are released.
pub async fn can_create(conn: &mut SqliteConnection, maker_id: Uuid) -> Result<()> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM dossiers WHERE maker_id = ?
        "#,
    )
    .bind(maker_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let ids = ids
        .iter()
        .map(|id| parse_uuid(id))
        .collect::<Result<Vec<_>>>()?;

    let ledgers = ledger::records_by_dossier(conn, &ids).await?;
    if let Some((open_id, _)) = ledgers
        .iter()
        .find(|(_, records)| status::resolve(records) != DossierStatus::Released)
    {
        tracing::debug!(maker_id = %maker_id, dossier_id = %open_id, "Maker has an unreleased dossier");
        return Err(AppError::conflict(ErrorCode::DossierAlreadyExistsForWorker));
    }

    Ok(())
}

/// Narrative and evidence may change only while nobody has signed.
/// Returns the ledger rows the decision was based on.
pub async fn can_update(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    maker_id: Uuid,
) -> Result<Vec<SignatureRecord>> {
    require_pending(conn, dossier_id, maker_id, ErrorCode::DossierCannotBeModified).await
}

/// A dossier may be withdrawn only while nobody has signed.
/// Returns the ledger rows the decision was based on.
pub async fn can_delete(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    maker_id: Uuid,
) -> Result<Vec<SignatureRecord>> {
    require_pending(conn, dossier_id, maker_id, ErrorCode::DossierCannotBeDeleted).await
}

async fn require_pending(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    maker_id: Uuid,
    conflict: ErrorCode,
) -> Result<Vec<SignatureRecord>> {
    let owned: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(SELECT 1 FROM dossiers WHERE id = ? AND maker_id = ?)
        "#,
    )
    .bind(dossier_id.to_string())
    .bind(maker_id.to_string())
    .fetch_one(&mut *conn)
    .await?;

    if !owned {
        return Err(AppError::not_found(ErrorCode::DossierNotFound));
    }

    let records = ledger::records(conn, dossier_id).await?;
    let current = status::resolve(&records);
    if current != DossierStatus::Pending {
        tracing::debug!(dossier_id = %dossier_id, status = current.as_str(), "Dossier is no longer pending");
        return Err(AppError::conflict(conflict));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{register, setup_test_db};
    use chrono::Utc;
    use sqlx::SqlitePool;

    struct Fixture {
        pool: SqlitePool,
        maker: Uuid,
        signers: Vec<Uuid>,
    }

    async fn fixture() -> Fixture {
        let pool = setup_test_db().await;
        let maker = register(&pool, "W-1", &[Role::Worker]).await;
        let signers = vec![
            register(&pool, "W-2", &[Role::Worker]).await,
            register(&pool, "ZM-1", &[Role::ZoneManager]).await,
            register(&pool, "ZM-2", &[Role::ZoneManager]).await,
        ];
        Fixture { pool, maker, signers }
    }

    async fn dossier_with_grants(f: &Fixture, granted: usize) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO dossiers (id, maker_id, receiver_id, general_data, procedure_report, other_facts,
                financial_resources, human_resources, material_resources, area_budget_status,
                programmatic_status, created_at, updated_at)
            VALUES (?, ?, ?, '', '', '', '', '', '', '', '', ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(f.maker.to_string())
        .bind(f.signers[0].to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&f.pool)
        .await
        .unwrap();

        let mut conn = f.pool.acquire().await.unwrap();
        ledger::create(&mut conn, id, &f.signers).await.unwrap();
        for signer in f.signers.iter().take(granted) {
            ledger::accept(&mut conn, id, *signer).await.unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_can_create_without_dossiers() {
        let f = fixture().await;
        let mut conn = f.pool.acquire().await.unwrap();
        can_create(&mut conn, f.maker).await.unwrap();
    }

    #[tokio::test]
    async fn test_can_create_blocked_by_pending_or_in_process() {
        let f = fixture().await;
        let pending = dossier_with_grants(&f, 0).await;

        let mut conn = f.pool.acquire().await.unwrap();
        let err = can_create(&mut conn, f.maker).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DossierAlreadyExistsForWorker));

        ledger::accept(&mut conn, pending, f.signers[1]).await.unwrap();
        let err = can_create(&mut conn, f.maker).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_can_create_after_release() {
        let f = fixture().await;
        dossier_with_grants(&f, 3).await;
        dossier_with_grants(&f, 3).await;

        let mut conn = f.pool.acquire().await.unwrap();
        can_create(&mut conn, f.maker).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_makers_do_not_block() {
        let f = fixture().await;
        dossier_with_grants(&f, 1).await;

        let mut conn = f.pool.acquire().await.unwrap();
        can_create(&mut conn, f.signers[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_and_delete_allowed_while_pending() {
        let f = fixture().await;
        let id = dossier_with_grants(&f, 0).await;

        let mut conn = f.pool.acquire().await.unwrap();
        assert_eq!(can_update(&mut conn, id, f.maker).await.unwrap().len(), 3);
        assert_eq!(can_delete(&mut conn, id, f.maker).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete_blocked_once_signed() {
        let f = fixture().await;
        for granted in 1..=3 {
            let id = dossier_with_grants(&f, granted).await;
            let mut conn = f.pool.acquire().await.unwrap();

            let err = can_update(&mut conn, id, f.maker).await.unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::DossierCannotBeModified));

            let err = can_delete(&mut conn, id, f.maker).await.unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::DossierCannotBeDeleted));
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_require_ownership() {
        let f = fixture().await;
        let id = dossier_with_grants(&f, 0).await;

        let mut conn = f.pool.acquire().await.unwrap();
        let err = can_update(&mut conn, id, f.signers[0]).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DossierNotFound));

        let err = can_delete(&mut conn, Uuid::new_v4(), f.maker).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::DossierNotFound));
    }
}
