//! Evidence categorizer: attachment taxonomy checks and content storage
//!
//! Attachments arrive base64-encoded and are decoded exactly once, by
//! [`EvidenceUpload::decode`], before any storage call. Everything below the
//! boundary handles content as opaque bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{AppError, ErrorCode, Result};
use crate::models::{Category, EncodedEvidence, EvidenceCategory, EvidenceFile, EvidenceUpload};

impl EvidenceUpload {
    pub fn decode(self) -> Result<EvidenceFile> {
        let content = STANDARD.decode(self.content.trim()).map_err(|e| {
            AppError::InvalidInput(format!(
                "Content of evidence '{}' is not valid base64: {}",
                self.name, e
            ))
        })?;

        Ok(EvidenceFile {
            category: self.category,
            name: self.name,
            content,
        })
    }
}

impl From<EvidenceFile> for EncodedEvidence {
    fn from(file: EvidenceFile) -> Self {
        EncodedEvidence {
            content: STANDARD.encode(&file.content),
            category: file.category,
            name: file.name,
        }
    }
}

/// Every attachment slot of a dossier accepts only its own required
/// category, in [`EvidenceCategory::REQUIRED`] order. Comment-only
/// categories never fill a slot.
pub fn check_slots(files: &[EvidenceFile]) -> Result<()> {
    if files.len() != EvidenceCategory::REQUIRED.len() {
        return Err(AppError::InvalidInput(format!(
            "Expected {} evidence files, got {}",
            EvidenceCategory::REQUIRED.len(),
            files.len()
        )));
    }

    for (file, expected) in files.iter().zip(EvidenceCategory::REQUIRED) {
        if file.category != expected.as_str() {
            return Err(AppError::NotFound {
                code: ErrorCode::CategoryNotFound,
                message: format!(
                    "Evidence '{}' has category '{}' where '{}' is required",
                    file.name,
                    file.category,
                    expected.as_str()
                ),
            });
        }
    }

    Ok(())
}

/// Exact-match lookup of a category in the seeded taxonomy
pub async fn validate_category(conn: &mut SqliteConnection, name: &str) -> Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name FROM categories WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound {
        code: ErrorCode::CategoryNotFound,
        message: format!("Evidence category '{}' is not registered", name),
    })
}

/// Resolve the category of every file, rejecting two files in one category
async fn categorize<'a>(
    conn: &mut SqliteConnection,
    files: &'a [EvidenceFile],
) -> Result<Vec<(Category, &'a EvidenceFile)>> {
    let mut seen = HashSet::new();
    let mut categorized = Vec::with_capacity(files.len());

    for file in files {
        let category = validate_category(conn, &file.category).await?;
        if !seen.insert(category.id) {
            return Err(AppError::InvalidInput(format!(
                "More than one evidence file for category '{}'",
                category.name
            )));
        }
        categorized.push((category, file));
    }

    Ok(categorized)
}

/// Store the attachments of a new dossier. Runs on the creating transaction.
pub async fn insert_all(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    files: &[EvidenceFile],
) -> Result<()> {
    let categorized = categorize(conn, files).await?;

    for (category, file) in categorized {
        sqlx::query(
            r#"
            INSERT INTO evidence (id, dossier_id, category_id, name, content)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(dossier_id.to_string())
        .bind(category.id)
        .bind(&file.name)
        .bind(&file.content)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Replace the attachments of an existing dossier, matched by category.
///
/// Only existing rows are updated. A category with no stored row matches
/// nothing and is skipped without error. Returns the number of rows updated.
pub async fn update_all(
    conn: &mut SqliteConnection,
    dossier_id: Uuid,
    files: &[EvidenceFile],
) -> Result<u64> {
    let categorized = categorize(conn, files).await?;
    let mut updated = 0;

    for (category, file) in categorized {
        let result = sqlx::query(
            r#"
            UPDATE evidence SET name = ?, content = ?
            WHERE dossier_id = ? AND category_id = ?
            "#,
        )
        .bind(&file.name)
        .bind(&file.content)
        .bind(dossier_id.to_string())
        .bind(category.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                dossier_id = %dossier_id,
                category = %category.name,
                "No evidence row to update"
            );
        }
        updated += result.rows_affected();
    }

    Ok(updated)
}

/// All attachments of a dossier with their category names
pub async fn for_dossier(conn: &mut SqliteConnection, dossier_id: Uuid) -> Result<Vec<EvidenceFile>> {
    let rows = sqlx::query_as::<_, EvidenceRow>(
        r#"
        SELECT c.name AS category, e.name, e.content
        FROM evidence e
        JOIN categories c ON c.id = e.category_id
        WHERE e.dossier_id = ?
        ORDER BY c.id ASC
        "#,
    )
    .bind(dossier_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| EvidenceFile {
            category: r.category,
            name: r.name,
            content: r.content,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct EvidenceRow {
    category: String,
    name: String,
    content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{register, setup_test_db, upload};
    use chrono::Utc;
    use sqlx::SqlitePool;

    async fn insert_bare_dossier(pool: &SqlitePool) -> Uuid {
        let maker = register(pool, &format!("W-{}", Uuid::new_v4()), &[Role::Worker]).await;
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
        .bind(maker.to_string())
        .bind(maker.to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn files(content: &[u8]) -> Vec<EvidenceFile> {
        EvidenceCategory::REQUIRED
            .iter()
            .map(|c| upload(c.as_str(), content).decode().unwrap())
            .collect()
    }

    #[test]
    fn test_decode_base64_content() {
        let file = upload("report", b"raw bytes \x00\x01").decode().unwrap();
        assert_eq!(file.content, b"raw bytes \x00\x01".to_vec());
        assert_eq!(file.category, "report");
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        let bad = EvidenceUpload {
            category: "report".to_string(),
            name: "report.pdf".to_string(),
            content: "not base64!!".to_string(),
        };
        assert!(matches!(bad.decode().unwrap_err(), AppError::InvalidInput(_)));
    }

    #[test]
    fn test_encode_for_readers() {
        let encoded: EncodedEvidence = EvidenceFile {
            category: "finance".to_string(),
            name: "f.pdf".to_string(),
            content: b"hi".to_vec(),
        }
        .into();
        assert_eq!(encoded.content, "aGk=");
    }

    #[test]
    fn test_check_slots_accepts_required_order() {
        check_slots(&files(b"v1")).unwrap();
    }

    #[test]
    fn test_check_slots_rejects_comment_only_category() {
        for comment_only in ["data", "other"] {
            let mut files = files(b"v1");
            files[0].category = comment_only.to_string();
            let err = check_slots(&files).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::CategoryNotFound));
        }
    }

    #[test]
    fn test_check_slots_rejects_swapped_categories() {
        let mut files = files(b"v1");
        files.swap(1, 2);
        let err = check_slots(&files).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CategoryNotFound));

        let err = check_slots(&files[..5]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_validate_seeded_categories() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        for name in ["report", "finance", "human", "material", "budget", "programmatic", "data", "other"] {
            let category = validate_category(&mut conn, name).await.unwrap();
            assert_eq!(category.name, name);
        }
    }

    #[tokio::test]
    async fn test_validate_category_is_exact_match() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        for name in ["Report", "report ", "reports", ""] {
            let err = validate_category(&mut conn, name).await.unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::CategoryNotFound));
        }
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let pool = setup_test_db().await;
        let dossier = insert_bare_dossier(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        insert_all(&mut conn, dossier, &files(b"v1")).await.unwrap();

        let stored = for_dossier(&mut conn, dossier).await.unwrap();
        assert_eq!(stored.len(), 6);
        assert!(stored.iter().all(|f| f.content == b"v1".to_vec()));
        assert_eq!(stored[0].category, "report");
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_category() {
        let pool = setup_test_db().await;
        let dossier = insert_bare_dossier(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let mut files = files(b"v1");
        files[1].category = "report".to_string();
        let err = insert_all(&mut conn, dossier, &files).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(for_dossier(&mut conn, dossier).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let pool = setup_test_db().await;
        let dossier = insert_bare_dossier(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        insert_all(&mut conn, dossier, &files(b"v1")).await.unwrap();
        let updated = update_all(&mut conn, dossier, &files(b"v2")).await.unwrap();
        assert_eq!(updated, 6);

        let stored = for_dossier(&mut conn, dossier).await.unwrap();
        assert!(stored.iter().all(|f| f.content == b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_update_without_rows_is_silent_noop() {
        let pool = setup_test_db().await;
        let dossier = insert_bare_dossier(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let updated = update_all(&mut conn, dossier, &files(b"v2")).await.unwrap();
        assert_eq!(updated, 0);
        assert!(for_dossier(&mut conn, dossier).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_category_is_not_found() {
        let pool = setup_test_db().await;
        let dossier = insert_bare_dossier(&pool).await;
        let mut conn = pool.acquire().await.unwrap();

        let mut files = files(b"v2");
        files[5].category = "unknown".to_string();
        let err = update_all(&mut conn, dossier, &files).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::CategoryNotFound));
    }
}
