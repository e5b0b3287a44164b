use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::db::document::set_document_status;
use crate::error::AppError;
use crate::models::document::DocumentStatus;
use crate::models::signature::{Signature, SignatureDocumentType, SignatureInput};

/// Facility of the signed row, or 404 when it does not exist.
pub async fn target_facility(
    conn: &mut SqliteConnection,
    document_type: SignatureDocumentType,
    document_id: i64,
) -> Result<i64, AppError> {
    let sql = format!("SELECT facility_id FROM {} WHERE id = ?", document_type.table());
    sqlx::query_scalar::<_, i64>(&sql)
        .bind(document_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(document_type.label(), document_id))
}

/// Drops every signature on the row. Callers run this in the transaction that
/// deletes the row itself.
pub async fn delete_signatures_for(
    conn: &mut SqliteConnection,
    document_type: SignatureDocumentType,
    document_id: i64,
) -> Result<u64, AppError> {
    let res = sqlx::query("DELETE FROM signatures WHERE document_type = ? AND document_id = ?")
        .bind(document_type)
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
    Ok(res.rows_affected())
}

/// Signatures on everything owned by a service user that the delete cascades
/// to: documents (including information consents) and support plans.
pub async fn delete_service_user_signatures(
    conn: &mut SqliteConnection,
    service_user_id: i64,
) -> Result<u64, AppError> {
    let res = sqlx::query(
        "DELETE FROM signatures
         WHERE (document_type = 'document'
                AND document_id IN (SELECT id FROM documents WHERE service_user_id = ?))
            OR (document_type = 'support_plan'
                AND document_id IN (SELECT id FROM support_plans WHERE service_user_id = ?))",
    )
    .bind(service_user_id)
    .bind(service_user_id)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn list_signatures(
    pool: &Pool<Sqlite>,
    document_type: SignatureDocumentType,
    document_id: i64,
) -> Result<Vec<Signature>, AppError> {
    info!("Listing signatures");
    let signatures = sqlx::query_as::<_, Signature>(
        "SELECT * FROM signatures WHERE document_type = ? AND document_id = ?
         ORDER BY signed_at, id",
    )
    .bind(document_type)
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(signatures)
}

#[instrument(skip(pool))]
pub async fn get_signature(pool: &Pool<Sqlite>, id: i64) -> Result<Signature, AppError> {
    sqlx::query_as::<_, Signature>("SELECT * FROM signatures WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("署名", id))
}

/// Records the signature; a signed `document` moves to `signed` in the same
/// transaction.
#[instrument(skip(pool, input), fields(document_type = ?input.document_type, document_id = input.document_id))]
pub async fn create_signature(
    pool: &Pool<Sqlite>,
    input: &SignatureInput,
) -> Result<Signature, AppError> {
    info!("Creating signature");
    let mut tx = pool.begin().await?;

    target_facility(&mut tx, input.document_type, input.document_id).await?;

    if let Some(media_id) = input.media_id {
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM media WHERE id = ?")
            .bind(media_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found("メディア", media_id));
        }
    }

    let signature = sqlx::query_as::<_, Signature>(
        "INSERT INTO signatures
            (document_type, document_id, signer_name, signer_role, media_id, signed_at)
         VALUES (?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))
         RETURNING *",
    )
    .bind(input.document_type)
    .bind(input.document_id)
    .bind(&input.signer_name)
    .bind(&input.signer_role)
    .bind(input.media_id)
    .bind(input.signed_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "署名を登録できません。"))?;

    if input.document_type == SignatureDocumentType::Document {
        set_document_status(&mut tx, input.document_id, DocumentStatus::Signed).await?;
    }

    tx.commit().await?;
    Ok(signature)
}

/// Removing the last signature on a `document` returns it to `issued`.
#[instrument(skip(pool))]
pub async fn delete_signature(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting signature");
    let mut tx = pool.begin().await?;

    let signature = sqlx::query_as::<_, Signature>("DELETE FROM signatures WHERE id = ? RETURNING *")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("署名", id))?;

    if signature.document_type == SignatureDocumentType::Document {
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signatures WHERE document_type = 'document' AND document_id = ?",
        )
        .bind(signature.document_id)
        .fetch_one(&mut *tx)
        .await?;

        if remaining == 0 {
            set_document_status(&mut tx, signature.document_id, DocumentStatus::Issued).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}
