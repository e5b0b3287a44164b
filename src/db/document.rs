use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_signatures_for;
use crate::error::AppError;
use crate::models::document::{
    Document, DocumentDetail, DocumentInput, DocumentStatus, DocumentType,
};
use crate::models::signature::SignatureDocumentType;

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "d.created_at"),
    ("title", "d.title"),
    ("issued_date", "d.issued_date"),
    ("status", "d.status"),
];

#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub facility_id: Option<i64>,
    pub service_user_id: Option<i64>,
    pub status: Option<DocumentStatus>,
}

/// Column values for a new `documents` row.
#[derive(Debug, Clone)]
pub struct NewDocument<'a> {
    pub document_type: DocumentType,
    pub facility_id: i64,
    pub service_user_id: Option<i64>,
    pub user_id: Option<i64>,
    pub title: &'a str,
    pub status: DocumentStatus,
    pub issued_date: Option<NaiveDate>,
    pub created_by: Option<i64>,
}

#[instrument(skip(pool))]
pub async fn list_documents(
    pool: &Pool<Sqlite>,
    document_type: DocumentType,
    filter: &DocumentFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Document>, AppError> {
    info!("Listing documents");
    ListQuery::new("SELECT d.*", "documents d", "d.id")
        .eq("d.document_type", document_type.as_str())
        .eq_opt("d.facility_id", filter.facility_id)
        .eq_opt("d.service_user_id", filter.service_user_id)
        .eq_opt("d.status", filter.status.map(|s| s.as_str()))
        .scoped("d.facility_id", scope)
        .search(&["d.title"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn find_document(pool: &Pool<Sqlite>, id: i64) -> Result<Document, AppError> {
    sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("書類", id))
}

/// Fetches a document, treating a row of another type as missing.
#[instrument(skip(pool))]
pub async fn get_document(
    pool: &Pool<Sqlite>,
    id: i64,
    document_type: DocumentType,
) -> Result<Document, AppError> {
    info!("Fetching document");
    let document = find_document(pool, id).await?;
    if document.document_type != document_type {
        return Err(AppError::not_found("書類", id));
    }
    Ok(document)
}

fn decode_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

pub async fn load_metadata(
    pool: &Pool<Sqlite>,
    document_id: i64,
) -> Result<BTreeMap<String, Value>, AppError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT meta_key, meta_value FROM document_metadata WHERE document_id = ?",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(key, value)| (key, decode_value(value)))
        .collect())
}

pub async fn get_document_detail(
    pool: &Pool<Sqlite>,
    id: i64,
    document_type: DocumentType,
) -> Result<DocumentDetail, AppError> {
    let document = get_document(pool, id, document_type).await?;
    let metadata = load_metadata(pool, id).await?;
    Ok(DocumentDetail { document, metadata })
}

pub async fn insert_document(
    conn: &mut SqliteConnection,
    document: &NewDocument<'_>,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO documents
            (document_type, facility_id, service_user_id, user_id, title, status, issued_date,
             created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document.document_type)
    .bind(document.facility_id)
    .bind(document.service_user_id)
    .bind(document.user_id)
    .bind(document.title)
    .bind(document.status)
    .bind(document.issued_date)
    .bind(document.created_by)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "書類を登録できません。"))?;

    Ok(res.last_insert_rowid())
}

async fn write_metadata(
    conn: &mut SqliteConnection,
    document_id: i64,
    metadata: &BTreeMap<String, Value>,
) -> Result<(), AppError> {
    for (key, value) in metadata {
        if value.is_null() {
            sqlx::query("DELETE FROM document_metadata WHERE document_id = ? AND meta_key = ?")
                .bind(document_id)
                .bind(key)
                .execute(&mut *conn)
                .await?;
            continue;
        }

        let encoded = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Failed to encode metadata: {}", e)))?;
        sqlx::query(
            "INSERT INTO document_metadata (document_id, meta_key, meta_value) VALUES (?, ?, ?)
             ON CONFLICT (document_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
        )
        .bind(document_id)
        .bind(key)
        .bind(encoded)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Creates the document and its metadata in one transaction.
#[instrument(skip(pool, input), fields(document_type = document_type.as_str()))]
pub async fn create_document(
    pool: &Pool<Sqlite>,
    document_type: DocumentType,
    input: &DocumentInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating document");
    let mut tx = pool.begin().await?;

    let id = insert_document(
        &mut tx,
        &NewDocument {
            document_type,
            facility_id: input.facility_id,
            service_user_id: input.service_user_id,
            user_id: input.user_id,
            title: &input.title,
            status: input.status.unwrap_or(DocumentStatus::Draft),
            issued_date: input.issued_date,
            created_by: Some(created_by),
        },
    )
    .await?;
    write_metadata(&mut tx, id, &input.metadata).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_document(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &DocumentInput,
) -> Result<(), AppError> {
    info!("Updating document");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE documents
         SET facility_id = ?, service_user_id = ?, user_id = ?, title = ?,
             status = COALESCE(?, status), issued_date = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.facility_id)
    .bind(input.service_user_id)
    .bind(input.user_id)
    .bind(&input.title)
    .bind(input.status)
    .bind(input.issued_date)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "書類を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("書類", id));
    }

    write_metadata(&mut tx, id, &input.metadata).await?;

    tx.commit().await?;
    Ok(())
}

pub async fn set_document_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: DocumentStatus,
) -> Result<(), AppError> {
    let res = sqlx::query(
        "UPDATE documents SET status = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(status)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 0 {
        warn!(document_id = id, "Status update matched no document");
        return Err(AppError::not_found("書類", id));
    }
    Ok(())
}

/// Deletes the document together with any signatures on it.
#[instrument(skip(pool))]
pub async fn delete_document(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting document");
    let mut tx = pool.begin().await?;

    delete_signatures_for(&mut tx, SignatureDocumentType::Document, id).await?;

    let res = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "書類を削除できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("書類", id));
    }

    tx.commit().await?;
    Ok(())
}
