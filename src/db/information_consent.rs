use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::document::{NewDocument, insert_document};
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_signatures_for;
use crate::error::AppError;
use crate::models::document::{DocumentStatus, DocumentType};
use crate::models::information_consent::{InformationConsent, InformationConsentInput};
use crate::models::signature::SignatureDocumentType;

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "ic.created_at"),
    ("consent_date", "ic.consent_date"),
    ("consenter_name", "ic.consenter_name"),
    ("valid_until", "ic.valid_until"),
];

const SELECT: &str =
    "SELECT ic.*, d.facility_id, d.title, d.status AS document_status";
const FROM: &str = "information_consents ic JOIN documents d ON d.id = ic.document_id";

#[instrument(skip(pool))]
pub async fn list_information_consents(
    pool: &Pool<Sqlite>,
    service_user_id: Option<i64>,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<InformationConsent>, AppError> {
    info!("Listing information consents");
    ListQuery::new(SELECT, FROM, "ic.id")
        .eq_opt("ic.service_user_id", service_user_id)
        .scoped("d.facility_id", scope)
        .search(
            &["ic.consenter_name", "ic.purpose", "ic.shared_with"],
            request.search.as_deref(),
        )
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_information_consent(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<InformationConsent, AppError> {
    info!("Fetching information consent");
    sqlx::query_as::<_, InformationConsent>(&format!("{} FROM {} WHERE ic.id = ?", SELECT, FROM))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("情報提供同意", id))
}

/// Creates the backing document and the consent in one transaction.
#[instrument(skip(pool, input))]
pub async fn create_information_consent(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    input: &InformationConsentInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating information consent");
    let mut tx = pool.begin().await?;

    let document_id = insert_document(
        &mut tx,
        &NewDocument {
            document_type: DocumentType::InformationConsent,
            facility_id,
            service_user_id: Some(input.service_user_id),
            user_id: None,
            title: input.title(),
            status: DocumentStatus::Draft,
            issued_date: Some(input.consent_date),
            created_by: Some(created_by),
        },
    )
    .await?;

    let res = sqlx::query(
        "INSERT INTO information_consents
            (document_id, service_user_id, consenter_name, relationship, consent_date, purpose,
             shared_with, valid_until)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(document_id)
    .bind(input.service_user_id)
    .bind(&input.consenter_name)
    .bind(&input.relationship)
    .bind(input.consent_date)
    .bind(&input.purpose)
    .bind(&input.shared_with)
    .bind(input.valid_until)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "情報提供同意を登録できません。"))?;

    tx.commit().await?;
    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, input))]
pub async fn update_information_consent(
    pool: &Pool<Sqlite>,
    id: i64,
    document_id: i64,
    input: &InformationConsentInput,
) -> Result<(), AppError> {
    info!("Updating information consent");
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE information_consents
         SET consenter_name = ?, relationship = ?, consent_date = ?, purpose = ?,
             shared_with = ?, valid_until = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&input.consenter_name)
    .bind(&input.relationship)
    .bind(input.consent_date)
    .bind(&input.purpose)
    .bind(&input.shared_with)
    .bind(input.valid_until)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE documents SET title = ?, issued_date = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.title())
    .bind(input.consent_date)
    .bind(document_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Removing the document cascades to the consent row; its signatures go in
/// the same transaction.
#[instrument(skip(pool))]
pub async fn delete_information_consent(
    pool: &Pool<Sqlite>,
    document_id: i64,
) -> Result<(), AppError> {
    info!("Deleting information consent");
    let mut tx = pool.begin().await?;

    delete_signatures_for(&mut tx, SignatureDocumentType::Document, document_id).await?;

    let res = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "情報提供同意を削除できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("情報提供同意", document_id));
    }

    tx.commit().await?;
    Ok(())
}
