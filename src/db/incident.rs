use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_signatures_for;
use crate::error::AppError;
use crate::models::incident::{Incident, IncidentInput, IncidentStatus, IncidentType, Severity};
use crate::models::signature::SignatureDocumentType;

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "i.created_at"),
    ("occurred_at", "i.occurred_at"),
    ("severity", "i.severity"),
    ("status", "i.status"),
];

#[derive(Debug, Default, Clone)]
pub struct IncidentFilter {
    pub facility_id: Option<i64>,
    pub service_user_id: Option<i64>,
    pub incident_type: Option<IncidentType>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

#[instrument(skip(pool))]
pub async fn list_incidents(
    pool: &Pool<Sqlite>,
    filter: &IncidentFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Incident>, AppError> {
    info!("Listing incidents");
    ListQuery::new("SELECT i.*", "incidents i", "i.id")
        .eq_opt("i.facility_id", filter.facility_id)
        .eq_opt("i.service_user_id", filter.service_user_id)
        .eq_opt("i.incident_type", filter.incident_type.map(|t| t.as_str()))
        .eq_opt("i.severity", filter.severity.map(|s| s.as_str()))
        .eq_opt("i.status", filter.status.map(|s| s.as_str()))
        .gte_opt("i.occurred_at", filter.from)
        .lte_opt("i.occurred_at", filter.to)
        .scoped("i.facility_id", scope)
        .search(
            &["i.description", "i.place", "i.response"],
            request.search.as_deref(),
        )
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_incident(pool: &Pool<Sqlite>, id: i64) -> Result<Incident, AppError> {
    info!("Fetching incident");
    sqlx::query_as::<_, Incident>("SELECT * FROM incidents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("事故報告", id))
}

#[instrument(skip(pool, input))]
pub async fn create_incident(
    pool: &Pool<Sqlite>,
    input: &IncidentInput,
    reported_by: i64,
) -> Result<i64, AppError> {
    info!("Creating incident report");
    let res = sqlx::query(
        "INSERT INTO incidents
            (facility_id, service_user_id, occurred_at, place, incident_type, severity,
             description, response, prevention, family_notified, status, reported_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.facility_id)
    .bind(input.service_user_id)
    .bind(input.occurred_at)
    .bind(&input.place)
    .bind(input.incident_type)
    .bind(input.severity)
    .bind(&input.description)
    .bind(&input.response)
    .bind(&input.prevention)
    .bind(input.family_notified)
    .bind(input.status)
    .bind(reported_by)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "事故報告を登録できません。"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, input))]
pub async fn update_incident(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &IncidentInput,
) -> Result<(), AppError> {
    info!("Updating incident report");
    let res = sqlx::query(
        "UPDATE incidents
         SET facility_id = ?, service_user_id = ?, occurred_at = ?, place = ?, incident_type = ?,
             severity = ?, description = ?, response = ?, prevention = ?, family_notified = ?,
             status = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.facility_id)
    .bind(input.service_user_id)
    .bind(input.occurred_at)
    .bind(&input.place)
    .bind(input.incident_type)
    .bind(input.severity)
    .bind(&input.description)
    .bind(&input.response)
    .bind(&input.prevention)
    .bind(input.family_notified)
    .bind(input.status)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "事故報告を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("事故報告", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_incident(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting incident report");
    let mut tx = pool.begin().await?;

    delete_signatures_for(&mut tx, SignatureDocumentType::Incident, id).await?;

    let res = sqlx::query("DELETE FROM incidents WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("事故報告", id));
    }

    tx.commit().await?;
    Ok(())
}
