use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::service_provision_log::{ServiceProvisionLog, ServiceProvisionLogInput};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "pl.created_at"),
    ("service_date", "pl.service_date"),
    ("service_type", "pl.service_type"),
];

#[derive(Debug, Default, Clone)]
pub struct ServiceProvisionLogFilter {
    pub service_user_id: Option<i64>,
    pub facility_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_service_provision_logs(
    pool: &Pool<Sqlite>,
    filter: &ServiceProvisionLogFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<ServiceProvisionLog>, AppError> {
    info!("Listing service provision logs");
    ListQuery::new("SELECT pl.*", "service_provision_logs pl", "pl.id")
        .eq_opt("pl.service_user_id", filter.service_user_id)
        .eq_opt("pl.facility_id", filter.facility_id)
        .gte_opt("pl.service_date", filter.from)
        .lte_opt("pl.service_date", filter.to)
        .scoped("pl.facility_id", scope)
        .search(&["pl.service_type", "pl.note"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_service_provision_log(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<ServiceProvisionLog, AppError> {
    info!("Fetching service provision log");
    sqlx::query_as::<_, ServiceProvisionLog>("SELECT * FROM service_provision_logs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("サービス提供記録", id))
}

#[instrument(skip(pool, input), fields(service_user_id = input.service_user_id))]
pub async fn create_service_provision_log(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    input: &ServiceProvisionLogInput,
) -> Result<i64, AppError> {
    info!("Creating service provision log");
    let res = sqlx::query(
        "INSERT INTO service_provision_logs
            (service_user_id, facility_id, service_date, service_type, start_time, end_time,
             pickup, meal_provided, note, staff_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.service_date)
    .bind(&input.service_type)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.pickup)
    .bind(input.meal_provided)
    .bind(&input.note)
    .bind(input.staff_id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "サービス提供記録を登録できません。"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, input))]
pub async fn update_service_provision_log(
    pool: &Pool<Sqlite>,
    id: i64,
    facility_id: i64,
    input: &ServiceProvisionLogInput,
) -> Result<(), AppError> {
    info!("Updating service provision log");
    let res = sqlx::query(
        "UPDATE service_provision_logs
         SET service_user_id = ?, facility_id = ?, service_date = ?, service_type = ?,
             start_time = ?, end_time = ?, pickup = ?, meal_provided = ?, note = ?,
             staff_id = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.service_date)
    .bind(&input.service_type)
    .bind(input.start_time)
    .bind(input.end_time)
    .bind(input.pickup)
    .bind(input.meal_provided)
    .bind(&input.note)
    .bind(input.staff_id)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "サービス提供記録を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("サービス提供記録", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_service_provision_log(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting service provision log");
    let res = sqlx::query("DELETE FROM service_provision_logs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("サービス提供記録", id));
    }
    Ok(())
}
