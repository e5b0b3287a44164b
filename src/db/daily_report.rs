use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_signatures_for;
use crate::error::AppError;
use crate::models::daily_report::{
    DailyReport, DailyReportDetail, DailyReportInput, DailyReportServiceUser, DailyReportStaff,
};
use crate::models::signature::SignatureDocumentType;

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "r.created_at"),
    ("report_date", "r.report_date"),
];

const DUPLICATE_REPORT: &str = "この施設の同じ日付の日報は既に登録されています。";

#[derive(Debug, Default, Clone)]
pub struct DailyReportFilter {
    pub facility_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_daily_reports(
    pool: &Pool<Sqlite>,
    filter: &DailyReportFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<DailyReport>, AppError> {
    info!("Listing daily reports");
    ListQuery::new("SELECT r.*", "daily_reports r", "r.id")
        .eq_opt("r.facility_id", filter.facility_id)
        .gte_opt("r.report_date", filter.from)
        .lte_opt("r.report_date", filter.to)
        .scoped("r.facility_id", scope)
        .search(&["r.summary", "r.special_notes"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_daily_report(pool: &Pool<Sqlite>, id: i64) -> Result<DailyReport, AppError> {
    info!("Fetching daily report");
    sqlx::query_as::<_, DailyReport>("SELECT * FROM daily_reports WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("日報", id))
}

pub async fn get_daily_report_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<DailyReportDetail, AppError> {
    let report = get_daily_report(pool, id).await?;

    let staffs = sqlx::query_as::<_, DailyReportStaff>(
        "SELECT * FROM daily_report_staffs WHERE daily_report_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let service_users = sqlx::query_as::<_, DailyReportServiceUser>(
        "SELECT * FROM daily_report_service_users WHERE daily_report_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(DailyReportDetail {
        report,
        staffs,
        service_users,
    })
}

async fn replace_children(
    conn: &mut SqliteConnection,
    report_id: i64,
    input: &DailyReportInput,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM daily_report_staffs WHERE daily_report_id = ?")
        .bind(report_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM daily_report_service_users WHERE daily_report_id = ?")
        .bind(report_id)
        .execute(&mut *conn)
        .await?;

    for staff in &input.staffs {
        sqlx::query(
            "INSERT INTO daily_report_staffs (daily_report_id, user_id, shift, start_time, end_time)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(report_id)
        .bind(staff.user_id)
        .bind(&staff.shift)
        .bind(staff.start_time)
        .bind(staff.end_time)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, "日報の明細を登録できません。"))?;
    }

    for entry in &input.service_users {
        sqlx::query(
            "INSERT INTO daily_report_service_users
                (daily_report_id, service_user_id, condition, meal, bath, medication, note)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report_id)
        .bind(entry.service_user_id)
        .bind(&entry.condition)
        .bind(&entry.meal)
        .bind(entry.bath)
        .bind(entry.medication)
        .bind(&entry.note)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, "日報の明細を登録できません。"))?;
    }

    Ok(())
}

/// One report per facility and day; a second one is a conflict.
#[instrument(skip(pool, input), fields(facility_id = input.facility_id))]
pub async fn create_daily_report(
    pool: &Pool<Sqlite>,
    input: &DailyReportInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating daily report");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO daily_reports (facility_id, report_date, weather, summary, special_notes, created_by)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(input.facility_id)
    .bind(input.report_date)
    .bind(&input.weather)
    .bind(&input.summary)
    .bind(&input.special_notes)
    .bind(created_by)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_REPORT))?;
    let id = res.last_insert_rowid();

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_daily_report(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &DailyReportInput,
) -> Result<(), AppError> {
    info!("Updating daily report");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE daily_reports
         SET facility_id = ?, report_date = ?, weather = ?, summary = ?, special_notes = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.facility_id)
    .bind(input.report_date)
    .bind(&input.weather)
    .bind(&input.summary)
    .bind(&input.special_notes)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, DUPLICATE_REPORT))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("日報", id));
    }

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_daily_report(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting daily report");
    let mut tx = pool.begin().await?;

    delete_signatures_for(&mut tx, SignatureDocumentType::DailyReport, id).await?;

    let res = sqlx::query("DELETE FROM daily_reports WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("日報", id));
    }

    tx.commit().await?;
    Ok(())
}
