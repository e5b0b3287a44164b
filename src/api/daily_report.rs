use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate, date_opt};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::daily_report::{
    DailyReportFilter, SORTABLE, create_daily_report, delete_daily_report, get_daily_report,
    get_daily_report_detail, list_daily_reports, update_daily_report,
};
use crate::db::query::Page;
use crate::error::AppError;
use crate::models::daily_report::{DailyReport, DailyReportDetail, DailyReportInput};
use crate::validation::JsonValidateExt;

#[get("/daily-report?<facility_id>&<from>&<to>&<params..>")]
pub async fn api_list_daily_reports(
    facility_id: Option<i64>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<DailyReport>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = DailyReportFilter {
        facility_id,
        from: date_opt(from),
        to: date_opt(to),
    };
    let request = params.resolve(config, SORTABLE, "r.report_date");
    let page = list_daily_reports(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "日報一覧を取得しました。"))
}

#[get("/daily-report/<id>")]
pub async fn api_get_daily_report(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DailyReportDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_daily_report_detail(db, id).await?;
    user.ensure_facility(detail.report.facility_id)?;

    Ok(ApiResponse::success(detail, "日報を取得しました。"))
}

#[post("/daily-report", data = "<input>")]
pub async fn api_create_daily_report(
    input: Json<DailyReportInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DailyReportDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    user.ensure_facility(input.facility_id)?;

    let id = create_daily_report(db, &input, user.id).await?;
    let detail = get_daily_report_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "日報を登録しました。"))
}

#[put("/daily-report/<id>", data = "<input>")]
pub async fn api_update_daily_report(
    id: i64,
    input: Json<DailyReportInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DailyReportDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let existing = get_daily_report(db, id).await?;
    user.ensure_facility(existing.facility_id)?;
    user.ensure_facility(input.facility_id)?;

    update_daily_report(db, id, &input).await?;
    let detail = get_daily_report_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "日報を更新しました。"))
}

#[delete("/daily-report/<id>")]
pub async fn api_delete_daily_report(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_daily_report(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_daily_report(db, id).await?;
    Ok(ApiResponse::message("日報を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_daily_reports,
        api_get_daily_report,
        api_create_daily_report,
        api_update_daily_report,
        api_delete_daily_report,
    ]
}
