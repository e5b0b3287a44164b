use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate, date_opt};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::query::Page;
use crate::db::session_record::{
    SORTABLE, SessionRecordFilter, create_session_record, delete_session_record,
    get_session_record, get_session_record_detail, list_session_records, update_session_record,
};
use crate::error::AppError;
use crate::models::session_record::{
    RecordType, SessionRecord, SessionRecordDetail, SessionRecordInput,
};
use crate::validation::JsonValidateExt;

#[get("/session?<record_type>&<facility_id>&<from>&<to>&<params..>")]
#[allow(clippy::too_many_arguments)]
pub async fn api_list_session_records(
    record_type: Option<RecordType>,
    facility_id: Option<i64>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<SessionRecord>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = SessionRecordFilter {
        record_type,
        facility_id,
        from: date_opt(from),
        to: date_opt(to),
    };
    let request = params.resolve(config, SORTABLE, "sr.held_on");
    let page = list_session_records(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "研修・会議記録一覧を取得しました。"))
}

#[get("/session/<id>")]
pub async fn api_get_session_record(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SessionRecordDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_session_record_detail(db, id).await?;
    user.ensure_facility(detail.record.facility_id)?;

    Ok(ApiResponse::success(detail, "研修・会議記録を取得しました。"))
}

#[post("/session", data = "<input>")]
pub async fn api_create_session_record(
    input: Json<SessionRecordInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SessionRecordDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    user.ensure_facility(input.facility_id)?;

    let id = create_session_record(db, &input, user.id).await?;
    let detail = get_session_record_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "研修・会議記録を登録しました。"))
}

#[put("/session/<id>", data = "<input>")]
pub async fn api_update_session_record(
    id: i64,
    input: Json<SessionRecordInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SessionRecordDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let existing = get_session_record(db, id).await?;
    user.ensure_facility(existing.facility_id)?;
    user.ensure_facility(input.facility_id)?;

    update_session_record(db, id, &input).await?;
    let detail = get_session_record_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "研修・会議記録を更新しました。"))
}

#[delete("/session/<id>")]
pub async fn api_delete_session_record(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_session_record(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_session_record(db, id).await?;
    Ok(ApiResponse::message("研修・会議記録を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_session_records,
        api_get_session_record,
        api_create_session_record,
        api_update_session_record,
        api_delete_session_record,
    ]
}
