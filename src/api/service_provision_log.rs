use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate, date_opt};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::query::Page;
use crate::db::service_provision_log::{
    SORTABLE, ServiceProvisionLogFilter, create_service_provision_log,
    delete_service_provision_log, get_service_provision_log, list_service_provision_logs,
    update_service_provision_log,
};
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::service_provision_log::{ServiceProvisionLog, ServiceProvisionLogInput};
use crate::validation::{JsonValidateExt, field_error};

fn check_times(input: &ServiceProvisionLogInput) -> Result<(), AppError> {
    if input.times_in_order() {
        Ok(())
    } else {
        Err(field_error(
            "end_time",
            "終了時刻は開始時刻より後の時刻を指定してください。",
        ))
    }
}

#[get("/service-provision-log?<service_user_id>&<facility_id>&<from>&<to>&<params..>")]
#[allow(clippy::too_many_arguments)]
pub async fn api_list_service_provision_logs(
    service_user_id: Option<i64>,
    facility_id: Option<i64>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<ServiceProvisionLog>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = ServiceProvisionLogFilter {
        service_user_id,
        facility_id,
        from: date_opt(from),
        to: date_opt(to),
    };
    let request = params.resolve(config, SORTABLE, "pl.service_date");
    let page = list_service_provision_logs(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "サービス提供記録一覧を取得しました。"))
}

#[get("/service-provision-log/<id>")]
pub async fn api_get_service_provision_log(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceProvisionLog>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let log = get_service_provision_log(db, id).await?;
    user.ensure_facility(log.facility_id)?;

    Ok(ApiResponse::success(log, "サービス提供記録を取得しました。"))
}

#[post("/service-provision-log", data = "<input>")]
pub async fn api_create_service_provision_log(
    input: Json<ServiceProvisionLogInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceProvisionLog>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_times(&input)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    let id = create_service_provision_log(db, service_user.facility_id, &input).await?;
    let log = get_service_provision_log(db, id).await?;

    Ok(ApiResponse::created(log, "サービス提供記録を登録しました。"))
}

#[put("/service-provision-log/<id>", data = "<input>")]
pub async fn api_update_service_provision_log(
    id: i64,
    input: Json<ServiceProvisionLogInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceProvisionLog>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_times(&input)?;

    let existing = get_service_provision_log(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    update_service_provision_log(db, id, service_user.facility_id, &input).await?;
    let log = get_service_provision_log(db, id).await?;

    Ok(ApiResponse::success(log, "サービス提供記録を更新しました。"))
}

#[delete("/service-provision-log/<id>")]
pub async fn api_delete_service_provision_log(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_service_provision_log(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_service_provision_log(db, id).await?;
    Ok(ApiResponse::message("サービス提供記録を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_service_provision_logs,
        api_get_service_provision_log,
        api_create_service_provision_log,
        api_update_service_provision_log,
        api_delete_service_provision_log,
    ]
}
