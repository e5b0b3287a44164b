use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate, date_opt};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::deposit::{
    DepositFilter, SORTABLE, create_deposit, delete_deposit, get_deposit, get_deposit_detail,
    list_deposits, update_deposit,
};
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::deposit::{Deposit, DepositDetail, DepositInput};
use crate::validation::JsonValidateExt;

#[get("/deposit?<service_user_id>&<facility_id>&<from>&<to>&<params..>")]
pub async fn api_list_deposits(
    service_user_id: Option<i64>,
    facility_id: Option<i64>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<Deposit>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = DepositFilter {
        service_user_id,
        facility_id,
        from: date_opt(from),
        to: date_opt(to),
    };
    let request = params.resolve(config, SORTABLE, "dp.deposit_date");
    let page = list_deposits(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "預り金一覧を取得しました。"))
}

#[get("/deposit/<id>")]
pub async fn api_get_deposit(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DepositDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_deposit_detail(db, id).await?;
    user.ensure_facility(detail.deposit.facility_id)?;

    Ok(ApiResponse::success(detail, "預り金を取得しました。"))
}

#[post("/deposit", data = "<input>")]
pub async fn api_create_deposit(
    input: Json<DepositInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DepositDetail>, AppError> {
    user.require_permission(Permission::ManageDeposits)?;
    let input = input.validated()?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    let id = create_deposit(db, service_user.facility_id, &input, user.id).await?;
    let detail = get_deposit_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "預り金を登録しました。"))
}

#[put("/deposit/<id>", data = "<input>")]
pub async fn api_update_deposit(
    id: i64,
    input: Json<DepositInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<DepositDetail>, AppError> {
    user.require_permission(Permission::ManageDeposits)?;
    let input = input.validated()?;

    let existing = get_deposit(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    update_deposit(db, id, service_user.facility_id, &input).await?;
    let detail = get_deposit_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "預り金を更新しました。"))
}

#[delete("/deposit/<id>")]
pub async fn api_delete_deposit(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageDeposits)?;
    let existing = get_deposit(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_deposit(db, id).await?;
    Ok(ApiResponse::message("預り金を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_deposits,
        api_get_deposit,
        api_create_deposit,
        api_update_deposit,
        api_delete_deposit,
    ]
}
