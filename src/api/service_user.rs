use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::consultation::get_consultation;
use crate::db::query::Page;
use crate::db::service_user::{
    SORTABLE, ServiceUserFilter, create_service_user, delete_service_user, get_service_user,
    get_service_user_detail, list_service_users, update_service_user,
};
use crate::error::AppError;
use crate::models::service_user::{
    ServiceUser, ServiceUserDetail, ServiceUserInput, ServiceUserStatus,
};
use crate::validation::{JsonValidateExt, ensure_date_order, field_error};

fn check_dates(input: &ServiceUserInput) -> Result<(), AppError> {
    if let (Some(move_in), Some(move_out)) = (input.move_in_date, input.move_out_date) {
        ensure_date_order(
            move_in,
            move_out,
            "move_out_date",
            "退居日は入居日以降の日付を入力してください。",
        )?;
    }
    Ok(())
}

#[get("/service-user?<facility_id>&<status>&<params..>")]
pub async fn api_list_service_users(
    facility_id: Option<i64>,
    status: Option<ServiceUserStatus>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<ServiceUser>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = ServiceUserFilter {
        facility_id,
        status,
    };
    let request = params.resolve(config, SORTABLE, "s.created_at");
    let page = list_service_users(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "利用者一覧を取得しました。"))
}

#[get("/service-user/<id>")]
pub async fn api_get_service_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceUserDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_service_user_detail(db, id).await?;
    user.ensure_facility(detail.service_user.facility_id)?;

    Ok(ApiResponse::success(detail, "利用者を取得しました。"))
}

#[post("/service-user", data = "<input>")]
pub async fn api_create_service_user(
    input: Json<ServiceUserInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceUserDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_dates(&input)?;

    let consultation_id = input
        .consultation_id
        .ok_or_else(|| field_error("consultation_id", "相談IDは必須です。"))?;
    let consultation = get_consultation(db, consultation_id).await?;
    user.ensure_facility(consultation.facility_id)?;

    let facility_id = input.facility_id.unwrap_or(consultation.facility_id);
    user.ensure_facility(facility_id)?;

    let id = create_service_user(db, consultation.id, facility_id, &input).await?;
    let detail = get_service_user_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "利用者を登録しました。"))
}

#[put("/service-user/<id>", data = "<input>")]
pub async fn api_update_service_user(
    id: i64,
    input: Json<ServiceUserInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ServiceUserDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_dates(&input)?;

    let existing = get_service_user(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    let facility_id = input.facility_id.unwrap_or(existing.facility_id);
    user.ensure_facility(facility_id)?;

    update_service_user(db, id, facility_id, &input).await?;
    let detail = get_service_user_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "利用者を更新しました。"))
}

#[delete("/service-user/<id>")]
pub async fn api_delete_service_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_service_user(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_service_user(db, id).await?;
    Ok(ApiResponse::message("利用者を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_service_users,
        api_get_service_user,
        api_create_service_user,
        api_update_service_user,
        api_delete_service_user,
    ]
}
