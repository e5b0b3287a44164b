use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::facility::{
    SORTABLE, assign_member, create_facility, delete_facility, get_facility, list_facilities,
    list_members, remove_member, update_facility,
};
use crate::db::query::Page;
use crate::db::users::get_user;
use crate::error::AppError;
use crate::models::facility::{
    Facility, FacilityInput, FacilityMember, FacilityMemberInput, FacilityType,
};
use crate::validation::JsonValidateExt;

#[get("/facility?<facility_type>&<params..>")]
pub async fn api_list_facilities(
    facility_type: Option<FacilityType>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<Facility>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let request = params.resolve(config, SORTABLE, "f.created_at");
    let page = list_facilities(db, facility_type, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "施設一覧を取得しました。"))
}

#[get("/facility/<id>")]
pub async fn api_get_facility(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Facility>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let facility = get_facility(db, id).await?;
    user.ensure_facility(facility.id)?;

    Ok(ApiResponse::success(facility, "施設を取得しました。"))
}

#[post("/facility", data = "<input>")]
pub async fn api_create_facility(
    input: Json<FacilityInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Facility>, AppError> {
    user.require_permission(Permission::ManageFacilities)?;
    let input = input.validated()?;

    let id = create_facility(db, &input).await?;
    let facility = get_facility(db, id).await?;

    Ok(ApiResponse::created(facility, "施設を登録しました。"))
}

#[put("/facility/<id>", data = "<input>")]
pub async fn api_update_facility(
    id: i64,
    input: Json<FacilityInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Facility>, AppError> {
    user.require_permission(Permission::ManageFacilities)?;
    let input = input.validated()?;

    update_facility(db, id, &input).await?;
    let facility = get_facility(db, id).await?;

    Ok(ApiResponse::success(facility, "施設を更新しました。"))
}

#[delete("/facility/<id>")]
pub async fn api_delete_facility(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageFacilities)?;
    delete_facility(db, id).await?;

    Ok(ApiResponse::message("施設を削除しました。"))
}

#[get("/facility/<id>/users")]
pub async fn api_list_facility_users(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Vec<FacilityMember>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let facility = get_facility(db, id).await?;
    user.ensure_facility(facility.id)?;

    let members = list_members(db, facility.id).await?;
    Ok(ApiResponse::success(members, "施設の職員一覧を取得しました。"))
}

#[post("/facility/<id>/users", data = "<input>")]
pub async fn api_assign_facility_user(
    id: i64,
    input: Json<FacilityMemberInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Vec<FacilityMember>>, AppError> {
    user.require_permission(Permission::ManageStaff)?;
    let input = input.validated()?;

    let facility = get_facility(db, id).await?;
    user.ensure_facility(facility.id)?;
    get_user(db, input.user_id).await?;

    assign_member(db, facility.id, &input).await?;
    let members = list_members(db, facility.id).await?;

    Ok(ApiResponse::success(members, "職員を施設に割り当てました。"))
}

#[delete("/facility/<id>/users/<user_id>")]
pub async fn api_remove_facility_user(
    id: i64,
    user_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageStaff)?;
    let facility = get_facility(db, id).await?;
    user.ensure_facility(facility.id)?;

    remove_member(db, facility.id, user_id).await?;
    Ok(ApiResponse::message("職員の割り当てを解除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_facilities,
        api_get_facility,
        api_create_facility,
        api_update_facility,
        api_delete_facility,
        api_list_facility_users,
        api_assign_facility_user,
        api_remove_facility_user,
    ]
}
