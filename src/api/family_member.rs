use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::consultation::get_consultation;
use crate::db::family_member::{
    FamilyMemberFilter, SORTABLE, create_family_members, delete_family_member,
    get_family_member, list_family_members, member_facilities, members_for_consultation,
    update_family_member,
};
use crate::db::query::Page;
use crate::error::AppError;
use crate::models::family_member::{FamilyMember, FamilyMemberBatch, FamilyMemberInput};
use crate::validation::JsonValidateExt;

/// Members belong to the facilities of the consultations they are linked to.
async fn find_accessible(db: &Pool<Sqlite>, user: &User, id: i64) -> Result<FamilyMember, AppError> {
    let member = get_family_member(db, id).await?;
    user.ensure_any_facility(&member_facilities(db, id).await?)?;
    Ok(member)
}

#[get("/family-member?<consultation_id>&<service_user_id>&<params..>")]
pub async fn api_list_family_members(
    consultation_id: Option<i64>,
    service_user_id: Option<i64>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<FamilyMember>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = FamilyMemberFilter {
        consultation_id,
        service_user_id,
    };
    let request = params.resolve(config, SORTABLE, "fm.created_at");
    let page = list_family_members(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "家族一覧を取得しました。"))
}

#[get("/family-member/<id>")]
pub async fn api_get_family_member(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<FamilyMember>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let member = find_accessible(db, &user, id).await?;

    Ok(ApiResponse::success(member, "家族を取得しました。"))
}

#[post("/family-member", data = "<input>")]
pub async fn api_create_family_members(
    input: Json<FamilyMemberBatch>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Vec<FamilyMember>>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let consultation = get_consultation(db, input.consultation_id).await?;
    user.ensure_facility(consultation.facility_id)?;

    create_family_members(db, consultation.id, &input.members).await?;
    let members = members_for_consultation(db, consultation.id).await?;

    Ok(ApiResponse::created(members, "家族を登録しました。"))
}

#[put("/family-member/<id>", data = "<input>")]
pub async fn api_update_family_member(
    id: i64,
    input: Json<FamilyMemberInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<FamilyMember>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    find_accessible(db, &user, id).await?;

    update_family_member(db, id, &input).await?;
    let member = get_family_member(db, id).await?;

    Ok(ApiResponse::success(member, "家族を更新しました。"))
}

#[delete("/family-member/<id>")]
pub async fn api_delete_family_member(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    find_accessible(db, &user, id).await?;

    delete_family_member(db, id).await?;

    Ok(ApiResponse::message("家族を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_family_members,
        api_get_family_member,
        api_create_family_members,
        api_update_family_member,
        api_delete_family_member,
    ]
}
