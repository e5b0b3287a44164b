use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{FacilityScope, Permission, Role, User};
use crate::config::AppConfig;
use crate::db::query::Page;
use crate::db::users::{
    SORTABLE, UserFilter, create_staff, delete_user, get_user, list_users, update_staff,
};
use crate::error::AppError;
use crate::models::manager::{StaffCreateInput, StaffUpdateInput};
use crate::validation::JsonValidateExt;

/// Non-admins may only manage accounts that share one of their facilities,
/// and never an admin account.
fn ensure_manageable(actor: &User, target: &User) -> Result<(), AppError> {
    if target.role == Role::Admin {
        actor.require_permission(Permission::AssignRoles)?;
    }

    match actor.facility_scope() {
        FacilityScope::All => Ok(()),
        FacilityScope::Only(ids) => {
            if target.id == actor.id || target.facility_ids.iter().any(|id| ids.contains(id)) {
                Ok(())
            } else {
                Err(AppError::forbidden())
            }
        }
    }
}

fn ensure_assignable(actor: &User, facility_ids: &[i64]) -> Result<(), AppError> {
    facility_ids
        .iter()
        .try_for_each(|facility_id| actor.ensure_facility(*facility_id))
}

#[get("/manager?<role>&<facility_id>&<is_active>&<params..>")]
pub async fn api_list_staff(
    role: Option<Role>,
    facility_id: Option<i64>,
    is_active: Option<bool>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<User>>, AppError> {
    user.require_permission(Permission::ManageStaff)?;

    let filter = UserFilter {
        role,
        facility_id,
        is_active,
    };
    let request = params.resolve(config, SORTABLE, "u.created_at");
    let page = list_users(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "職員一覧を取得しました。"))
}

#[get("/manager/<id>")]
pub async fn api_get_staff(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageStaff)?;
    let target = get_user(db, id).await?;
    ensure_manageable(&user, &target)?;

    Ok(ApiResponse::success(target, "職員を取得しました。"))
}

#[post("/manager", data = "<input>")]
pub async fn api_create_staff(
    input: Json<StaffCreateInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageStaff)?;
    let input = input.validated()?;

    if input.role == Role::Admin {
        user.require_permission(Permission::AssignRoles)?;
    }
    ensure_assignable(&user, &input.facility_ids)?;

    let id = create_staff(db, &input.new_user(), &input.facility_ids).await?;
    let created = get_user(db, id).await?;

    Ok(ApiResponse::created(created, "職員を登録しました。"))
}

#[put("/manager/<id>", data = "<input>")]
pub async fn api_update_staff(
    id: i64,
    input: Json<StaffUpdateInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<User>, AppError> {
    user.require_permission(Permission::ManageStaff)?;
    let input = input.validated()?;

    let target = get_user(db, id).await?;
    ensure_manageable(&user, &target)?;

    if input.role.is_some_and(|role| role != target.role) {
        user.require_permission(Permission::AssignRoles)?;
    }
    if let Some(ids) = &input.facility_ids {
        ensure_assignable(&user, ids)?;
    }

    update_staff(db, id, &input.changes(), input.facility_ids.as_deref()).await?;
    let updated = get_user(db, id).await?;

    Ok(ApiResponse::success(updated, "職員を更新しました。"))
}

#[delete("/manager/<id>")]
pub async fn api_delete_staff(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageStaff)?;

    if id == user.id {
        return Err(AppError::Validation(
            "自分自身のアカウントは削除できません。".to_string(),
        ));
    }

    let target = get_user(db, id).await?;
    ensure_manageable(&user, &target)?;

    delete_user(db, id).await?;
    Ok(ApiResponse::message("職員を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_staff,
        api_get_staff,
        api_create_staff,
        api_update_staff,
        api_delete_staff,
    ]
}
