use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::facility::{
    Facility, FacilityInput, FacilityMember, FacilityMemberInput, FacilityType,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "f.created_at"),
    ("name", "f.name"),
    ("facility_type", "f.facility_type"),
    ("capacity", "f.capacity"),
];

#[instrument(skip(pool))]
pub async fn list_facilities(
    pool: &Pool<Sqlite>,
    facility_type: Option<FacilityType>,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Facility>, AppError> {
    info!("Listing facilities");
    ListQuery::new("SELECT f.*", "facilities f", "f.id")
        .eq_opt("f.facility_type", facility_type.map(|t| t.as_str()))
        .scoped("f.id", scope)
        .search(&["f.name", "f.address"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_facility(pool: &Pool<Sqlite>, id: i64) -> Result<Facility, AppError> {
    info!("Fetching facility");
    sqlx::query_as::<_, Facility>("SELECT * FROM facilities WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("施設", id))
}

#[instrument(skip(pool))]
pub async fn create_facility(pool: &Pool<Sqlite>, input: &FacilityInput) -> Result<i64, AppError> {
    info!("Creating facility");
    let res = sqlx::query(
        "INSERT INTO facilities (name, facility_type, postal_code, address, phone, capacity)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(input.facility_type)
    .bind(&input.postal_code)
    .bind(&input.address)
    .bind(&input.phone)
    .bind(input.capacity)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn update_facility(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &FacilityInput,
) -> Result<(), AppError> {
    info!("Updating facility");
    let res = sqlx::query(
        "UPDATE facilities
         SET name = ?, facility_type = ?, postal_code = ?, address = ?, phone = ?, capacity = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&input.name)
    .bind(input.facility_type)
    .bind(&input.postal_code)
    .bind(&input.address)
    .bind(&input.phone)
    .bind(input.capacity)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("施設", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_facility(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting facility");
    let res = sqlx::query("DELETE FROM facilities WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "施設を削除できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("施設", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn list_members(
    pool: &Pool<Sqlite>,
    facility_id: i64,
) -> Result<Vec<FacilityMember>, AppError> {
    info!("Listing facility members");
    let rows = sqlx::query_as::<_, FacilityMember>(
        "SELECT u.id AS user_id, u.name, u.email, u.role AS user_role,
                fu.role AS facility_role, fu.created_at AS assigned_at
         FROM facility_users fu
         JOIN users u ON u.id = fu.user_id
         WHERE fu.facility_id = ?
         ORDER BY u.name",
    )
    .bind(facility_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Assigns a user to a facility, updating the role when already assigned.
#[instrument(skip(pool))]
pub async fn assign_member(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    input: &FacilityMemberInput,
) -> Result<(), AppError> {
    info!("Assigning user to facility");
    sqlx::query(
        "INSERT INTO facility_users (facility_id, user_id, role) VALUES (?, ?, ?)
         ON CONFLICT (facility_id, user_id) DO UPDATE SET role = excluded.role",
    )
    .bind(facility_id)
    .bind(input.user_id)
    .bind(&input.role)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "既に割り当てられています。"))?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn remove_member(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    user_id: i64,
) -> Result<(), AppError> {
    info!("Removing user from facility");
    let res = sqlx::query("DELETE FROM facility_users WHERE facility_id = ? AND user_id = ?")
        .bind(facility_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "指定されたユーザーはこの施設に割り当てられていません。".to_string(),
        ));
    }
    Ok(())
}
