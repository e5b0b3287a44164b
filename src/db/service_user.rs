use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::family_member::members_for_service_user;
use crate::db::profile::{get_profile, upsert_profile};
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_service_user_signatures;
use crate::error::AppError;
use crate::models::consultation::ConsultationStatus;
use crate::models::profile::UserType;
use crate::models::service_user::{
    ServiceUser, ServiceUserDetail, ServiceUserInput, ServiceUserStatus,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "s.created_at"),
    ("name", "s.name"),
    ("furigana", "s.furigana"),
    ("move_in_date", "s.move_in_date"),
    ("status", "s.status"),
];

#[derive(Debug, Default, Clone)]
pub struct ServiceUserFilter {
    pub facility_id: Option<i64>,
    pub status: Option<ServiceUserStatus>,
}

#[instrument(skip(pool))]
pub async fn list_service_users(
    pool: &Pool<Sqlite>,
    filter: &ServiceUserFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<ServiceUser>, AppError> {
    info!("Listing service users");
    ListQuery::new("SELECT s.*", "service_users s", "s.id")
        .eq_opt("s.facility_id", filter.facility_id)
        .eq_opt("s.status", filter.status.map(|s| s.as_str()))
        .scoped("s.facility_id", scope)
        .search(
            &["s.name", "s.furigana", "s.certificate_number"],
            request.search.as_deref(),
        )
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_service_user(pool: &Pool<Sqlite>, id: i64) -> Result<ServiceUser, AppError> {
    info!("Fetching service user");
    sqlx::query_as::<_, ServiceUser>("SELECT * FROM service_users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("利用者", id))
}

pub async fn get_service_user_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<ServiceUserDetail, AppError> {
    let service_user = get_service_user(pool, id).await?;
    let profile = get_profile(pool, id, UserType::ServiceUser).await?;
    let family_members = members_for_service_user(pool, id).await?;

    Ok(ServiceUserDetail {
        service_user,
        profile,
        family_members,
    })
}

/// Registers a service user from an accepted consultation. The profile and
/// family member links are written in the same transaction; a second service
/// user for the same consultation is rejected by the unique constraint.
#[instrument(skip(pool, input))]
pub async fn create_service_user(
    pool: &Pool<Sqlite>,
    consultation_id: i64,
    facility_id: i64,
    input: &ServiceUserInput,
) -> Result<i64, AppError> {
    info!("Creating service user from consultation");
    let mut tx = pool.begin().await?;

    let status = sqlx::query_scalar::<_, ConsultationStatus>(
        "SELECT status FROM consultations WHERE id = ?",
    )
    .bind(consultation_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("相談", consultation_id))?;

    if status != ConsultationStatus::Accepted {
        return Err(AppError::Validation(
            "承認済みの相談からのみ利用者を登録できます。".to_string(),
        ));
    }

    let res = sqlx::query(
        "INSERT INTO service_users
            (consultation_id, facility_id, name, furigana, gender, birthday, disability_category,
             certificate_number, move_in_date, move_out_date, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(consultation_id)
    .bind(facility_id)
    .bind(&input.name)
    .bind(&input.furigana)
    .bind(&input.gender)
    .bind(input.birthday)
    .bind(&input.disability_category)
    .bind(&input.certificate_number)
    .bind(input.move_in_date)
    .bind(input.move_out_date)
    .bind(input.status.unwrap_or(ServiceUserStatus::Active))
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "この相談から既に利用者が登録されています。"))?;
    let id = res.last_insert_rowid();

    upsert_profile(&mut tx, id, UserType::ServiceUser, &input.profile_input()).await?;

    sqlx::query("UPDATE service_user_family_member SET service_user_id = ? WHERE consultation_id = ?")
        .bind(id)
        .bind(consultation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_service_user(
    pool: &Pool<Sqlite>,
    id: i64,
    facility_id: i64,
    input: &ServiceUserInput,
) -> Result<(), AppError> {
    info!("Updating service user");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE service_users
         SET facility_id = ?, name = ?, furigana = ?, gender = ?, birthday = ?,
             disability_category = ?, certificate_number = ?, move_in_date = ?,
             move_out_date = ?, status = COALESCE(?, status), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(facility_id)
    .bind(&input.name)
    .bind(&input.furigana)
    .bind(&input.gender)
    .bind(input.birthday)
    .bind(&input.disability_category)
    .bind(&input.certificate_number)
    .bind(input.move_in_date)
    .bind(input.move_out_date)
    .bind(input.status)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "利用者を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("利用者", id));
    }

    upsert_profile(&mut tx, id, UserType::ServiceUser, &input.profile_input()).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_service_user(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting service user");
    let mut tx = pool.begin().await?;

    delete_service_user_signatures(&mut tx, id).await?;

    sqlx::query("DELETE FROM profiles WHERE user_id = ? AND user_type = ?")
        .bind(id)
        .bind(UserType::ServiceUser)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM service_users WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, "利用者を削除できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("利用者", id));
    }

    tx.commit().await?;
    Ok(())
}
