use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::family_member::{insert_linked_member, members_for_consultation};
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::consultation::{
    Consultation, ConsultationDetail, ConsultationInput, ConsultationStatus,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "c.created_at"),
    ("consultation_date", "c.consultation_date"),
    ("applicant_name", "c.applicant_name"),
    ("status", "c.status"),
];

#[derive(Debug, Default, Clone)]
pub struct ConsultationFilter {
    pub status: Option<ConsultationStatus>,
    pub facility_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_consultations(
    pool: &Pool<Sqlite>,
    filter: &ConsultationFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Consultation>, AppError> {
    info!("Listing consultations");
    ListQuery::new("SELECT c.*", "consultations c", "c.id")
        .eq_opt("c.status", filter.status.map(|s| s.as_str()))
        .eq_opt("c.facility_id", filter.facility_id)
        .gte_opt("c.consultation_date", filter.from)
        .lte_opt("c.consultation_date", filter.to)
        .scoped("c.facility_id", scope)
        .search(&["c.applicant_name", "c.content"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_consultation(pool: &Pool<Sqlite>, id: i64) -> Result<Consultation, AppError> {
    info!("Fetching consultation");
    sqlx::query_as::<_, Consultation>("SELECT * FROM consultations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("相談", id))
}

pub async fn get_consultation_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<ConsultationDetail, AppError> {
    let consultation = get_consultation(pool, id).await?;
    let family_members = members_for_consultation(pool, id).await?;
    let service_user_id =
        sqlx::query_scalar::<_, i64>("SELECT id FROM service_users WHERE consultation_id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(ConsultationDetail {
        consultation,
        family_members,
        service_user_id,
    })
}

/// Creates the consultation and any family members given with it.
#[instrument(skip(pool, input), fields(facility_id = input.facility_id))]
pub async fn create_consultation(
    pool: &Pool<Sqlite>,
    input: &ConsultationInput,
) -> Result<i64, AppError> {
    info!("Creating consultation");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO consultations
            (facility_id, consultation_date, applicant_name, applicant_phone, route, content,
             staff_id, note)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.facility_id)
    .bind(input.consultation_date)
    .bind(&input.applicant_name)
    .bind(&input.applicant_phone)
    .bind(&input.route)
    .bind(&input.content)
    .bind(input.staff_id)
    .bind(&input.note)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "相談を登録できません。"))?;
    let id = res.last_insert_rowid();

    for member in &input.family_members {
        insert_linked_member(&mut tx, member, id, None).await?;
    }

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_consultation(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &ConsultationInput,
) -> Result<(), AppError> {
    info!("Updating consultation");
    let res = sqlx::query(
        "UPDATE consultations
         SET facility_id = ?, consultation_date = ?, applicant_name = ?, applicant_phone = ?,
             route = ?, content = ?, staff_id = ?, note = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.facility_id)
    .bind(input.consultation_date)
    .bind(&input.applicant_name)
    .bind(&input.applicant_phone)
    .bind(&input.route)
    .bind(&input.content)
    .bind(input.staff_id)
    .bind(&input.note)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "相談を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("相談", id));
    }
    Ok(())
}

/// Moves a pending consultation to `status`. The status guard lives in the
/// `UPDATE` so two concurrent reviews cannot both succeed.
#[instrument(skip(pool))]
pub async fn review_consultation(
    pool: &Pool<Sqlite>,
    id: i64,
    status: ConsultationStatus,
) -> Result<(), AppError> {
    info!(status = status.as_str(), "Reviewing consultation");
    let current = get_consultation(pool, id).await?;

    if !current.status.can_transition_to(status) {
        return Err(AppError::Validation(format!(
            "相談のステータスを{}から{}に変更することはできません。",
            current.status.as_str(),
            status.as_str()
        )));
    }

    let res = sqlx::query(
        "UPDATE consultations
         SET status = ?, reviewed_at = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ? AND status = 'pending'",
    )
    .bind(status)
    .bind(Utc::now().naive_utc())
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::Validation(
            "この相談は既に審査済みです。".to_string(),
        ));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_consultation(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting consultation");
    let res = sqlx::query("DELETE FROM consultations WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "相談を削除できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("相談", id));
    }
    Ok(())
}
