use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::assessment::{
    Assessment, AssessmentDetail, AssessmentInput, LivingDomain, MedicalHistory,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "a.created_at"),
    ("assessment_date", "a.assessment_date"),
];

const SELECT: &str = "SELECT a.*, su.facility_id";
const FROM: &str = "assessments a JOIN service_users su ON su.id = a.service_user_id";

#[instrument(skip(pool))]
pub async fn list_assessments(
    pool: &Pool<Sqlite>,
    service_user_id: Option<i64>,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Assessment>, AppError> {
    info!("Listing assessments");
    ListQuery::new(SELECT, FROM, "a.id")
        .eq_opt("a.service_user_id", service_user_id)
        .scoped("su.facility_id", scope)
        .search(&["a.summary", "su.name"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_assessment(pool: &Pool<Sqlite>, id: i64) -> Result<Assessment, AppError> {
    info!("Fetching assessment");
    sqlx::query_as::<_, Assessment>(&format!("{} FROM {} WHERE a.id = ?", SELECT, FROM))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("アセスメント", id))
}

pub async fn get_assessment_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<AssessmentDetail, AppError> {
    let assessment = get_assessment(pool, id).await?;

    let living_domains = sqlx::query_as::<_, LivingDomain>(
        "SELECT * FROM living_domain_assessments WHERE assessment_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let medical_histories = sqlx::query_as::<_, MedicalHistory>(
        "SELECT * FROM medical_disability_histories WHERE assessment_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(AssessmentDetail {
        assessment,
        living_domains,
        medical_histories,
    })
}

async fn replace_children(
    conn: &mut SqliteConnection,
    assessment_id: i64,
    input: &AssessmentInput,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM living_domain_assessments WHERE assessment_id = ?")
        .bind(assessment_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM medical_disability_histories WHERE assessment_id = ?")
        .bind(assessment_id)
        .execute(&mut *conn)
        .await?;

    for domain in &input.living_domains {
        sqlx::query(
            "INSERT INTO living_domain_assessments
                (assessment_id, domain, current_status, needs, support_level)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(assessment_id)
        .bind(&domain.domain)
        .bind(&domain.current_status)
        .bind(&domain.needs)
        .bind(domain.support_level)
        .execute(&mut *conn)
        .await?;
    }

    for history in &input.medical_histories {
        sqlx::query(
            "INSERT INTO medical_disability_histories
                (assessment_id, condition_name, diagnosed_on, hospital, medication, note)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(assessment_id)
        .bind(&history.condition_name)
        .bind(history.diagnosed_on)
        .bind(&history.hospital)
        .bind(&history.medication)
        .bind(&history.note)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[instrument(skip(pool, input), fields(service_user_id = input.service_user_id))]
pub async fn create_assessment(
    pool: &Pool<Sqlite>,
    input: &AssessmentInput,
) -> Result<i64, AppError> {
    info!("Creating assessment");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO assessments (service_user_id, assessment_date, assessor_id, summary)
         VALUES (?, ?, ?, ?)",
    )
    .bind(input.service_user_id)
    .bind(input.assessment_date)
    .bind(input.assessor_id)
    .bind(&input.summary)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "アセスメントを登録できません。"))?;
    let id = res.last_insert_rowid();

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_assessment(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &AssessmentInput,
) -> Result<(), AppError> {
    info!("Updating assessment");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE assessments
         SET service_user_id = ?, assessment_date = ?, assessor_id = ?, summary = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.service_user_id)
    .bind(input.assessment_date)
    .bind(input.assessor_id)
    .bind(&input.summary)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "アセスメントを更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("アセスメント", id));
    }

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_assessment(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting assessment");
    let res = sqlx::query("DELETE FROM assessments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("アセスメント", id));
    }
    Ok(())
}
