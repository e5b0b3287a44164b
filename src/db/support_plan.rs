use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::db::signature::delete_signatures_for;
use crate::error::AppError;
use crate::models::signature::SignatureDocumentType;
use crate::models::support_plan::{
    SupportPlan, SupportPlanDetail, SupportPlanDetailRow, SupportPlanGoal, SupportPlanInput,
    SupportPlanReview, SupportPlanReviewInput, SupportPlanStatus,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "sp.created_at"),
    ("plan_start", "sp.plan_start"),
    ("plan_end", "sp.plan_end"),
    ("status", "sp.status"),
];

#[derive(Debug, Default, Clone)]
pub struct SupportPlanFilter {
    pub service_user_id: Option<i64>,
    pub facility_id: Option<i64>,
    pub status: Option<SupportPlanStatus>,
}

#[instrument(skip(pool))]
pub async fn list_support_plans(
    pool: &Pool<Sqlite>,
    filter: &SupportPlanFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<SupportPlan>, AppError> {
    info!("Listing support plans");
    ListQuery::new("SELECT sp.*", "support_plans sp", "sp.id")
        .eq_opt("sp.service_user_id", filter.service_user_id)
        .eq_opt("sp.facility_id", filter.facility_id)
        .eq_opt("sp.status", filter.status.map(|s| s.as_str()))
        .scoped("sp.facility_id", scope)
        .search(
            &["sp.user_intention", "sp.long_term_goal"],
            request.search.as_deref(),
        )
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_support_plan(pool: &Pool<Sqlite>, id: i64) -> Result<SupportPlan, AppError> {
    info!("Fetching support plan");
    sqlx::query_as::<_, SupportPlan>("SELECT * FROM support_plans WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("個別支援計画", id))
}

pub async fn list_reviews(
    pool: &Pool<Sqlite>,
    plan_id: i64,
) -> Result<Vec<SupportPlanReview>, AppError> {
    let reviews = sqlx::query_as::<_, SupportPlanReview>(
        "SELECT * FROM support_plan_reviews WHERE support_plan_id = ?
         ORDER BY review_date DESC, id DESC",
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

pub async fn get_support_plan_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<SupportPlanDetail, AppError> {
    let plan = get_support_plan(pool, id).await?;

    let goals = sqlx::query_as::<_, SupportPlanGoal>(
        "SELECT * FROM support_plan_goals WHERE support_plan_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let details = sqlx::query_as::<_, SupportPlanDetailRow>(
        "SELECT * FROM support_plan_details WHERE support_plan_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let reviews = list_reviews(pool, id).await?;

    Ok(SupportPlanDetail {
        plan,
        goals,
        details,
        reviews,
    })
}

async fn replace_children(
    conn: &mut SqliteConnection,
    plan_id: i64,
    input: &SupportPlanInput,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM support_plan_goals WHERE support_plan_id = ?")
        .bind(plan_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM support_plan_details WHERE support_plan_id = ?")
        .bind(plan_id)
        .execute(&mut *conn)
        .await?;

    for goal in &input.goals {
        sqlx::query(
            "INSERT INTO support_plan_goals (support_plan_id, goal, priority, target_date)
             VALUES (?, ?, ?, ?)",
        )
        .bind(plan_id)
        .bind(&goal.goal)
        .bind(goal.priority)
        .bind(goal.target_date)
        .execute(&mut *conn)
        .await?;
    }

    for detail in &input.details {
        sqlx::query(
            "INSERT INTO support_plan_details
                (support_plan_id, goal_index, support_content, frequency, responsible)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(plan_id)
        .bind(detail.goal_index)
        .bind(&detail.support_content)
        .bind(&detail.frequency)
        .bind(&detail.responsible)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[instrument(skip(pool, input), fields(service_user_id = input.service_user_id))]
pub async fn create_support_plan(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    input: &SupportPlanInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating support plan");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO support_plans
            (service_user_id, facility_id, plan_start, plan_end, user_intention, long_term_goal,
             status, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.plan_start)
    .bind(input.plan_end)
    .bind(&input.user_intention)
    .bind(&input.long_term_goal)
    .bind(input.status.unwrap_or(SupportPlanStatus::Draft))
    .bind(created_by)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "個別支援計画を登録できません。"))?;
    let id = res.last_insert_rowid();

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_support_plan(
    pool: &Pool<Sqlite>,
    id: i64,
    facility_id: i64,
    input: &SupportPlanInput,
) -> Result<(), AppError> {
    info!("Updating support plan");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE support_plans
         SET service_user_id = ?, facility_id = ?, plan_start = ?, plan_end = ?,
             user_intention = ?, long_term_goal = ?, status = COALESCE(?, status),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.plan_start)
    .bind(input.plan_end)
    .bind(&input.user_intention)
    .bind(&input.long_term_goal)
    .bind(input.status)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "個別支援計画を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("個別支援計画", id));
    }

    replace_children(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_support_plan(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting support plan");
    let mut tx = pool.begin().await?;

    delete_signatures_for(&mut tx, SignatureDocumentType::SupportPlan, id).await?;

    let res = sqlx::query("DELETE FROM support_plans WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("個別支援計画", id));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool, input))]
pub async fn create_review(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    input: &SupportPlanReviewInput,
    reviewer_id: i64,
) -> Result<SupportPlanReview, AppError> {
    info!("Adding support plan review");
    let review = sqlx::query_as::<_, SupportPlanReview>(
        "INSERT INTO support_plan_reviews
            (support_plan_id, review_date, reviewer_id, evaluation, next_review_date)
         VALUES (?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(plan_id)
    .bind(input.review_date)
    .bind(reviewer_id)
    .bind(&input.evaluation)
    .bind(input.next_review_date)
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_write(e, "モニタリング記録を登録できません。"))?;

    Ok(review)
}

#[instrument(skip(pool))]
pub async fn delete_review(
    pool: &Pool<Sqlite>,
    plan_id: i64,
    review_id: i64,
) -> Result<(), AppError> {
    info!("Deleting support plan review");
    let res = sqlx::query("DELETE FROM support_plan_reviews WHERE id = ? AND support_plan_id = ?")
        .bind(review_id)
        .bind(plan_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("モニタリング記録", review_id));
    }
    Ok(())
}
