use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::db::support_plan::{
    SORTABLE, SupportPlanFilter, create_review, create_support_plan, delete_review,
    delete_support_plan, get_support_plan, get_support_plan_detail, list_reviews,
    list_support_plans, update_support_plan,
};
use crate::error::AppError;
use crate::models::support_plan::{
    SupportPlan, SupportPlanDetail, SupportPlanInput, SupportPlanReview, SupportPlanReviewInput,
    SupportPlanStatus,
};
use crate::validation::{JsonValidateExt, ensure_date_order, field_error};

fn check_plan(input: &SupportPlanInput) -> Result<(), AppError> {
    ensure_date_order(
        input.plan_start,
        input.plan_end,
        "plan_end",
        "計画終了日は計画開始日以降の日付を指定してください。",
    )?;
    if let Some(index) = input.dangling_goal_index() {
        return Err(field_error(
            &format!("details.{}.goal_index", index),
            "対応する目標が存在しません。",
        ));
    }
    Ok(())
}

#[get("/support-plan?<service_user_id>&<facility_id>&<status>&<params..>")]
pub async fn api_list_support_plans(
    service_user_id: Option<i64>,
    facility_id: Option<i64>,
    status: Option<SupportPlanStatus>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<SupportPlan>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = SupportPlanFilter {
        service_user_id,
        facility_id,
        status,
    };
    let request = params.resolve(config, SORTABLE, "sp.plan_start");
    let page = list_support_plans(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "個別支援計画一覧を取得しました。"))
}

#[get("/support-plan/<id>")]
pub async fn api_get_support_plan(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SupportPlanDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_support_plan_detail(db, id).await?;
    user.ensure_facility(detail.plan.facility_id)?;

    Ok(ApiResponse::success(detail, "個別支援計画を取得しました。"))
}

#[post("/support-plan", data = "<input>")]
pub async fn api_create_support_plan(
    input: Json<SupportPlanInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SupportPlanDetail>, AppError> {
    user.require_permission(Permission::ManageSupportPlans)?;
    let input = input.validated()?;
    check_plan(&input)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    let id = create_support_plan(db, service_user.facility_id, &input, user.id).await?;
    let detail = get_support_plan_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "個別支援計画を登録しました。"))
}

#[put("/support-plan/<id>", data = "<input>")]
pub async fn api_update_support_plan(
    id: i64,
    input: Json<SupportPlanInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SupportPlanDetail>, AppError> {
    user.require_permission(Permission::ManageSupportPlans)?;
    let input = input.validated()?;
    check_plan(&input)?;

    let existing = get_support_plan(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    update_support_plan(db, id, service_user.facility_id, &input).await?;
    let detail = get_support_plan_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "個別支援計画を更新しました。"))
}

#[delete("/support-plan/<id>")]
pub async fn api_delete_support_plan(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageSupportPlans)?;
    let existing = get_support_plan(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_support_plan(db, id).await?;
    Ok(ApiResponse::message("個別支援計画を削除しました。"))
}

#[get("/support-plan/<id>/reviews")]
pub async fn api_list_reviews(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Vec<SupportPlanReview>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let plan = get_support_plan(db, id).await?;
    user.ensure_facility(plan.facility_id)?;

    let reviews = list_reviews(db, id).await?;
    Ok(ApiResponse::success(reviews, "モニタリング記録を取得しました。"))
}

#[post("/support-plan/<id>/reviews", data = "<input>")]
pub async fn api_create_review(
    id: i64,
    input: Json<SupportPlanReviewInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<SupportPlanReview>, AppError> {
    user.require_permission(Permission::ManageSupportPlans)?;
    let input = input.validated()?;
    if let Some(next) = input.next_review_date {
        ensure_date_order(
            input.review_date,
            next,
            "next_review_date",
            "次回モニタリング日は実施日以降の日付を指定してください。",
        )?;
    }

    let plan = get_support_plan(db, id).await?;
    user.ensure_facility(plan.facility_id)?;

    let review = create_review(db, id, &input, user.id).await?;
    Ok(ApiResponse::created(review, "モニタリング記録を登録しました。"))
}

#[delete("/support-plan/<id>/reviews/<review_id>")]
pub async fn api_delete_review(
    id: i64,
    review_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageSupportPlans)?;
    let plan = get_support_plan(db, id).await?;
    user.ensure_facility(plan.facility_id)?;

    delete_review(db, id, review_id).await?;
    Ok(ApiResponse::message("モニタリング記録を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_support_plans,
        api_get_support_plan,
        api_create_support_plan,
        api_update_support_plan,
        api_delete_support_plan,
        api_list_reviews,
        api_create_review,
        api_delete_review,
    ]
}
