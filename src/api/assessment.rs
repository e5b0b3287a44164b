use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::assessment::{
    SORTABLE, create_assessment, delete_assessment, get_assessment, get_assessment_detail,
    list_assessments, update_assessment,
};
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::assessment::{Assessment, AssessmentDetail, AssessmentInput};
use crate::validation::JsonValidateExt;

#[get("/assessment?<service_user_id>&<params..>")]
pub async fn api_list_assessments(
    service_user_id: Option<i64>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<Assessment>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let request = params.resolve(config, SORTABLE, "a.assessment_date");
    let page = list_assessments(db, service_user_id, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "アセスメント一覧を取得しました。"))
}

#[get("/assessment/<id>")]
pub async fn api_get_assessment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<AssessmentDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_assessment_detail(db, id).await?;
    user.ensure_facility(detail.assessment.facility_id)?;

    Ok(ApiResponse::success(detail, "アセスメントを取得しました。"))
}

#[post("/assessment", data = "<input>")]
pub async fn api_create_assessment(
    input: Json<AssessmentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<AssessmentDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    let id = create_assessment(db, &input).await?;
    let detail = get_assessment_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "アセスメントを登録しました。"))
}

#[put("/assessment/<id>", data = "<input>")]
pub async fn api_update_assessment(
    id: i64,
    input: Json<AssessmentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<AssessmentDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let existing = get_assessment(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    update_assessment(db, id, &input).await?;
    let detail = get_assessment_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "アセスメントを更新しました。"))
}

#[delete("/assessment/<id>")]
pub async fn api_delete_assessment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_assessment(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_assessment(db, id).await?;
    Ok(ApiResponse::message("アセスメントを削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_assessments,
        api_get_assessment,
        api_create_assessment,
        api_update_assessment,
        api_delete_assessment,
    ]
}
