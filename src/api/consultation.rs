use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate, date_opt};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::consultation::{
    ConsultationFilter, SORTABLE, create_consultation, delete_consultation, get_consultation,
    get_consultation_detail, list_consultations, review_consultation, update_consultation,
};
use crate::db::query::Page;
use crate::error::AppError;
use crate::models::consultation::{
    Consultation, ConsultationDetail, ConsultationInput, ConsultationStatus,
    ConsultationStatusInput,
};
use crate::validation::JsonValidateExt;

#[get("/consultation?<status>&<facility_id>&<from>&<to>&<params..>")]
pub async fn api_list_consultations(
    status: Option<ConsultationStatus>,
    facility_id: Option<i64>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<Consultation>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = ConsultationFilter {
        status,
        facility_id,
        from: date_opt(from),
        to: date_opt(to),
    };
    let request = params.resolve(config, SORTABLE, "c.consultation_date");
    let page = list_consultations(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "相談一覧を取得しました。"))
}

#[get("/consultation/<id>")]
pub async fn api_get_consultation(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ConsultationDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_consultation_detail(db, id).await?;
    user.ensure_facility(detail.consultation.facility_id)?;

    Ok(ApiResponse::success(detail, "相談を取得しました。"))
}

#[post("/consultation", data = "<input>")]
pub async fn api_create_consultation(
    input: Json<ConsultationInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ConsultationDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    user.ensure_facility(input.facility_id)?;

    let id = create_consultation(db, &input).await?;
    let detail = get_consultation_detail(db, id).await?;

    Ok(ApiResponse::created(detail, "相談を登録しました。"))
}

#[put("/consultation/<id>", data = "<input>")]
pub async fn api_update_consultation(
    id: i64,
    input: Json<ConsultationInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ConsultationDetail>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let existing = get_consultation(db, id).await?;
    user.ensure_facility(existing.facility_id)?;
    user.ensure_facility(input.facility_id)?;

    update_consultation(db, id, &input).await?;
    let detail = get_consultation_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "相談を更新しました。"))
}

#[put("/consultation/<id>/status", data = "<input>")]
pub async fn api_review_consultation(
    id: i64,
    input: Json<ConsultationStatusInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ConsultationDetail>, AppError> {
    user.require_permission(Permission::ReviewConsultations)?;
    let input = input.validated()?;

    let existing = get_consultation(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    review_consultation(db, id, input.status).await?;
    let detail = get_consultation_detail(db, id).await?;

    Ok(ApiResponse::success(detail, "相談のステータスを更新しました。"))
}

#[delete("/consultation/<id>")]
pub async fn api_delete_consultation(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_consultation(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_consultation(db, id).await?;
    Ok(ApiResponse::message("相談を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_consultations,
        api_get_consultation,
        api_create_consultation,
        api_update_consultation,
        api_review_consultation,
        api_delete_consultation,
    ]
}
