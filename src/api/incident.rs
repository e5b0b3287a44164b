use chrono::NaiveTime;
use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams, QueryDate};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::incident::{
    IncidentFilter, SORTABLE, create_incident, delete_incident, get_incident, list_incidents,
    update_incident,
};
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::incident::{Incident, IncidentInput, IncidentStatus, IncidentType, Severity};
use crate::validation::{JsonValidateExt, field_error};

async fn check_service_user(
    db: &Pool<Sqlite>,
    input: &IncidentInput,
) -> Result<(), AppError> {
    if let Some(service_user_id) = input.service_user_id {
        let service_user = get_service_user(db, service_user_id).await?;
        if service_user.facility_id != input.facility_id {
            return Err(field_error(
                "service_user_id",
                "利用者が指定された施設に所属していません。",
            ));
        }
    }
    Ok(())
}

#[get("/incident?<facility_id>&<service_user_id>&<incident_type>&<severity>&<status>&<from>&<to>&<params..>")]
#[allow(clippy::too_many_arguments)]
pub async fn api_list_incidents(
    facility_id: Option<i64>,
    service_user_id: Option<i64>,
    incident_type: Option<IncidentType>,
    severity: Option<Severity>,
    status: Option<IncidentStatus>,
    from: Option<QueryDate>,
    to: Option<QueryDate>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<Incident>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let filter = IncidentFilter {
        facility_id,
        service_user_id,
        incident_type,
        severity,
        status,
        from: from.map(|d| d.0.and_time(NaiveTime::MIN)),
        to: to.and_then(|d| d.0.and_hms_opt(23, 59, 59)),
    };
    let request = params.resolve(config, SORTABLE, "i.occurred_at");
    let page = list_incidents(db, &filter, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "事故報告一覧を取得しました。"))
}

#[get("/incident/<id>")]
pub async fn api_get_incident(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Incident>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let incident = get_incident(db, id).await?;
    user.ensure_facility(incident.facility_id)?;

    Ok(ApiResponse::success(incident, "事故報告を取得しました。"))
}

#[post("/incident", data = "<input>")]
pub async fn api_create_incident(
    input: Json<IncidentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Incident>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    user.ensure_facility(input.facility_id)?;
    check_service_user(db, &input).await?;

    let id = create_incident(db, &input, user.id).await?;
    let incident = get_incident(db, id).await?;

    Ok(ApiResponse::created(incident, "事故報告を登録しました。"))
}

#[put("/incident/<id>", data = "<input>")]
pub async fn api_update_incident(
    id: i64,
    input: Json<IncidentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Incident>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;

    let existing = get_incident(db, id).await?;
    user.ensure_facility(existing.facility_id)?;
    user.ensure_facility(input.facility_id)?;
    check_service_user(db, &input).await?;

    update_incident(db, id, &input).await?;
    let incident = get_incident(db, id).await?;

    Ok(ApiResponse::success(incident, "事故報告を更新しました。"))
}

#[delete("/incident/<id>")]
pub async fn api_delete_incident(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_incident(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_incident(db, id).await?;
    Ok(ApiResponse::message("事故報告を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_incidents,
        api_get_incident,
        api_create_incident,
        api_update_incident,
        api_delete_incident,
    ]
}
