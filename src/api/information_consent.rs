use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::information_consent::{
    SORTABLE, create_information_consent, delete_information_consent, get_information_consent,
    list_information_consents, update_information_consent,
};
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::information_consent::{InformationConsent, InformationConsentInput};
use crate::validation::{JsonValidateExt, ensure_date_order, field_error};

fn check_dates(input: &InformationConsentInput) -> Result<(), AppError> {
    if let Some(valid_until) = input.valid_until {
        ensure_date_order(
            input.consent_date,
            valid_until,
            "valid_until",
            "有効期限は同意日以降の日付を入力してください。",
        )?;
    }
    Ok(())
}

#[get("/information-consent?<service_user_id>&<params..>")]
pub async fn api_list_information_consents(
    service_user_id: Option<i64>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<Page<InformationConsent>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let request = params.resolve(config, SORTABLE, "ic.consent_date");
    let page =
        list_information_consents(db, service_user_id, &request, &user.facility_scope()).await?;

    Ok(ApiResponse::success(page, "情報提供同意一覧を取得しました。"))
}

#[get("/information-consent/<id>")]
pub async fn api_get_information_consent(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<InformationConsent>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let consent = get_information_consent(db, id).await?;
    user.ensure_facility(consent.facility_id)?;

    Ok(ApiResponse::success(consent, "情報提供同意を取得しました。"))
}

#[post("/information-consent", data = "<input>")]
pub async fn api_create_information_consent(
    input: Json<InformationConsentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<InformationConsent>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_dates(&input)?;

    let service_user = get_service_user(db, input.service_user_id).await?;
    user.ensure_facility(service_user.facility_id)?;

    let id = create_information_consent(db, service_user.facility_id, &input, user.id).await?;
    let consent = get_information_consent(db, id).await?;

    Ok(ApiResponse::created(consent, "情報提供同意を登録しました。"))
}

#[put("/information-consent/<id>", data = "<input>")]
pub async fn api_update_information_consent(
    id: i64,
    input: Json<InformationConsentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<InformationConsent>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    check_dates(&input)?;

    let existing = get_information_consent(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    if input.service_user_id != existing.service_user_id {
        return Err(field_error(
            "service_user_id",
            "利用者は変更できません。",
        ));
    }

    update_information_consent(db, id, existing.document_id, &input).await?;
    let consent = get_information_consent(db, id).await?;

    Ok(ApiResponse::success(consent, "情報提供同意を更新しました。"))
}

#[delete("/information-consent/<id>")]
pub async fn api_delete_information_consent(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let existing = get_information_consent(db, id).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_information_consent(db, existing.document_id).await?;
    Ok(ApiResponse::message("情報提供同意を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_information_consents,
        api_get_information_consent,
        api_create_information_consent,
        api_update_information_consent,
        api_delete_information_consent,
    ]
}
