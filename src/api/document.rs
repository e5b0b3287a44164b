//! Consent forms, payment records and confidentiality agreements. Each kind
//! has its own resource path; the handlers share one implementation.

use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::{ApiResponse, ListParams};
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::document::{
    DocumentFilter, SORTABLE, create_document, delete_document, get_document,
    get_document_detail, list_documents, load_metadata, update_document,
};
use crate::db::query::Page;
use crate::db::service_user::get_service_user;
use crate::error::AppError;
use crate::models::document::{
    Document, DocumentDetail, DocumentInput, DocumentKind, DocumentStatus, merge_metadata,
};
use crate::validation::JsonValidateExt;

type DocumentPage = Result<ApiResponse<Page<Document>>, AppError>;
type DocumentResult = Result<ApiResponse<DocumentDetail>, AppError>;

async fn check_links(db: &Pool<Sqlite>, user: &User, input: &DocumentInput) -> Result<(), AppError> {
    user.ensure_facility(input.facility_id)?;
    if let Some(service_user_id) = input.service_user_id {
        let service_user = get_service_user(db, service_user_id).await?;
        user.ensure_facility(service_user.facility_id)?;
    }
    Ok(())
}

async fn list(
    kind: DocumentKind,
    filter: DocumentFilter,
    params: ListParams,
    user: User,
    db: &Pool<Sqlite>,
    config: &AppConfig,
) -> DocumentPage {
    user.require_permission(Permission::ViewRecords)?;

    let request = params.resolve(config, SORTABLE, "d.created_at");
    let page = list_documents(
        db,
        kind.document_type(),
        &filter,
        &request,
        &user.facility_scope(),
    )
    .await?;

    Ok(ApiResponse::success(
        page,
        format!("{}一覧を取得しました。", kind.label()),
    ))
}

async fn show(kind: DocumentKind, id: i64, user: User, db: &Pool<Sqlite>) -> DocumentResult {
    user.require_permission(Permission::ViewRecords)?;
    let detail = get_document_detail(db, id, kind.document_type()).await?;
    user.ensure_facility(detail.document.facility_id)?;

    Ok(ApiResponse::success(
        detail,
        format!("{}を取得しました。", kind.label()),
    ))
}

async fn store(
    kind: DocumentKind,
    input: Json<DocumentInput>,
    user: User,
    db: &Pool<Sqlite>,
) -> DocumentResult {
    user.require_permission(Permission::ManageDocuments)?;
    let input = input.validated()?;
    input.check_status()?;
    kind.check_metadata(&input.metadata)?;
    check_links(db, &user, &input).await?;

    let id = create_document(db, kind.document_type(), &input, user.id).await?;
    let detail = get_document_detail(db, id, kind.document_type()).await?;

    Ok(ApiResponse::created(
        detail,
        format!("{}を作成しました。", kind.label()),
    ))
}

async fn update(
    kind: DocumentKind,
    id: i64,
    input: Json<DocumentInput>,
    user: User,
    db: &Pool<Sqlite>,
) -> DocumentResult {
    user.require_permission(Permission::ManageDocuments)?;
    let input = input.validated()?;
    input.check_status()?;

    let existing = get_document(db, id, kind.document_type()).await?;
    user.ensure_facility(existing.facility_id)?;
    check_links(db, &user, &input).await?;

    if existing.status == DocumentStatus::Signed {
        return Err(AppError::Validation(
            "署名済みの書類は変更できません。".to_string(),
        ));
    }

    let current = load_metadata(db, id).await?;
    kind.check_metadata(&merge_metadata(&current, &input.metadata))?;

    update_document(db, id, &input).await?;
    let detail = get_document_detail(db, id, kind.document_type()).await?;

    Ok(ApiResponse::success(
        detail,
        format!("{}を更新しました。", kind.label()),
    ))
}

async fn destroy(
    kind: DocumentKind,
    id: i64,
    user: User,
    db: &Pool<Sqlite>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::ManageDocuments)?;
    let existing = get_document(db, id, kind.document_type()).await?;
    user.ensure_facility(existing.facility_id)?;

    delete_document(db, id).await?;
    Ok(ApiResponse::message(format!(
        "{}を削除しました。",
        kind.label()
    )))
}

#[get("/document-consent?<facility_id>&<service_user_id>&<status>&<params..>")]
pub async fn api_list_consents(
    facility_id: Option<i64>,
    service_user_id: Option<i64>,
    status: Option<DocumentStatus>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> DocumentPage {
    let filter = DocumentFilter {
        facility_id,
        service_user_id,
        status,
    };
    list(DocumentKind::Consent, filter, params, user, db, config).await
}

#[get("/document-consent/<id>")]
pub async fn api_get_consent(id: i64, user: User, db: &State<Pool<Sqlite>>) -> DocumentResult {
    show(DocumentKind::Consent, id, user, db).await
}

#[post("/document-consent", data = "<input>")]
pub async fn api_create_consent(
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    store(DocumentKind::Consent, input, user, db).await
}

#[put("/document-consent/<id>", data = "<input>")]
pub async fn api_update_consent(
    id: i64,
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    update(DocumentKind::Consent, id, input, user, db).await
}

#[delete("/document-consent/<id>")]
pub async fn api_delete_consent(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    destroy(DocumentKind::Consent, id, user, db).await
}

#[get("/document-payment?<facility_id>&<service_user_id>&<status>&<params..>")]
pub async fn api_list_payments(
    facility_id: Option<i64>,
    service_user_id: Option<i64>,
    status: Option<DocumentStatus>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> DocumentPage {
    let filter = DocumentFilter {
        facility_id,
        service_user_id,
        status,
    };
    list(DocumentKind::Payment, filter, params, user, db, config).await
}

#[get("/document-payment/<id>")]
pub async fn api_get_payment(id: i64, user: User, db: &State<Pool<Sqlite>>) -> DocumentResult {
    show(DocumentKind::Payment, id, user, db).await
}

#[post("/document-payment", data = "<input>")]
pub async fn api_create_payment(
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    store(DocumentKind::Payment, input, user, db).await
}

#[put("/document-payment/<id>", data = "<input>")]
pub async fn api_update_payment(
    id: i64,
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    update(DocumentKind::Payment, id, input, user, db).await
}

#[delete("/document-payment/<id>")]
pub async fn api_delete_payment(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    destroy(DocumentKind::Payment, id, user, db).await
}

#[get("/document-confidentiality?<facility_id>&<service_user_id>&<status>&<params..>")]
pub async fn api_list_confidentiality(
    facility_id: Option<i64>,
    service_user_id: Option<i64>,
    status: Option<DocumentStatus>,
    params: ListParams,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> DocumentPage {
    let filter = DocumentFilter {
        facility_id,
        service_user_id,
        status,
    };
    list(DocumentKind::Confidentiality, filter, params, user, db, config).await
}

#[get("/document-confidentiality/<id>")]
pub async fn api_get_confidentiality(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    show(DocumentKind::Confidentiality, id, user, db).await
}

#[post("/document-confidentiality", data = "<input>")]
pub async fn api_create_confidentiality(
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    store(DocumentKind::Confidentiality, input, user, db).await
}

#[put("/document-confidentiality/<id>", data = "<input>")]
pub async fn api_update_confidentiality(
    id: i64,
    input: Json<DocumentInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> DocumentResult {
    update(DocumentKind::Confidentiality, id, input, user, db).await
}

#[delete("/document-confidentiality/<id>")]
pub async fn api_delete_confidentiality(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    destroy(DocumentKind::Confidentiality, id, user, db).await
}

pub fn routes() -> Vec<Route> {
    routes![
        api_list_consents,
        api_get_consent,
        api_create_consent,
        api_update_consent,
        api_delete_consent,
        api_list_payments,
        api_get_payment,
        api_create_payment,
        api_update_payment,
        api_delete_payment,
        api_list_confidentiality,
        api_get_confidentiality,
        api_create_confidentiality,
        api_update_confidentiality,
        api_delete_confidentiality,
    ]
}
