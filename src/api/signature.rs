use rocket::serde::json::Json;
use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::api::ApiResponse;
use crate::auth::{Permission, User};
use crate::db::signature::{
    create_signature, delete_signature, get_signature, list_signatures, target_facility,
};
use crate::error::AppError;
use crate::models::signature::{Signature, SignatureDocumentType, SignatureInput};
use crate::validation::JsonValidateExt;

async fn ensure_target(
    user: &User,
    db: &Pool<Sqlite>,
    document_type: SignatureDocumentType,
    document_id: i64,
) -> Result<(), AppError> {
    let mut conn = db.acquire().await?;
    let facility_id = target_facility(&mut conn, document_type, document_id).await?;
    user.ensure_facility(facility_id)
}

#[get("/signature?<document_type>&<document_id>")]
pub async fn api_list_signatures(
    document_type: SignatureDocumentType,
    document_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Vec<Signature>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    ensure_target(&user, db, document_type, document_id).await?;

    let signatures = list_signatures(db, document_type, document_id).await?;
    Ok(ApiResponse::success(signatures, "署名一覧を取得しました。"))
}

#[post("/signature", data = "<input>")]
pub async fn api_create_signature(
    input: Json<SignatureInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Signature>, AppError> {
    user.require_permission(Permission::WriteRecords)?;
    let input = input.validated()?;
    ensure_target(&user, db, input.document_type, input.document_id).await?;

    let signature = create_signature(db, &input).await?;
    Ok(ApiResponse::created(signature, "署名を登録しました。"))
}

#[delete("/signature/<id>")]
pub async fn api_delete_signature(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let signature = get_signature(db, id).await?;
    ensure_target(&user, db, signature.document_type, signature.document_id).await?;

    delete_signature(db, id).await?;
    Ok(ApiResponse::message("署名を削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![api_list_signatures, api_create_signature, api_delete_signature]
}
