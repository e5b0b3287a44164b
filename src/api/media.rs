use std::io::Cursor;

use rocket::form::Form;
use rocket::http::{ContentType, Header};
use rocket::response::{self, Responder, Response};
use rocket::{Request, Route, State};
use sqlx::{Pool, Sqlite};
use tracing::warn;

use crate::api::ApiResponse;
use crate::auth::{Permission, User};
use crate::config::AppConfig;
use crate::db::media::{create_media, delete_media, get_media};
use crate::error::AppError;
use crate::models::media::{Media, MediaUpload, NewMedia};
use crate::storage::SharedStorage;
use crate::validation::field_error;

const FALLBACK_NAME: &str = "upload";
const FALLBACK_MIME: &str = "application/octet-stream";

/// `attachment` header carrying the upload's own name: an ASCII `filename`
/// fallback plus the exact name as RFC 5987 `filename*`.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'!' | b'#' | b'$' | b'&' | b'+' | b'-'
            | b'.' | b'^' | b'_' | b'`' | b'|' | b'~' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

/// Raw file body with the stored mime type.
pub struct MediaDownload {
    content_type: ContentType,
    file_name: String,
    body: Vec<u8>,
}

impl<'r> Responder<'r, 'static> for MediaDownload {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        Response::build()
            .header(self.content_type)
            .header(Header::new(
                "Content-Disposition",
                content_disposition(&self.file_name),
            ))
            .sized_body(self.body.len(), Cursor::new(self.body))
            .ok()
    }
}

#[post("/media", data = "<upload>")]
pub async fn api_upload_media(
    mut upload: Form<MediaUpload<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    storage: &State<SharedStorage>,
) -> Result<ApiResponse<Media>, AppError> {
    user.require_permission(Permission::WriteRecords)?;

    let file = &mut upload.file;
    let size = file.len();
    if size == 0 {
        return Err(field_error("file", "ファイルを選択してください。"));
    }
    if size > config.max_upload_bytes {
        return Err(field_error("file", "アップロードできるサイズを超えています。"));
    }

    let original_name = file
        .raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string());
    let mime_type = file
        .content_type()
        .map(|ct| ct.to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let extension = file
        .content_type()
        .and_then(|ct| ct.extension())
        .map(|ext| ext.as_str().to_string())
        .unwrap_or_else(|| original_name.clone());

    let stored_name = storage.store(file, Some(&extension)).await?;

    let new_media = NewMedia {
        original_name: &original_name,
        stored_name: &stored_name,
        mime_type: &mime_type,
        size: size as i64,
        uploaded_by: user.id,
    };
    let media = match create_media(db, &new_media).await {
        Ok(media) => media,
        Err(err) => {
            if let Err(cleanup) = storage.remove(&stored_name).await {
                cleanup.log_and_record("Removing orphaned media file");
            }
            return Err(err);
        }
    };

    Ok(ApiResponse::created(media, "ファイルをアップロードしました。"))
}

#[get("/media/<id>")]
pub async fn api_get_media(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<Media>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let media = get_media(db, id).await?;

    Ok(ApiResponse::success(media, "メディアを取得しました。"))
}

#[get("/media/<id>/download")]
pub async fn api_download_media(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    storage: &State<SharedStorage>,
) -> Result<MediaDownload, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let media = get_media(db, id).await?;
    let body = storage.read(&media.stored_name).await?;

    Ok(MediaDownload {
        content_type: ContentType::parse_flexible(&media.mime_type).unwrap_or(ContentType::Binary),
        file_name: media.original_name,
        body,
    })
}

#[delete("/media/<id>")]
pub async fn api_delete_media(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    storage: &State<SharedStorage>,
) -> Result<ApiResponse<()>, AppError> {
    user.require_permission(Permission::DeleteRecords)?;
    let media = delete_media(db, id).await?;

    if let Err(err) = storage.remove(&media.stored_name).await {
        warn!(media_id = id, stored_name = %media.stored_name, "Media row deleted but file removal failed");
        err.log_and_record("Deleting media file");
    }

    Ok(ApiResponse::message("メディアを削除しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_upload_media,
        api_get_media,
        api_download_media,
        api_delete_media,
    ]
}

#[cfg(test)]
mod tests {
    use super::content_disposition;

    #[test]
    fn test_content_disposition_escapes_name() {
        assert_eq!(
            content_disposition("sign.png"),
            "attachment; filename=\"sign.png\"; filename*=UTF-8''sign.png"
        );
        assert_eq!(
            content_disposition("a\"b\\c.txt"),
            "attachment; filename=\"a_b_c.txt\"; filename*=UTF-8''a%22b%5Cc.txt"
        );
        assert_eq!(
            content_disposition("署名 1.png"),
            "attachment; filename=\"__ 1.png\"; filename*=UTF-8''%E7%BD%B2%E5%90%8D%201.png"
        );
    }
}
