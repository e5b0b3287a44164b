use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::media::{Media, NewMedia};

#[instrument(skip(pool))]
pub async fn create_media(pool: &Pool<Sqlite>, media: &NewMedia<'_>) -> Result<Media, AppError> {
    info!("Recording uploaded media");
    let row = sqlx::query_as::<_, Media>(
        "INSERT INTO media (original_name, stored_name, mime_type, size, uploaded_by)
         VALUES (?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(media.original_name)
    .bind(media.stored_name)
    .bind(media.mime_type)
    .bind(media.size)
    .bind(media.uploaded_by)
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_write(e, "メディアを登録できません。"))?;

    Ok(row)
}

#[instrument(skip(pool))]
pub async fn get_media(pool: &Pool<Sqlite>, id: i64) -> Result<Media, AppError> {
    sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("メディア", id))
}

/// Deletes the row and hands it back so the caller can drop the file.
#[instrument(skip(pool))]
pub async fn delete_media(pool: &Pool<Sqlite>, id: i64) -> Result<Media, AppError> {
    info!("Deleting media row");
    sqlx::query_as::<_, Media>("DELETE FROM media WHERE id = ? RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("メディア", id))
}
