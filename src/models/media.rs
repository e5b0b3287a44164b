use chrono::NaiveDateTime;
use rocket::fs::TempFile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: i64,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(FromForm)]
pub struct MediaUpload<'r> {
    pub file: TempFile<'r>,
}

#[derive(Debug)]
pub struct NewMedia<'a> {
    pub original_name: &'a str,
    pub stored_name: &'a str,
    pub mime_type: &'a str,
    pub size: i64,
    pub uploaded_by: i64,
}
