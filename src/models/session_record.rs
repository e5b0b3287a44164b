use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RecordType {
    #[field(value = "training")]
    Training,
    #[field(value = "meeting")]
    Meeting,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Training => "training",
            RecordType::Meeting => "meeting",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub record_type: RecordType,
    pub facility_id: i64,
    pub title: String,
    pub held_on: NaiveDate,
    pub location: Option<String>,
    pub content: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Participant {
    pub user_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecordDetail {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SessionRecordInput {
    pub record_type: RecordType,
    pub facility_id: i64,
    #[validate(length(min = 1, max = 255, message = "件名は1〜255文字で入力してください。"))]
    pub title: String,
    pub held_on: NaiveDate,
    #[validate(length(max = 255, message = "場所は255文字以内で入力してください。"))]
    pub location: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<i64>,
}
