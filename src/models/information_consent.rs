use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::document::DocumentStatus;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InformationConsent {
    pub id: i64,
    pub document_id: i64,
    pub service_user_id: i64,
    pub consenter_name: String,
    pub relationship: Option<String>,
    pub consent_date: NaiveDate,
    pub purpose: String,
    pub shared_with: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub facility_id: i64,
    pub title: String,
    pub document_status: DocumentStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InformationConsentInput {
    pub service_user_id: i64,
    #[validate(length(min = 1, max = 255, message = "表題は1〜255文字で入力してください。"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "同意者名は1〜100文字で入力してください。"))]
    pub consenter_name: String,
    #[validate(length(max = 50, message = "続柄は50文字以内で入力してください。"))]
    pub relationship: Option<String>,
    pub consent_date: NaiveDate,
    #[validate(length(min = 1, max = 2000, message = "利用目的は1〜2000文字で入力してください。"))]
    pub purpose: String,
    #[validate(length(max = 2000, message = "提供先は2000文字以内で入力してください。"))]
    pub shared_with: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

impl InformationConsentInput {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or("個人情報提供同意書")
    }
}
