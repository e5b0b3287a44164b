use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::PHONE_REGEX;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FamilyMember {
    pub id: i64,
    pub name: String,
    pub furigana: Option<String>,
    pub relationship: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub is_emergency_contact: bool,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FamilyMemberInput {
    #[validate(length(min = 1, max = 100, message = "氏名は1〜100文字で入力してください。"))]
    pub name: String,
    #[validate(length(max = 100, message = "ふりがなは100文字以内で入力してください。"))]
    pub furigana: Option<String>,
    #[validate(length(min = 1, max = 50, message = "続柄は1〜50文字で入力してください。"))]
    pub relationship: String,
    #[validate(regex(path = *PHONE_REGEX, message = "電話番号の形式が正しくありません。"))]
    pub phone: Option<String>,
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: Option<String>,
    #[validate(length(max = 500, message = "住所は500文字以内で入力してください。"))]
    pub address: Option<String>,
    #[serde(default)]
    pub is_emergency_contact: bool,
    pub note: Option<String>,
}

/// Several family members registered against one consultation.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FamilyMemberBatch {
    pub consultation_id: i64,
    #[validate(length(min = 1, message = "家族を1人以上入力してください。"), nested)]
    pub members: Vec<FamilyMemberInput>,
}
