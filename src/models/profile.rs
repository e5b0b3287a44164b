use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::{PHONE_REGEX, POSTAL_CODE_REGEX, validate_gender};

/// Which kind of account a profile row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UserType {
    User,
    ServiceUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub user_type: UserType,
    pub full_name: Option<String>,
    pub furigana: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Profile fields; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileInput {
    #[validate(length(max = 100, message = "氏名は100文字以内で入力してください。"))]
    pub full_name: Option<String>,
    #[validate(length(max = 100, message = "ふりがなは100文字以内で入力してください。"))]
    pub furigana: Option<String>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[validate(regex(path = *PHONE_REGEX, message = "電話番号の形式が正しくありません。"))]
    pub phone: Option<String>,
    #[validate(regex(path = *POSTAL_CODE_REGEX, message = "郵便番号の形式が正しくありません。"))]
    pub postal_code: Option<String>,
    #[validate(length(max = 500, message = "住所は500文字以内で入力してください。"))]
    pub address: Option<String>,
    #[validate(length(max = 255, message = "緊急連絡先は255文字以内で入力してください。"))]
    pub emergency_contact: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PasswordChangeInput {
    pub current_password: String,
    #[validate(length(min = 8, max = 128, message = "パスワードは8〜128文字で入力してください。"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "確認用パスワードが一致しません。"))]
    pub password_confirmation: String,
}
