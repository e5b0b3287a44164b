use chrono::NaiveDateTime;
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::{PHONE_REGEX, POSTAL_CODE_REGEX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FacilityType {
    #[field(value = "group_home")]
    GroupHome,
    #[field(value = "day_service")]
    DayService,
    #[field(value = "short_stay")]
    ShortStay,
    #[field(value = "employment_support")]
    EmploymentSupport,
}

impl FacilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::GroupHome => "group_home",
            FacilityType::DayService => "day_service",
            FacilityType::ShortStay => "short_stay",
            FacilityType::EmploymentSupport => "employment_support",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub facility_type: FacilityType,
    pub postal_code: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub capacity: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FacilityInput {
    #[validate(length(min = 1, max = 255, message = "施設名は1〜255文字で入力してください。"))]
    pub name: String,
    pub facility_type: FacilityType,
    #[validate(regex(path = *POSTAL_CODE_REGEX, message = "郵便番号の形式が正しくありません。"))]
    pub postal_code: Option<String>,
    #[validate(length(max = 500, message = "住所は500文字以内で入力してください。"))]
    pub address: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "電話番号の形式が正しくありません。"))]
    pub phone: Option<String>,
    #[validate(range(min = 0, max = 1000, message = "定員は0〜1000で入力してください。"))]
    pub capacity: Option<i64>,
}

/// A staff member assigned to a facility.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FacilityMember {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub user_role: String,
    pub facility_role: String,
    pub assigned_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FacilityMemberInput {
    pub user_id: i64,
    #[validate(length(min = 1, max = 50, message = "施設での役割は1〜50文字で入力してください。"))]
    pub role: String,
}
