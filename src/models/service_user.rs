use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::family_member::FamilyMember;
use crate::models::profile::{Profile, ProfileInput};
use crate::validation::validate_gender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ServiceUserStatus {
    #[field(value = "active")]
    Active,
    #[field(value = "suspended")]
    Suspended,
    #[field(value = "discharged")]
    Discharged,
}

impl ServiceUserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceUserStatus::Active => "active",
            ServiceUserStatus::Suspended => "suspended",
            ServiceUserStatus::Discharged => "discharged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceUser {
    pub id: i64,
    pub consultation_id: Option<i64>,
    pub facility_id: i64,
    pub name: String,
    pub furigana: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub disability_category: Option<String>,
    pub certificate_number: Option<String>,
    pub move_in_date: Option<NaiveDate>,
    pub move_out_date: Option<NaiveDate>,
    pub status: ServiceUserStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUserDetail {
    #[serde(flatten)]
    pub service_user: ServiceUser,
    pub profile: Option<Profile>,
    pub family_members: Vec<FamilyMember>,
}

/// Body for creating and updating a service user. `consultation_id` is only
/// read on create.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServiceUserInput {
    pub consultation_id: Option<i64>,
    pub facility_id: Option<i64>,
    #[validate(length(min = 1, max = 100, message = "氏名は1〜100文字で入力してください。"))]
    pub name: String,
    #[validate(length(max = 100, message = "ふりがなは100文字以内で入力してください。"))]
    pub furigana: Option<String>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 100, message = "障害区分は100文字以内で入力してください。"))]
    pub disability_category: Option<String>,
    #[validate(length(max = 50, message = "受給者証番号は50文字以内で入力してください。"))]
    pub certificate_number: Option<String>,
    pub move_in_date: Option<NaiveDate>,
    pub move_out_date: Option<NaiveDate>,
    pub status: Option<ServiceUserStatus>,
    #[validate(nested)]
    pub profile: Option<ProfileInput>,
}

impl ServiceUserInput {
    /// The profile to store alongside the service user. Identity fields
    /// default to the service user's own.
    pub fn profile_input(&self) -> ProfileInput {
        let mut profile = self.profile.clone().unwrap_or_default();
        profile.full_name = profile.full_name.or_else(|| Some(self.name.clone()));
        profile.furigana = profile.furigana.or_else(|| self.furigana.clone());
        profile.gender = profile.gender.or_else(|| self.gender.clone());
        profile.birthday = profile.birthday.or(self.birthday);
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_to_service_user_fields() {
        let input: ServiceUserInput = serde_json::from_value(serde_json::json!({
            "consultation_id": 1,
            "name": "山田 太郎",
            "furigana": "やまだ たろう",
            "profile": { "phone": "090-1234-5678", "furigana": "ヤマダ タロウ" }
        }))
        .unwrap();

        let profile = input.profile_input();
        assert_eq!(profile.full_name.as_deref(), Some("山田 太郎"));
        assert_eq!(profile.furigana.as_deref(), Some("ヤマダ タロウ"));
        assert_eq!(profile.phone.as_deref(), Some("090-1234-5678"));
    }
}
