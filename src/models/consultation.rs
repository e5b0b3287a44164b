use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::family_member::{FamilyMember, FamilyMemberInput};
use crate::validation::PHONE_REGEX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConsultationStatus {
    #[field(value = "pending")]
    Pending,
    #[field(value = "accepted")]
    Accepted,
    #[field(value = "rejected")]
    Rejected,
}

impl ConsultationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationStatus::Pending => "pending",
            ConsultationStatus::Accepted => "accepted",
            ConsultationStatus::Rejected => "rejected",
        }
    }

    /// Only pending consultations can be reviewed, and a review always
    /// settles on accepted or rejected.
    pub fn can_transition_to(&self, next: ConsultationStatus) -> bool {
        matches!(
            (self, next),
            (
                ConsultationStatus::Pending,
                ConsultationStatus::Accepted | ConsultationStatus::Rejected
            )
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Consultation {
    pub id: i64,
    pub facility_id: i64,
    pub consultation_date: NaiveDate,
    pub applicant_name: String,
    pub applicant_phone: Option<String>,
    pub route: Option<String>,
    pub content: Option<String>,
    pub status: ConsultationStatus,
    pub staff_id: Option<i64>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationDetail {
    #[serde(flatten)]
    pub consultation: Consultation,
    pub family_members: Vec<FamilyMember>,
    pub service_user_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConsultationInput {
    pub facility_id: i64,
    pub consultation_date: NaiveDate,
    #[validate(length(min = 1, max = 100, message = "相談者名は1〜100文字で入力してください。"))]
    pub applicant_name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "電話番号の形式が正しくありません。"))]
    pub applicant_phone: Option<String>,
    #[validate(length(max = 100, message = "相談経路は100文字以内で入力してください。"))]
    pub route: Option<String>,
    #[validate(length(max = 5000, message = "相談内容は5000文字以内で入力してください。"))]
    pub content: Option<String>,
    pub staff_id: Option<i64>,
    pub note: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub family_members: Vec<FamilyMemberInput>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConsultationStatusInput {
    pub status: ConsultationStatus,
}
