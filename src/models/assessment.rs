use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Assessment row joined with the owning service user's facility.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assessment {
    pub id: i64,
    pub service_user_id: i64,
    pub facility_id: i64,
    pub assessment_date: NaiveDate,
    pub assessor_id: Option<i64>,
    pub summary: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LivingDomain {
    pub id: i64,
    pub assessment_id: i64,
    pub domain: String,
    pub current_status: Option<String>,
    pub needs: Option<String>,
    pub support_level: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MedicalHistory {
    pub id: i64,
    pub assessment_id: i64,
    pub condition_name: String,
    pub diagnosed_on: Option<NaiveDate>,
    pub hospital: Option<String>,
    pub medication: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentDetail {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub living_domains: Vec<LivingDomain>,
    pub medical_histories: Vec<MedicalHistory>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LivingDomainInput {
    #[validate(length(min = 1, max = 100, message = "生活領域は1〜100文字で入力してください。"))]
    pub domain: String,
    pub current_status: Option<String>,
    pub needs: Option<String>,
    #[validate(range(min = 1, max = 5, message = "支援度は1〜5で入力してください。"))]
    pub support_level: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MedicalHistoryInput {
    #[validate(length(min = 1, max = 255, message = "疾患・障害名は1〜255文字で入力してください。"))]
    pub condition_name: String,
    pub diagnosed_on: Option<NaiveDate>,
    #[validate(length(max = 255, message = "医療機関は255文字以内で入力してください。"))]
    pub hospital: Option<String>,
    pub medication: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AssessmentInput {
    pub service_user_id: i64,
    pub assessment_date: NaiveDate,
    pub assessor_id: Option<i64>,
    pub summary: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub living_domains: Vec<LivingDomainInput>,
    #[serde(default)]
    #[validate(nested)]
    pub medical_histories: Vec<MedicalHistoryInput>,
}
