use chrono::NaiveDateTime;
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentType {
    #[field(value = "accident")]
    Accident,
    #[field(value = "near_miss")]
    NearMiss,
    #[field(value = "complaint")]
    Complaint,
    #[field(value = "other")]
    Other,
}

impl IncidentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::Accident => "accident",
            IncidentType::NearMiss => "near_miss",
            IncidentType::Complaint => "complaint",
            IncidentType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Severity {
    #[field(value = "low")]
    Low,
    #[field(value = "medium")]
    Medium,
    #[field(value = "high")]
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum IncidentStatus {
    #[field(value = "open")]
    Open,
    #[field(value = "resolved")]
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Incident {
    pub id: i64,
    pub facility_id: i64,
    pub service_user_id: Option<i64>,
    pub occurred_at: NaiveDateTime,
    pub place: Option<String>,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub description: String,
    pub response: Option<String>,
    pub prevention: Option<String>,
    pub family_notified: bool,
    pub status: IncidentStatus,
    pub reported_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct IncidentInput {
    pub facility_id: i64,
    pub service_user_id: Option<i64>,
    pub occurred_at: NaiveDateTime,
    #[validate(length(max = 255, message = "発生場所は255文字以内で入力してください。"))]
    pub place: Option<String>,
    pub incident_type: IncidentType,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[validate(length(min = 1, max = 5000, message = "内容は1〜5000文字で入力してください。"))]
    pub description: String,
    pub response: Option<String>,
    pub prevention: Option<String>,
    #[serde(default)]
    pub family_notified: bool,
    #[serde(default = "default_status")]
    pub status: IncidentStatus,
}

fn default_severity() -> Severity {
    Severity::Low
}

fn default_status() -> IncidentStatus {
    IncidentStatus::Open
}
