use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyReport {
    pub id: i64,
    pub facility_id: i64,
    pub report_date: NaiveDate,
    pub weather: Option<String>,
    pub summary: Option<String>,
    pub special_notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyReportStaff {
    pub id: i64,
    pub daily_report_id: i64,
    pub user_id: i64,
    pub shift: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyReportServiceUser {
    pub id: i64,
    pub daily_report_id: i64,
    pub service_user_id: i64,
    pub condition: Option<String>,
    pub meal: Option<String>,
    pub bath: bool,
    pub medication: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReportDetail {
    #[serde(flatten)]
    pub report: DailyReport,
    pub staffs: Vec<DailyReportStaff>,
    pub service_users: Vec<DailyReportServiceUser>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DailyReportStaffInput {
    pub user_id: i64,
    #[validate(length(max = 50, message = "勤務区分は50文字以内で入力してください。"))]
    pub shift: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DailyReportServiceUserInput {
    pub service_user_id: i64,
    #[validate(length(max = 255, message = "体調は255文字以内で入力してください。"))]
    pub condition: Option<String>,
    #[validate(length(max = 255, message = "食事は255文字以内で入力してください。"))]
    pub meal: Option<String>,
    #[serde(default)]
    pub bath: bool,
    #[serde(default)]
    pub medication: bool,
    pub note: Option<String>,
}

/// Report body; `staffs` and `service_users` replace the stored rows.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DailyReportInput {
    pub facility_id: i64,
    pub report_date: NaiveDate,
    #[validate(length(max = 50, message = "天気は50文字以内で入力してください。"))]
    pub weather: Option<String>,
    pub summary: Option<String>,
    pub special_notes: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub staffs: Vec<DailyReportStaffInput>,
    #[serde(default)]
    #[validate(nested)]
    pub service_users: Vec<DailyReportServiceUserInput>,
}
