use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceProvisionLog {
    pub id: i64,
    pub service_user_id: i64,
    pub facility_id: i64,
    pub service_date: NaiveDate,
    pub service_type: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub pickup: bool,
    pub meal_provided: bool,
    pub note: Option<String>,
    pub staff_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServiceProvisionLogInput {
    pub service_user_id: i64,
    pub service_date: NaiveDate,
    #[validate(length(min = 1, max = 100, message = "サービス種別は1〜100文字で入力してください。"))]
    pub service_type: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub pickup: bool,
    #[serde(default)]
    pub meal_provided: bool,
    pub note: Option<String>,
    pub staff_id: Option<i64>,
}

impl ServiceProvisionLogInput {
    /// `end_time` must be strictly after `start_time` when both are set.
    pub fn times_in_order(&self) -> bool {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end > start,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(start: Option<(u32, u32)>, end: Option<(u32, u32)>) -> ServiceProvisionLogInput {
        let time = |(h, m): (u32, u32)| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        ServiceProvisionLogInput {
            service_user_id: 1,
            service_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            service_type: "生活介護".into(),
            start_time: start.map(time),
            end_time: end.map(time),
            pickup: false,
            meal_provided: true,
            note: None,
            staff_id: None,
        }
    }

    #[test]
    fn test_end_time_must_follow_start_time() {
        assert!(input(Some((9, 0)), Some((15, 30))).times_in_order());
        assert!(input(Some((9, 0)), None).times_in_order());
        assert!(input(None, None).times_in_order());
        assert!(!input(Some((15, 0)), Some((9, 0))).times_in_order());
        assert!(!input(Some((9, 0)), Some((9, 0))).times_in_order());
    }
}
