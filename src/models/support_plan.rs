use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SupportPlanStatus {
    #[field(value = "draft")]
    Draft,
    #[field(value = "active")]
    Active,
    #[field(value = "completed")]
    Completed,
}

impl SupportPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportPlanStatus::Draft => "draft",
            SupportPlanStatus::Active => "active",
            SupportPlanStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SupportPlan {
    pub id: i64,
    pub service_user_id: i64,
    pub facility_id: i64,
    pub plan_start: NaiveDate,
    pub plan_end: NaiveDate,
    pub user_intention: Option<String>,
    pub long_term_goal: Option<String>,
    pub status: SupportPlanStatus,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SupportPlanGoal {
    pub id: i64,
    pub support_plan_id: i64,
    pub goal: String,
    pub priority: i64,
    pub target_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SupportPlanDetailRow {
    pub id: i64,
    pub support_plan_id: i64,
    pub goal_index: Option<i64>,
    pub support_content: String,
    pub frequency: Option<String>,
    pub responsible: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SupportPlanReview {
    pub id: i64,
    pub support_plan_id: i64,
    pub review_date: NaiveDate,
    pub reviewer_id: Option<i64>,
    pub evaluation: String,
    pub next_review_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportPlanDetail {
    #[serde(flatten)]
    pub plan: SupportPlan,
    pub goals: Vec<SupportPlanGoal>,
    pub details: Vec<SupportPlanDetailRow>,
    pub reviews: Vec<SupportPlanReview>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupportPlanGoalInput {
    #[validate(length(min = 1, max = 1000, message = "目標は1〜1000文字で入力してください。"))]
    pub goal: String,
    #[serde(default = "default_priority")]
    #[validate(range(min = 1, max = 10, message = "優先順位は1〜10で入力してください。"))]
    pub priority: i64,
    pub target_date: Option<NaiveDate>,
}

fn default_priority() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupportPlanDetailInput {
    /// Zero-based position of the goal this item supports.
    pub goal_index: Option<i64>,
    #[validate(length(min = 1, max = 2000, message = "支援内容は1〜2000文字で入力してください。"))]
    pub support_content: String,
    #[validate(length(max = 100, message = "頻度は100文字以内で入力してください。"))]
    pub frequency: Option<String>,
    #[validate(length(max = 100, message = "担当者は100文字以内で入力してください。"))]
    pub responsible: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupportPlanInput {
    pub service_user_id: i64,
    pub plan_start: NaiveDate,
    pub plan_end: NaiveDate,
    pub user_intention: Option<String>,
    pub long_term_goal: Option<String>,
    pub status: Option<SupportPlanStatus>,
    #[serde(default)]
    #[validate(nested)]
    pub goals: Vec<SupportPlanGoalInput>,
    #[serde(default)]
    #[validate(nested)]
    pub details: Vec<SupportPlanDetailInput>,
}

impl SupportPlanInput {
    /// First detail pointing past the goal list, if any.
    pub fn dangling_goal_index(&self) -> Option<usize> {
        let goals = self.goals.len() as i64;
        self.details
            .iter()
            .position(|d| matches!(d.goal_index, Some(i) if i < 0 || i >= goals))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SupportPlanReviewInput {
    pub review_date: NaiveDate,
    #[validate(length(min = 1, max = 5000, message = "評価は1〜5000文字で入力してください。"))]
    pub evaluation: String,
    pub next_review_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(goal_index: Option<i64>) -> SupportPlanDetailInput {
        SupportPlanDetailInput {
            goal_index,
            support_content: "服薬の声かけ".into(),
            frequency: None,
            responsible: None,
        }
    }

    #[test]
    fn test_dangling_goal_index() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let mut input = SupportPlanInput {
            service_user_id: 1,
            plan_start: date,
            plan_end: date,
            user_intention: None,
            long_term_goal: None,
            status: None,
            goals: vec![SupportPlanGoalInput {
                goal: "自立した生活".into(),
                priority: 1,
                target_date: None,
            }],
            details: vec![detail(Some(0)), detail(None)],
        };
        assert_eq!(input.dangling_goal_index(), None);

        input.details.push(detail(Some(1)));
        assert_eq!(input.dangling_goal_index(), Some(2));
    }
}
