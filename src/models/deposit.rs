use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;
use crate::validation::field_error;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deposit {
    pub id: i64,
    pub service_user_id: i64,
    pub facility_id: i64,
    pub deposit_date: NaiveDate,
    pub total_amount: i64,
    pub note: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DepositItem {
    pub id: i64,
    pub deposit_id: i64,
    pub item_name: String,
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositDetail {
    #[serde(flatten)]
    pub deposit: Deposit,
    pub items: Vec<DepositItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DepositItemInput {
    #[validate(length(min = 1, max = 100, message = "品目は1〜100文字で入力してください。"))]
    pub item_name: String,
    #[validate(range(min = 0, message = "金額は0以上で入力してください。"))]
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DepositInput {
    pub service_user_id: i64,
    pub deposit_date: NaiveDate,
    pub note: Option<String>,
    #[validate(length(min = 1, message = "明細を1件以上入力してください。"), nested)]
    pub items: Vec<DepositItemInput>,
}

impl DepositInput {
    pub fn total_amount(&self) -> Result<i64, AppError> {
        self.items
            .iter()
            .try_fold(0i64, |total, item| total.checked_add(item.amount))
            .ok_or_else(|| field_error("items", "金額の合計が大きすぎます。"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_sum_of_items() {
        let input: DepositInput = serde_json::from_value(serde_json::json!({
            "service_user_id": 1,
            "deposit_date": "2025-04-01",
            "items": [
                {"item_name": "日用品", "amount": 1200},
                {"item_name": "小遣い", "amount": 3000}
            ]
        }))
        .unwrap();

        assert_eq!(input.total_amount().unwrap(), 4200);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_total_overflow_is_a_field_error() {
        let input: DepositInput = serde_json::from_value(serde_json::json!({
            "service_user_id": 1,
            "deposit_date": "2025-04-01",
            "items": [
                {"item_name": "日用品", "amount": i64::MAX},
                {"item_name": "小遣い", "amount": 2}
            ]
        }))
        .unwrap();

        match input.total_amount() {
            Err(AppError::InvalidFields(errors)) => assert!(errors.contains_key("items")),
            other => panic!("Expected an items field error, got {:?}", other),
        }
    }

    #[test]
    fn test_items_are_required() {
        let input: DepositInput = serde_json::from_value(serde_json::json!({
            "service_user_id": 1,
            "deposit_date": "2025-04-01",
            "items": []
        }))
        .unwrap();

        let errors = crate::validation::collect_field_errors(&input.validate().unwrap_err());
        assert!(errors.contains_key("items"));
    }
}
