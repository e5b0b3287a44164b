use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::AppError;
use crate::validation::{YEAR_MONTH_REGEX, field_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DocumentType {
    Consent,
    Payment,
    Confidentiality,
    InformationConsent,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Consent => "consent",
            DocumentType::Payment => "payment",
            DocumentType::Confidentiality => "confidentiality",
            DocumentType::InformationConsent => "information_consent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, FromFormField)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[field(value = "draft")]
    Draft,
    #[field(value = "issued")]
    Issued,
    #[field(value = "signed")]
    Signed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Issued => "issued",
            DocumentStatus::Signed => "signed",
        }
    }
}

/// The document workflows exposed as their own resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Consent,
    Payment,
    Confidentiality,
}

impl DocumentKind {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentKind::Consent => DocumentType::Consent,
            DocumentKind::Payment => DocumentType::Payment,
            DocumentKind::Confidentiality => DocumentType::Confidentiality,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::Consent => "同意書",
            DocumentKind::Payment => "支払記録",
            DocumentKind::Confidentiality => "秘密保持誓約書",
        }
    }

    /// Checks the metadata carries every key this kind requires, with the
    /// expected format.
    pub fn check_metadata(&self, metadata: &BTreeMap<String, Value>) -> Result<(), AppError> {
        let mut errors: HashMap<String, Vec<String>> = HashMap::new();
        let mut fail = |key: &str, message: &str| {
            errors
                .entry(format!("metadata.{}", key))
                .or_default()
                .push(message.to_string());
        };

        match self {
            DocumentKind::Consent => match metadata.get("consent_items") {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::Array(items)) if !items.is_empty() => {}
                _ => fail("consent_items", "同意項目は必須です。"),
            },
            DocumentKind::Payment => {
                match metadata.get("amount") {
                    Some(Value::Number(n)) if n.as_u64().is_some() => {}
                    _ => fail("amount", "金額は0以上の整数で入力してください。"),
                }
                match metadata.get("payment_method") {
                    Some(Value::String(s)) if !s.trim().is_empty() => {}
                    _ => fail("payment_method", "支払方法は必須です。"),
                }
                match metadata.get("billing_month") {
                    Some(Value::String(s)) if YEAR_MONTH_REGEX.is_match(s) => {}
                    _ => fail("billing_month", "請求月はYYYY-MM形式で入力してください。"),
                }
            }
            DocumentKind::Confidentiality => match metadata.get("agreement_date") {
                Some(Value::String(s)) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => {}
                _ => fail("agreement_date", "誓約日はYYYY-MM-DD形式で入力してください。"),
            },
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidFields(errors))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: i64,
    pub document_type: DocumentType,
    pub facility_id: i64,
    pub service_user_id: Option<i64>,
    pub user_id: Option<i64>,
    pub title: String,
    pub status: DocumentStatus,
    pub issued_date: Option<NaiveDate>,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub metadata: BTreeMap<String, Value>,
}

/// Body for document create and update. On update, a `null` metadata value
/// removes that key.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DocumentInput {
    pub facility_id: i64,
    pub service_user_id: Option<i64>,
    pub user_id: Option<i64>,
    #[validate(length(min = 1, max = 255, message = "表題は1〜255文字で入力してください。"))]
    pub title: String,
    pub status: Option<DocumentStatus>,
    pub issued_date: Option<NaiveDate>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl DocumentInput {
    /// `signed` is only reached by recording a signature.
    pub fn check_status(&self) -> Result<(), AppError> {
        if self.status == Some(DocumentStatus::Signed) {
            return Err(field_error(
                "status",
                "署名済みへの変更は署名登録でのみ行えます。",
            ));
        }
        Ok(())
    }
}

/// Applies `changes` to `current`: nulls delete, anything else overwrites.
pub fn merge_metadata(
    current: &BTreeMap<String, Value>,
    changes: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = current.clone();
    for (key, value) in changes {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_payment_metadata_rules() {
        let ok = meta(json!({"amount": 30000, "payment_method": "振込", "billing_month": "2025-04"}));
        assert!(DocumentKind::Payment.check_metadata(&ok).is_ok());

        let bad = meta(json!({"amount": -5, "billing_month": "2025-4"}));
        match DocumentKind::Payment.check_metadata(&bad) {
            Err(AppError::InvalidFields(errors)) => {
                assert!(errors.contains_key("metadata.amount"));
                assert!(errors.contains_key("metadata.payment_method"));
                assert!(errors.contains_key("metadata.billing_month"));
            }
            other => panic!("Expected field errors, got {:?}", other),
        }
    }

    #[test]
    fn test_consent_and_confidentiality_rules() {
        assert!(DocumentKind::Consent
            .check_metadata(&meta(json!({"consent_items": ["個人情報の利用"]})))
            .is_ok());
        assert!(DocumentKind::Consent
            .check_metadata(&meta(json!({"consent_items": []})))
            .is_err());

        assert!(DocumentKind::Confidentiality
            .check_metadata(&meta(json!({"agreement_date": "2025-04-01", "extra": 1})))
            .is_ok());
        assert!(DocumentKind::Confidentiality
            .check_metadata(&meta(json!({"agreement_date": "2025/04/01"})))
            .is_err());
    }

    #[test]
    fn test_signed_status_is_not_accepted_from_input() {
        let mut input: DocumentInput = serde_json::from_value(json!({
            "facility_id": 1,
            "title": "利用契約書",
            "status": "issued"
        }))
        .unwrap();
        assert!(input.check_status().is_ok());

        input.status = Some(DocumentStatus::Signed);
        match input.check_status() {
            Err(AppError::InvalidFields(errors)) => assert!(errors.contains_key("status")),
            other => panic!("Expected a status field error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_metadata_null_removes_key() {
        let current = meta(json!({"amount": 100, "note": "x"}));
        let merged = merge_metadata(&current, &meta(json!({"note": null, "amount": 200})));

        assert_eq!(merged.get("amount"), Some(&json!(200)));
        assert!(!merged.contains_key("note"));
    }
}
