use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::serde::json::Json;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::AppError;

pub static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9+\-() ]{7,20}$").expect("valid phone regex"));

pub static POSTAL_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}-?\d{4}$").expect("valid postal code regex"));

pub static YEAR_MONTH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").expect("valid year-month regex"));

pub const GENDERS: &[&str] = &["male", "female", "other"];

pub fn validate_gender(value: &str) -> Result<(), ValidationError> {
    if GENDERS.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::new("gender")
            .with_message("性別はmale、female、otherのいずれかを指定してください。".into()))
    }
}

fn default_message(error: &ValidationError) -> String {
    match error.code.as_ref() {
        "required" => "必須項目です。".to_string(),
        "length" => "文字数が範囲外です。".to_string(),
        "email" => "メールアドレスの形式が正しくありません。".to_string(),
        "range" => "値が範囲外です。".to_string(),
        "regex" => "形式が正しくありません。".to_string(),
        "must_match" => "確認用の値が一致しません。".to_string(),
        _ => "入力値が正しくありません。".to_string(),
    }
}

fn flatten_into(prefix: &str, errors: &ValidationErrors, out: &mut HashMap<String, Vec<String>>) {
    for (field, kind) in errors.errors() {
        let key = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let messages = field_errors.iter().map(|error| {
                    error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| default_message(error))
                });
                out.entry(key).or_default().extend(messages);
            }
            ValidationErrorsKind::Struct(nested) => flatten_into(&key, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    flatten_into(&format!("{}.{}", key, index), nested, out);
                }
            }
        }
    }
}

/// Flattens validator output into `field -> messages`, nested fields use
/// dotted paths (`items.0.amount`).
pub fn collect_field_errors(errors: &ValidationErrors) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    flatten_into("", errors, &mut out);
    out
}

pub fn field_error(field: &str, message: &str) -> AppError {
    let mut errors = HashMap::new();
    errors.insert(field.to_string(), vec![message.to_string()]);
    AppError::InvalidFields(errors)
}

pub fn ensure_date_order(
    start: NaiveDate,
    end: NaiveDate,
    end_field: &str,
    message: &str,
) -> Result<(), AppError> {
    if end < start {
        return Err(field_error(end_field, message));
    }
    Ok(())
}

pub trait JsonValidateExt<T> {
    fn validated(self) -> Result<T, AppError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validated(self) -> Result<T, AppError> {
        let inner = self.into_inner();
        inner.validate()?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Item {
        #[validate(range(min = 0, message = "金額は0以上で入力してください。"))]
        amount: i64,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Form {
        #[validate(email)]
        email: String,
        #[validate(regex(path = *POSTAL_CODE_REGEX))]
        postal_code: String,
        #[validate(custom(function = "validate_gender"))]
        gender: Option<String>,
        #[validate(nested)]
        items: Vec<Item>,
    }

    #[test]
    fn test_collects_nested_field_errors() {
        let form = Form {
            email: "not-an-email".into(),
            postal_code: "12-34".into(),
            gender: Some("unknown".into()),
            items: vec![Item { amount: 10 }, Item { amount: -1 }],
        };

        let errors = collect_field_errors(&form.validate().unwrap_err());

        assert_eq!(errors["email"], vec!["メールアドレスの形式が正しくありません。"]);
        assert_eq!(errors["postal_code"], vec!["形式が正しくありません。"]);
        assert!(errors["gender"][0].contains("male"));
        assert_eq!(errors["items.1.amount"], vec!["金額は0以上で入力してください。"]);
        assert!(!errors.contains_key("items.0.amount"));
    }

    #[test]
    fn test_regexes() {
        assert!(PHONE_REGEX.is_match("03-1234-5678"));
        assert!(!PHONE_REGEX.is_match("phone"));
        assert!(POSTAL_CODE_REGEX.is_match("100-0001"));
        assert!(POSTAL_CODE_REGEX.is_match("1000001"));
        assert!(YEAR_MONTH_REGEX.is_match("2025-04"));
        assert!(!YEAR_MONTH_REGEX.is_match("2025-13"));
    }

    #[test]
    fn test_date_order() {
        let start = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();

        assert!(ensure_date_order(start, start, "end", "x").is_ok());
        assert!(matches!(
            ensure_date_order(start, end, "plan_end", "x"),
            Err(AppError::InvalidFields(_))
        ));
    }
}
