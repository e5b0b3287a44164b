use std::collections::HashMap;

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

/// Uniform `{success, data, message}` body used by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, Vec<String>>>,
}

#[derive(Debug)]
pub struct ApiResponse<T> {
    status: Status,
    body: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            body: Envelope {
                success: true,
                data: Some(data),
                message: message.into(),
                errors: None,
            },
        }
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self {
            status: Status::Created,
            ..Self::success(data, message)
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            body: Envelope {
                success: true,
                data: None,
                message: message.into(),
                errors: None,
            },
        }
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            body: Envelope {
                success: false,
                data: None,
                message: message.into(),
                errors: None,
            },
        }
    }

    pub fn validation_error(
        message: impl Into<String>,
        errors: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            status: Status::UnprocessableEntity,
            body: Envelope {
                success: false,
                data: None,
                message: message.into(),
                errors: Some(errors),
            },
        }
    }
}

impl<'r, T: Serialize> rocket::response::Responder<'r, 'static> for ApiResponse<T> {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        Custom(self.status, Json(self.body)).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let response = ApiResponse::created(vec![1, 2], "作成しました。");
        assert_eq!(response.status(), Status::Created);

        let json = serde_json::to_value(&response.body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_error_envelope_has_null_data() {
        let mut errors = HashMap::new();
        errors.insert("email".to_string(), vec!["必須です。".to_string()]);
        let response = ApiResponse::validation_error("入力内容に誤りがあります。", errors);

        let json = serde_json::to_value(&response.body).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["errors"]["email"][0], "必須です。");
    }
}
