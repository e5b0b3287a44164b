use std::path::PathBuf;

use chrono::Duration;
use rocket::figment::Figment;
use serde::Deserialize;

use crate::error::AppError;

/// Application settings read from Rocket's figment, so `Rocket.toml` and
/// `ROCKET_*` environment variables both apply.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl_minutes")]
    pub access_token_ttl_minutes: i64,
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    #[serde(default = "default_password_reset_ttl_minutes")]
    pub password_reset_ttl_minutes: i64,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_access_token_ttl_minutes() -> i64 {
    60
}

fn default_refresh_token_ttl_days() -> i64 {
    7
}

fn default_password_reset_ttl_minutes() -> i64 {
    60
}

fn default_media_root() -> PathBuf {
    PathBuf::from("storage/media")
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_per_page() -> i64 {
    15
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, crate::Error> {
        let config: AppConfig = figment.extract()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), AppError> {
        if self.jwt_secret.len() < 16 {
            return Err(AppError::Internal(
                "jwt_secret must be at least 16 characters".to_string(),
            ));
        }
        if self.access_token_ttl_minutes <= 0 || self.refresh_token_ttl_days <= 0 {
            return Err(AppError::Internal(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.per_page <= 0 {
            return Err(AppError::Internal("per_page must be positive".to_string()));
        }
        Ok(())
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::minutes(self.access_token_ttl_minutes)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_ttl_days)
    }

    pub fn password_reset_ttl(&self) -> Duration {
        Duration::minutes(self.password_reset_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocket::figment::providers::Serialized;

    #[test]
    fn test_defaults_applied() {
        let figment = Figment::from(Serialized::defaults(serde_json::json!({
            "jwt_secret": "0123456789abcdef0123"
        })));
        let config = AppConfig::from_figment(&figment).unwrap();

        assert_eq!(config.access_token_ttl_minutes, 60);
        assert_eq!(config.refresh_token_ttl_days, 7);
        assert_eq!(config.per_page, 15);
        assert_eq!(config.refresh_token_ttl(), Duration::days(7));
    }

    #[test]
    fn test_missing_or_short_secret_fails() {
        let figment = Figment::from(Serialized::defaults(serde_json::json!({})));
        assert!(AppConfig::from_figment(&figment).is_err());

        let figment = Figment::from(Serialized::defaults(serde_json::json!({
            "jwt_secret": "short"
        })));
        assert!(AppConfig::from_figment(&figment).is_err());
    }
}
