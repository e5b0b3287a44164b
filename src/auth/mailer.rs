use std::sync::Arc;

use tracing::info;

use crate::error::AppError;

/// Delivery seam for password-reset tokens.
pub trait PasswordResetMailer: Send + Sync {
    fn send_reset_token(&self, email: &str, token: &str) -> Result<(), AppError>;
}

pub type SharedMailer = Arc<dyn PasswordResetMailer>;

/// Writes the reset notification to the log instead of sending mail.
pub struct LogMailer;

impl PasswordResetMailer for LogMailer {
    fn send_reset_token(&self, email: &str, _token: &str) -> Result<(), AppError> {
        info!(email = %email, "Password reset token issued");
        Ok(())
    }
}
