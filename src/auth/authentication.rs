use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use sqlx::SqlitePool;

use crate::api::ApiResponse;
use crate::config::AppConfig;
use crate::db::users::get_user;

use super::{User, decode_access_token};

fn bearer_token<'r>(request: &'r Request<'_>) -> Option<&'r str> {
    request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let Some(token) = bearer_token(request) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let (Some(db), Some(config)) = (
            request.rocket().state::<SqlitePool>(),
            request.rocket().state::<AppConfig>(),
        ) else {
            tracing::error!("Database pool or config not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let claims = match decode_access_token(&config.jwt_secret, token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(error = ?err, "Rejected bearer token");
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        match get_user(db, claims.sub).await {
            Ok(user) if user.is_active => {
                tracing::info!(user_id = %user.id, role = %user.role.as_str(), "User authenticated via bearer token");
                Outcome::Success(user)
            }
            Ok(user) => {
                tracing::warn!(user_id = %user.id, "Inactive user presented a valid token");
                Outcome::Error((Status::Unauthorized, ()))
            }
            Err(err) => {
                tracing::warn!(user_id = %claims.sub, error = ?err, "Token subject could not be loaded");
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> ApiResponse<()> {
    tracing::warn!("Unauthorized access attempt");
    ApiResponse::error(Status::Unauthorized, "認証が必要です。")
}
