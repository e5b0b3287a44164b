use chrono::Utc;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::api::ApiResponse;
use crate::auth::{
    IssuedTokens, SharedMailer, User, encode_access_token, generate_opaque_token, hash_token,
};
use crate::config::AppConfig;
use crate::db::users::{
    authenticate_user, consume_refresh_token, create_password_reset, create_refresh_token,
    find_user_id_by_email, get_user, reset_password, revoke_all_refresh_tokens,
    revoke_refresh_token,
};
use crate::error::AppError;
use crate::validation::JsonValidateExt;

const INVALID_CREDENTIALS: &str = "メールアドレスまたはパスワードが正しくありません。";

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: String,
    #[validate(length(min = 1, message = "パスワードを入力してください。"))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: IssuedTokens,
    pub user: User,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "リフレッシュトークンを入力してください。"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(email(message = "メールアドレスの形式が正しくありません。"))]
    pub email: String,
    #[validate(length(min = 1, message = "トークンを入力してください。"))]
    pub token: String,
    #[validate(length(min = 8, max = 128, message = "パスワードは8〜128文字で入力してください。"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "確認用パスワードが一致しません。"))]
    pub password_confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

async fn issue_tokens(
    db: &Pool<Sqlite>,
    config: &AppConfig,
    user: &User,
) -> Result<IssuedTokens, AppError> {
    let ttl = config.access_token_ttl();
    let access_token = encode_access_token(&config.jwt_secret, user.id, user.role, ttl)?;

    let refresh_token = generate_opaque_token();
    let expires_at = (Utc::now() + config.refresh_token_ttl()).naive_utc();
    create_refresh_token(db, user.id, &hash_token(&refresh_token), expires_at).await?;

    Ok(IssuedTokens {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: ttl.num_seconds(),
        refresh_token,
    })
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let login = login.validated()?;

    let Some(user) = authenticate_user(db, &login.email, &login.password).await? else {
        return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
    };

    let tokens = issue_tokens(db, config, &user).await?;
    info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::success(
        LoginResponse { tokens, user },
        "ログインしました。",
    ))
}

/// Exchanges a refresh token for a new token pair. The presented token is
/// consumed whether or not it was still valid.
#[post("/auth/refresh-token", data = "<input>")]
pub async fn api_refresh_token(
    input: Json<RefreshRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let input = input.validated()?;

    let user_id = consume_refresh_token(db, &hash_token(&input.refresh_token)).await?;
    let user = match get_user(db, user_id).await {
        Ok(user) if user.is_active => user,
        _ => {
            return Err(AppError::Authentication(
                "リフレッシュトークンが無効です。".to_string(),
            ));
        }
    };

    let tokens = issue_tokens(db, config, &user).await?;
    Ok(ApiResponse::success(
        LoginResponse { tokens, user },
        "トークンを更新しました。",
    ))
}

#[post("/auth/forgot-password", data = "<input>")]
pub async fn api_forgot_password(
    input: Json<ForgotPasswordRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
    mailer: &State<SharedMailer>,
) -> Result<ApiResponse<()>, AppError> {
    let input = input.validated()?;

    if find_user_id_by_email(db, &input.email).await?.is_some() {
        let token = generate_opaque_token();
        let expires_at = (Utc::now() + config.password_reset_ttl()).naive_utc();
        create_password_reset(db, &input.email, &hash_token(&token), expires_at).await?;

        if let Err(err) = mailer.send_reset_token(&input.email, &token) {
            err.log_and_record("Sending password reset token");
        }
    } else {
        warn!("Password reset requested for unknown email");
    }

    Ok(ApiResponse::message(
        "パスワード再設定の案内を送信しました。",
    ))
}

#[post("/auth/reset-password", data = "<input>")]
pub async fn api_reset_password(
    input: Json<ResetPasswordRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    let input = input.validated()?;

    reset_password(db, &input.email, &hash_token(&input.token), &input.password).await?;

    Ok(ApiResponse::message("パスワードを再設定しました。"))
}

#[get("/auth/me")]
pub async fn api_me(user: User) -> ApiResponse<User> {
    ApiResponse::success(user, "ユーザー情報を取得しました。")
}

#[post("/auth/logout", data = "<input>")]
pub async fn api_logout(
    input: Option<Json<LogoutRequest>>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    let refresh_token = input.and_then(|body| body.into_inner().refresh_token);

    match refresh_token {
        Some(token) => {
            revoke_refresh_token(db, user.id, &hash_token(&token)).await?;
        }
        None => {
            revoke_all_refresh_tokens(db, user.id).await?;
        }
    }

    info!(user_id = %user.id, "User logged out");
    Ok(ApiResponse::message("ログアウトしました。"))
}

pub fn routes() -> Vec<Route> {
    routes![
        api_login,
        api_refresh_token,
        api_forgot_password,
        api_reset_password,
        api_me,
        api_logout,
    ]
}
