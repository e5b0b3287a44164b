use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::Serialize;
use sqlx::{Pool, Sqlite};

use crate::api::ApiResponse;
use crate::auth::User;
use crate::db::profile::{get_profile, save_user_profile};
use crate::db::users::{change_password, verify_password};
use crate::error::AppError;
use crate::models::profile::{PasswordChangeInput, Profile, ProfileInput, UserType};
use crate::validation::{JsonValidateExt, field_error};

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub profile: Option<Profile>,
}

#[get("/profile")]
pub async fn api_get_profile(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ProfileResponse>, AppError> {
    let profile = get_profile(db, user.id, UserType::User).await?;

    Ok(ApiResponse::success(
        ProfileResponse { user, profile },
        "プロフィールを取得しました。",
    ))
}

#[put("/profile", data = "<input>")]
pub async fn api_update_profile(
    input: Json<ProfileInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<ProfileResponse>, AppError> {
    let input = input.validated()?;
    let profile = save_user_profile(db, user.id, &input).await?;

    Ok(ApiResponse::success(
        ProfileResponse {
            user,
            profile: Some(profile),
        },
        "プロフィールを更新しました。",
    ))
}

/// Changing the password signs the user out of every other session.
#[put("/profile/password", data = "<input>")]
pub async fn api_change_password(
    input: Json<PasswordChangeInput>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<ApiResponse<()>, AppError> {
    let input = input.validated()?;

    if !verify_password(db, user.id, &input.current_password).await? {
        return Err(field_error(
            "current_password",
            "現在のパスワードが正しくありません。",
        ));
    }

    change_password(db, user.id, &input.password).await?;

    Ok(ApiResponse::message("パスワードを変更しました。"))
}

pub fn routes() -> Vec<Route> {
    routes![api_get_profile, api_update_profile, api_change_password]
}
