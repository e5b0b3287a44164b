use chrono::{NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{DbUser, FacilityScope, Role, User};
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::profile::UserType;

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "u.created_at"),
    ("name", "u.name"),
    ("email", "u.email"),
    ("role", "u.role"),
];

const EMAIL_TAKEN: &str = "このメールアドレスは既に使用されています。";

#[derive(Debug, Default, Clone)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub facility_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub async fn facility_ids_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT facility_id FROM facility_users WHERE user_id = ? ORDER BY facility_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, role, is_active, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => {
            let facility_ids = facility_ids_for_user(pool, id).await?;
            user.into_user(facility_ids)
        }
        _ => Err(AppError::not_found("ユーザー", id)),
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    password: String,
    is_active: bool,
}

/// Returns the user when the email and password match an active account.
#[instrument(skip_all, fields(email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, password, is_active FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) if row.is_active => match bcrypt::verify(password, &row.password) {
            Ok(true) => Ok(Some(get_user(pool, row.id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument(skip_all, fields(user_id))]
pub async fn verify_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    password: &str,
) -> Result<bool, AppError> {
    let hash = sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    Ok(hash
        .map(|hash| bcrypt::verify(password, &hash).unwrap_or(false))
        .unwrap_or(false))
}

#[instrument(skip(pool))]
pub async fn find_user_id_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<i64>, AppError> {
    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

#[instrument(skip(pool))]
pub async fn list_users(
    pool: &Pool<Sqlite>,
    filter: &UserFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<User>, AppError> {
    info!("Listing users");
    const BY_FACILITY: &str = "SELECT user_id FROM facility_users WHERE facility_id";

    let mut query = ListQuery::new(
        "SELECT u.id, u.name, u.email, u.role, u.is_active, u.created_at, u.updated_at",
        "users u",
        "u.id",
    )
    .eq_opt("u.role", filter.role.map(|r| r.as_str()))
    .eq_opt("u.is_active", filter.is_active)
    .scoped_subquery("u.id", BY_FACILITY, scope)
    .search(&["u.name", "u.email"], request.search.as_deref());

    if let Some(facility_id) = filter.facility_id {
        query = query.in_subquery("u.id", BY_FACILITY, vec![facility_id]);
    }

    let page: Page<DbUser> = query.fetch_page(pool, request).await?;

    let mut users = Vec::with_capacity(page.data.len());
    for row in &page.data {
        let facility_ids = facility_ids_for_user(pool, row.id).await?;
        users.push(row.clone().into_user(facility_ids)?);
    }

    Ok(page.with_data(users))
}

#[instrument(skip_all, fields(email = %user.email, role = %user.role))]
pub async fn create_user(conn: &mut SqliteConnection, user: &NewUser) -> Result<i64, AppError> {
    info!("Creating new user");

    let hashed_password = bcrypt::hash(&user.password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query("INSERT INTO users (name, email, password, role) VALUES (?, ?, ?, ?)")
        .bind(&user.name)
        .bind(&user.email)
        .bind(hashed_password)
        .bind(user.role.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, EMAIL_TAKEN))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    changes: &UserChanges,
) -> Result<(), AppError> {
    info!("Updating user");

    let hashed_password = match &changes.password {
        Some(password) => Some(bcrypt::hash(password, bcrypt::DEFAULT_COST)?),
        None => None,
    };

    let res = sqlx::query(
        "UPDATE users SET
            name = COALESCE(?, name),
            email = COALESCE(?, email),
            password = COALESCE(?, password),
            role = COALESCE(?, role),
            is_active = COALESCE(?, is_active),
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&changes.name)
    .bind(&changes.email)
    .bind(hashed_password)
    .bind(changes.role.map(|r| r.as_str()))
    .bind(changes.is_active)
    .bind(user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, EMAIL_TAKEN))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("ユーザー", user_id));
    }

    Ok(())
}

#[instrument(skip_all, fields(user_id))]
pub async fn change_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Changing user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query("UPDATE users SET password = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("ユーザー", user_id));
    }

    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Replaces the user's facility assignments with `facility_ids`.
pub async fn replace_facility_assignments(
    conn: &mut SqliteConnection,
    user_id: i64,
    facility_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM facility_users WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for facility_id in facility_ids {
        sqlx::query(
            "INSERT INTO facility_users (facility_id, user_id, role) VALUES (?, ?, 'staff')
             ON CONFLICT (facility_id, user_id) DO NOTHING",
        )
        .bind(facility_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, "施設の割り当てに失敗しました。"))?;
    }

    Ok(())
}

/// Creates a staff account and its facility assignments in one transaction.
#[instrument(skip_all, fields(email = %user.email))]
pub async fn create_staff(
    pool: &Pool<Sqlite>,
    user: &NewUser,
    facility_ids: &[i64],
) -> Result<i64, AppError> {
    info!("Creating staff account");
    let mut tx = pool.begin().await?;

    let id = create_user(&mut tx, user).await?;
    replace_facility_assignments(&mut tx, id, facility_ids).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_staff(
    pool: &Pool<Sqlite>,
    user_id: i64,
    changes: &UserChanges,
    facility_ids: Option<&[i64]>,
) -> Result<(), AppError> {
    info!("Updating staff account");
    let mut tx = pool.begin().await?;

    update_user(&mut tx, user_id, changes).await?;
    if let Some(ids) = facility_ids {
        replace_facility_assignments(&mut tx, user_id, ids).await?;
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<(), AppError> {
    info!("Deleting user");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM profiles WHERE user_id = ? AND user_type = ?")
        .bind(user_id)
        .bind(UserType::User)
        .execute(&mut *tx)
        .await?;

    let res = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_write(e, EMAIL_TAKEN))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("ユーザー", user_id));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool, token_hash))]
pub async fn create_refresh_token(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token_hash: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Storing refresh token");

    let res =
        sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(pool)
            .await?;

    Ok(res.last_insert_rowid())
}

#[derive(sqlx::FromRow)]
struct ConsumedToken {
    user_id: i64,
    expires_at: NaiveDateTime,
}

/// Deletes the refresh token and returns its owner if it had not expired.
/// The delete makes each token single use.
#[instrument(skip_all)]
pub async fn consume_refresh_token(
    pool: &Pool<Sqlite>,
    token_hash: &str,
) -> Result<i64, AppError> {
    info!("Consuming refresh token");

    let row = sqlx::query_as::<_, ConsumedToken>(
        "DELETE FROM refresh_tokens WHERE token_hash = ? RETURNING user_id, expires_at",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(token) if token.expires_at > Utc::now().naive_utc() => Ok(token.user_id),
        Some(_) => Err(AppError::Authentication(
            "リフレッシュトークンの有効期限が切れています。".to_string(),
        )),
        None => Err(AppError::Authentication(
            "リフレッシュトークンが無効です。".to_string(),
        )),
    }
}

#[instrument(skip_all, fields(user_id))]
pub async fn revoke_refresh_token(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token_hash: &str,
) -> Result<u64, AppError> {
    let res = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ? AND token_hash = ?")
        .bind(user_id)
        .bind(token_hash)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool))]
pub async fn revoke_all_refresh_tokens(pool: &Pool<Sqlite>, user_id: i64) -> Result<u64, AppError> {
    info!("Revoking all refresh tokens for user");
    let res = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

#[instrument(skip(pool, token_hash))]
pub async fn create_password_reset(
    pool: &Pool<Sqlite>,
    email: &str,
    token_hash: &str,
    expires_at: NaiveDateTime,
) -> Result<(), AppError> {
    info!("Creating password reset token");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM password_resets WHERE email = ?")
        .bind(email)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO password_resets (email, token_hash, expires_at) VALUES (?, ?, ?)")
        .bind(email)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Applies a password reset: the token must match the email and be unexpired.
/// Reset tokens and refresh tokens of the user are removed in the same
/// transaction.
#[instrument(skip_all, fields(email))]
pub async fn reset_password(
    pool: &Pool<Sqlite>,
    email: &str,
    token_hash: &str,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Resetting password");
    let invalid = || AppError::Validation("パスワード再設定トークンが無効です。".to_string());

    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;
    let now = Utc::now().naive_utc();

    let mut tx = pool.begin().await?;

    let expires_at = sqlx::query_scalar::<_, NaiveDateTime>(
        "SELECT expires_at FROM password_resets WHERE email = ? AND token_hash = ?",
    )
    .bind(email)
    .bind(token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(invalid)?;

    if expires_at <= now {
        return Err(invalid());
    }

    let user_id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(invalid)?;

    sqlx::query("UPDATE users SET password = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM password_resets WHERE email = ?")
        .bind(email)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_tokens(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired tokens");

    let now = Utc::now().naive_utc();

    let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    let resets = sqlx::query("DELETE FROM password_resets WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(refresh.rows_affected() + resets.rows_affected())
}
