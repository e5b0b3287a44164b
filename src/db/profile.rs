use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::profile::{Profile, ProfileInput, UserType};

#[instrument(skip(pool))]
pub async fn get_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    user_type: UserType,
) -> Result<Option<Profile>, AppError> {
    info!("Fetching profile");
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT * FROM profiles WHERE user_id = ? AND user_type = ?",
    )
    .bind(user_id)
    .bind(user_type)
    .fetch_optional(pool)
    .await?;

    Ok(profile)
}

/// Inserts the profile or merges the supplied fields into the existing one.
#[instrument(skip(conn, input))]
pub async fn upsert_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    user_type: UserType,
    input: &ProfileInput,
) -> Result<(), AppError> {
    info!("Upserting profile");
    sqlx::query(
        "INSERT INTO profiles
            (user_id, user_type, full_name, furigana, gender, birthday, phone, postal_code,
             address, emergency_contact, note)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (user_id, user_type) DO UPDATE SET
            full_name = COALESCE(excluded.full_name, full_name),
            furigana = COALESCE(excluded.furigana, furigana),
            gender = COALESCE(excluded.gender, gender),
            birthday = COALESCE(excluded.birthday, birthday),
            phone = COALESCE(excluded.phone, phone),
            postal_code = COALESCE(excluded.postal_code, postal_code),
            address = COALESCE(excluded.address, address),
            emergency_contact = COALESCE(excluded.emergency_contact, emergency_contact),
            note = COALESCE(excluded.note, note),
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(user_type)
    .bind(&input.full_name)
    .bind(&input.furigana)
    .bind(&input.gender)
    .bind(input.birthday)
    .bind(&input.phone)
    .bind(&input.postal_code)
    .bind(&input.address)
    .bind(&input.emergency_contact)
    .bind(&input.note)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn save_user_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    input: &ProfileInput,
) -> Result<Profile, AppError> {
    let mut conn = pool.acquire().await?;
    upsert_profile(&mut conn, user_id, UserType::User, input).await?;
    drop(conn);

    get_profile(pool, user_id, UserType::User)
        .await?
        .ok_or_else(|| AppError::Internal("Profile missing after upsert".to_string()))
}
