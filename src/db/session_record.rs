use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::session_record::{
    Participant, RecordType, SessionRecord, SessionRecordDetail, SessionRecordInput,
};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "sr.created_at"),
    ("held_on", "sr.held_on"),
    ("title", "sr.title"),
];

#[derive(Debug, Default, Clone)]
pub struct SessionRecordFilter {
    pub record_type: Option<RecordType>,
    pub facility_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_session_records(
    pool: &Pool<Sqlite>,
    filter: &SessionRecordFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<SessionRecord>, AppError> {
    info!("Listing session records");
    ListQuery::new("SELECT sr.*", "session_records sr", "sr.id")
        .eq_opt("sr.record_type", filter.record_type.map(|t| t.as_str()))
        .eq_opt("sr.facility_id", filter.facility_id)
        .gte_opt("sr.held_on", filter.from)
        .lte_opt("sr.held_on", filter.to)
        .scoped("sr.facility_id", scope)
        .search(
            &["sr.title", "sr.location", "sr.content"],
            request.search.as_deref(),
        )
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_session_record(pool: &Pool<Sqlite>, id: i64) -> Result<SessionRecord, AppError> {
    info!("Fetching session record");
    sqlx::query_as::<_, SessionRecord>("SELECT * FROM session_records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("研修・会議記録", id))
}

pub async fn get_session_record_detail(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<SessionRecordDetail, AppError> {
    let record = get_session_record(pool, id).await?;
    let participants = sqlx::query_as::<_, Participant>(
        "SELECT u.id AS user_id, u.name
         FROM session_record_participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.session_record_id = ?
         ORDER BY u.name",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(SessionRecordDetail {
        record,
        participants,
    })
}

/// Duplicate ids in `participant_ids` collapse into one row.
async fn replace_participants(
    conn: &mut SqliteConnection,
    record_id: i64,
    participant_ids: &[i64],
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM session_record_participants WHERE session_record_id = ?")
        .bind(record_id)
        .execute(&mut *conn)
        .await?;

    for user_id in participant_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO session_record_participants (session_record_id, user_id)
             VALUES (?, ?)",
        )
        .bind(record_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::from_write(e, "参加者を登録できません。"))?;
    }

    Ok(())
}

#[instrument(skip(pool, input), fields(facility_id = input.facility_id))]
pub async fn create_session_record(
    pool: &Pool<Sqlite>,
    input: &SessionRecordInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating session record");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO session_records
            (record_type, facility_id, title, held_on, location, content, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.record_type)
    .bind(input.facility_id)
    .bind(&input.title)
    .bind(input.held_on)
    .bind(&input.location)
    .bind(&input.content)
    .bind(created_by)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "研修・会議記録を登録できません。"))?;
    let id = res.last_insert_rowid();

    replace_participants(&mut tx, id, &input.participant_ids).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_session_record(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &SessionRecordInput,
) -> Result<(), AppError> {
    info!("Updating session record");
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE session_records
         SET record_type = ?, facility_id = ?, title = ?, held_on = ?, location = ?,
             content = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.record_type)
    .bind(input.facility_id)
    .bind(&input.title)
    .bind(input.held_on)
    .bind(&input.location)
    .bind(&input.content)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "研修・会議記録を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("研修・会議記録", id));
    }

    replace_participants(&mut tx, id, &input.participant_ids).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_session_record(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting session record");
    let res = sqlx::query("DELETE FROM session_records WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("研修・会議記録", id));
    }
    Ok(())
}
