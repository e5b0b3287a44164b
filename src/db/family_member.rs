use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::family_member::{FamilyMember, FamilyMemberInput};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "fm.created_at"),
    ("name", "fm.name"),
    ("relationship", "fm.relationship"),
];

const BY_CONSULTATION: &str =
    "SELECT family_member_id FROM service_user_family_member WHERE consultation_id";
const BY_SERVICE_USER: &str =
    "SELECT family_member_id FROM service_user_family_member WHERE service_user_id";
const BY_FACILITY: &str = "SELECT p.family_member_id FROM service_user_family_member p
     JOIN consultations c ON c.id = p.consultation_id
     WHERE c.facility_id";

#[derive(Debug, Default, Clone)]
pub struct FamilyMemberFilter {
    pub consultation_id: Option<i64>,
    pub service_user_id: Option<i64>,
}

#[instrument(skip(pool))]
pub async fn list_family_members(
    pool: &Pool<Sqlite>,
    filter: &FamilyMemberFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<FamilyMember>, AppError> {
    info!("Listing family members");
    let mut query = ListQuery::new("SELECT fm.*", "family_members fm", "fm.id")
        .scoped_subquery("fm.id", BY_FACILITY, scope)
        .search(
            &["fm.name", "fm.furigana", "fm.phone"],
            request.search.as_deref(),
        );

    if let Some(id) = filter.consultation_id {
        query = query.in_subquery("fm.id", BY_CONSULTATION, vec![id]);
    }
    if let Some(id) = filter.service_user_id {
        query = query.in_subquery("fm.id", BY_SERVICE_USER, vec![id]);
    }

    query.fetch_page(pool, request).await
}

#[instrument(skip(pool))]
pub async fn get_family_member(pool: &Pool<Sqlite>, id: i64) -> Result<FamilyMember, AppError> {
    info!("Fetching family member");
    sqlx::query_as::<_, FamilyMember>("SELECT * FROM family_members WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("家族", id))
}

/// Facilities of every consultation the member is linked to.
pub async fn member_facilities(pool: &Pool<Sqlite>, id: i64) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT c.facility_id FROM service_user_family_member p
         JOIN consultations c ON c.id = p.consultation_id
         WHERE p.family_member_id = ?",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

pub async fn members_for_consultation(
    pool: &Pool<Sqlite>,
    consultation_id: i64,
) -> Result<Vec<FamilyMember>, AppError> {
    let rows = sqlx::query_as::<_, FamilyMember>(
        "SELECT fm.* FROM family_members fm
         JOIN service_user_family_member p ON p.family_member_id = fm.id
         WHERE p.consultation_id = ?
         ORDER BY fm.id",
    )
    .bind(consultation_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn members_for_service_user(
    pool: &Pool<Sqlite>,
    service_user_id: i64,
) -> Result<Vec<FamilyMember>, AppError> {
    let rows = sqlx::query_as::<_, FamilyMember>(
        "SELECT fm.* FROM family_members fm
         JOIN service_user_family_member p ON p.family_member_id = fm.id
         WHERE p.service_user_id = ?
         ORDER BY fm.id",
    )
    .bind(service_user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Inserts a member and links it to the consultation (and its service user,
/// when one exists) on the caller's connection.
pub async fn insert_linked_member(
    conn: &mut SqliteConnection,
    input: &FamilyMemberInput,
    consultation_id: i64,
    service_user_id: Option<i64>,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO family_members
            (name, furigana, relationship, phone, email, address, is_emergency_contact, note)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.name)
    .bind(&input.furigana)
    .bind(&input.relationship)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(input.is_emergency_contact)
    .bind(&input.note)
    .execute(&mut *conn)
    .await?;
    let member_id = res.last_insert_rowid();

    sqlx::query(
        "INSERT INTO service_user_family_member (family_member_id, consultation_id, service_user_id)
         VALUES (?, ?, ?)",
    )
    .bind(member_id)
    .bind(consultation_id)
    .bind(service_user_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_write(e, "この家族は既に相談に登録されています。"))?;

    Ok(member_id)
}

#[instrument(skip(pool, members), fields(count = members.len()))]
pub async fn create_family_members(
    pool: &Pool<Sqlite>,
    consultation_id: i64,
    members: &[FamilyMemberInput],
) -> Result<Vec<i64>, AppError> {
    info!("Creating family members for consultation");
    let mut tx = pool.begin().await?;

    let service_user_id =
        sqlx::query_scalar::<_, i64>("SELECT id FROM service_users WHERE consultation_id = ?")
            .bind(consultation_id)
            .fetch_optional(&mut *tx)
            .await?;

    let mut ids = Vec::with_capacity(members.len());
    for member in members {
        ids.push(insert_linked_member(&mut tx, member, consultation_id, service_user_id).await?);
    }

    tx.commit().await?;
    Ok(ids)
}

#[instrument(skip(pool, input))]
pub async fn update_family_member(
    pool: &Pool<Sqlite>,
    id: i64,
    input: &FamilyMemberInput,
) -> Result<(), AppError> {
    info!("Updating family member");
    let res = sqlx::query(
        "UPDATE family_members
         SET name = ?, furigana = ?, relationship = ?, phone = ?, email = ?, address = ?,
             is_emergency_contact = ?, note = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(&input.name)
    .bind(&input.furigana)
    .bind(&input.relationship)
    .bind(&input.phone)
    .bind(&input.email)
    .bind(&input.address)
    .bind(input.is_emergency_contact)
    .bind(&input.note)
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("家族", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_family_member(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting family member");
    let res = sqlx::query("DELETE FROM family_members WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("家族", id));
    }
    Ok(())
}
