use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::FacilityScope;
use crate::db::query::{ListQuery, ListRequest, Page};
use crate::error::AppError;
use crate::models::deposit::{Deposit, DepositDetail, DepositInput, DepositItem};

pub const SORTABLE: &[(&str, &str)] = &[
    ("created_at", "dp.created_at"),
    ("deposit_date", "dp.deposit_date"),
    ("total_amount", "dp.total_amount"),
];

#[derive(Debug, Default, Clone)]
pub struct DepositFilter {
    pub service_user_id: Option<i64>,
    pub facility_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[instrument(skip(pool))]
pub async fn list_deposits(
    pool: &Pool<Sqlite>,
    filter: &DepositFilter,
    request: &ListRequest,
    scope: &FacilityScope,
) -> Result<Page<Deposit>, AppError> {
    info!("Listing deposits");
    ListQuery::new("SELECT dp.*", "deposits dp", "dp.id")
        .eq_opt("dp.service_user_id", filter.service_user_id)
        .eq_opt("dp.facility_id", filter.facility_id)
        .gte_opt("dp.deposit_date", filter.from)
        .lte_opt("dp.deposit_date", filter.to)
        .scoped("dp.facility_id", scope)
        .search(&["dp.note"], request.search.as_deref())
        .fetch_page(pool, request)
        .await
}

#[instrument(skip(pool))]
pub async fn get_deposit(pool: &Pool<Sqlite>, id: i64) -> Result<Deposit, AppError> {
    info!("Fetching deposit");
    sqlx::query_as::<_, Deposit>("SELECT * FROM deposits WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("預り金", id))
}

pub async fn get_deposit_detail(pool: &Pool<Sqlite>, id: i64) -> Result<DepositDetail, AppError> {
    let deposit = get_deposit(pool, id).await?;
    let items = sqlx::query_as::<_, DepositItem>(
        "SELECT * FROM deposit_items WHERE deposit_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(DepositDetail { deposit, items })
}

async fn replace_items(
    conn: &mut SqliteConnection,
    deposit_id: i64,
    input: &DepositInput,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM deposit_items WHERE deposit_id = ?")
        .bind(deposit_id)
        .execute(&mut *conn)
        .await?;

    for item in &input.items {
        sqlx::query(
            "INSERT INTO deposit_items (deposit_id, item_name, amount, note) VALUES (?, ?, ?, ?)",
        )
        .bind(deposit_id)
        .bind(&item.item_name)
        .bind(item.amount)
        .bind(&item.note)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Creates the deposit with its items; the stored total is the item sum.
#[instrument(skip(pool, input))]
pub async fn create_deposit(
    pool: &Pool<Sqlite>,
    facility_id: i64,
    input: &DepositInput,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating deposit");
    let total_amount = input.total_amount()?;
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO deposits (service_user_id, facility_id, deposit_date, total_amount, note, created_by)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.deposit_date)
    .bind(total_amount)
    .bind(&input.note)
    .bind(created_by)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "預り金を登録できません。"))?;
    let id = res.last_insert_rowid();

    replace_items(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(id)
}

#[instrument(skip(pool, input))]
pub async fn update_deposit(
    pool: &Pool<Sqlite>,
    id: i64,
    facility_id: i64,
    input: &DepositInput,
) -> Result<(), AppError> {
    info!("Updating deposit");
    let total_amount = input.total_amount()?;
    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "UPDATE deposits
         SET service_user_id = ?, facility_id = ?, deposit_date = ?, total_amount = ?, note = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?",
    )
    .bind(input.service_user_id)
    .bind(facility_id)
    .bind(input.deposit_date)
    .bind(total_amount)
    .bind(&input.note)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::from_write(e, "預り金を更新できません。"))?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("預り金", id));
    }

    replace_items(&mut tx, id, input).await?;

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_deposit(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting deposit");
    let res = sqlx::query("DELETE FROM deposits WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("預り金", id));
    }
    Ok(())
}
