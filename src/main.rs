#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod db;
mod env;
mod error;
mod models;
mod storage;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;
use std::sync::Arc;

use auth::{LogMailer, SharedMailer, unauthorized_api};
use config::AppConfig;
use db::users::clean_expired_tokens;
use env::load_environment;
use error::AppError;
use rocket::data::{Limits, ToByteUnit};
use rocket::figment::Figment;
use rocket::{Build, Rocket, tokio};
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use storage::{LocalStorage, SharedStorage};
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[rocket::main]
async fn main() -> Result<(), Error> {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let database_url = dotenvy::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let pool_clone = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_tokens(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired tokens", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired tokens: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS)).await;
        }
    });

    let mailer: SharedMailer = Arc::new(LogMailer);
    let rocket = init_rocket(pool, rocket::Config::figment(), mailer)?;

    let result = rocket.launch().await;
    shutdown_telemetry();
    result?;

    Ok(())
}

/// Builds the application around an existing pool. `figment` supplies both
/// Rocket's own settings and `AppConfig`.
pub fn init_rocket(
    pool: SqlitePool,
    figment: Figment,
    mailer: SharedMailer,
) -> Result<Rocket<Build>, Error> {
    info!("Starting welfare operations API");

    let config = AppConfig::from_figment(&figment)?;
    let storage: SharedStorage = Arc::new(LocalStorage::new(config.media_root.clone()));

    let limits = Limits::default()
        .limit("file", config.max_upload_bytes.bytes())
        .limit("data-form", (config.max_upload_bytes + 64 * 1024).bytes());
    let figment = figment.merge(("limits", limits));

    Ok(rocket::custom(figment)
        .manage(pool)
        .manage(config)
        .manage(mailer)
        .manage(storage)
        .mount("/api", api::routes())
        .register("/api", catchers![unauthorized_api, api::default_api])
        .attach(TelemetryFairing))
}
