#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod env;
mod error;
mod models;
mod schools;
mod seed;
mod storage;
mod sync;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;
mod workflow;

use std::sync::{Arc, Mutex};

use api::{
    api_add_to_batch, api_admin_get_coaches, api_admin_get_schools, api_admin_replace_coaches,
    api_admin_replace_schools, api_admin_sync, api_admin_sync_status, api_clear_batch,
    api_delete_requests, api_edit_request, api_get_batch, api_get_categories, api_get_materials,
    api_get_requests, api_get_schools, api_login, api_logout, api_me, api_remove_from_batch,
    api_submit_batch, health,
};
use auth::{SessionStore, forbidden_api, unauthorized_api};
use config::PortalConfig;
use error::AppError;
use once_cell::sync::Lazy;
use rocket::{Build, Rocket};
use storage::JsonStore;
use sync::{RemoteMirror, RemoteTable, SupabaseTable};
use telemetry::{OtelGuard, TelemetryFairing, init_tracing, shutdown_telemetry};
use thiserror::Error;
use tracing::info;

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
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

#[rocket::main]
async fn main() -> Result<(), Error> {
    env::load_environment()?;
    init_tracing();

    let config = PortalConfig::from_figment(&PortalConfig::figment())?;
    let remote = SupabaseTable::from_config(&config)?
        .map(|table| Arc::new(table) as Arc<dyn RemoteTable>);

    if remote.is_none() {
        info!("Remote store not configured; sync is disabled");
    }

    let launched = init_rocket(config, remote).await?.launch().await;
    shutdown_telemetry();
    launched?;

    Ok(())
}

pub async fn init_rocket(
    config: PortalConfig,
    remote: Option<Arc<dyn RemoteTable>>,
) -> Result<Rocket<Build>, AppError> {
    info!(data_dir = %config.data_dir.display(), "Starting request portal");

    let store = JsonStore::new(&config.data_dir);
    seed::seed_defaults(&store).await?;

    {
        let _guard = store.write_lock().await;
        if let Err(err) = workflow::load_requests(&store).await {
            err.log_and_record("Startup backfill of requests");
        }
    }

    let sessions = SessionStore::new(chrono::Duration::minutes(config.session_ttl_minutes));

    Ok(rocket::custom(PortalConfig::figment())
        .manage(store)
        .manage(sessions)
        .manage(RemoteMirror(remote))
        .manage(config)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_get_schools,
                api_get_categories,
                api_get_materials,
                api_get_batch,
                api_add_to_batch,
                api_remove_from_batch,
                api_clear_batch,
                api_submit_batch,
                api_get_requests,
                api_edit_request,
                api_delete_requests,
                api_admin_get_schools,
                api_admin_replace_schools,
                api_admin_get_coaches,
                api_admin_replace_coaches,
                api_admin_sync,
                api_admin_sync_status,
                health,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .attach(TelemetryFairing))
}
