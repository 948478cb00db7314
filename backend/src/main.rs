mod config;
mod db;
mod domain;
mod error;
mod rest;
mod store;

use anyhow::Result;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::db::DbConnection;
use crate::domain::auth::CredentialPolicy;
use crate::domain::drive_service::DriveService;
use crate::domain::import_service::ImportService;
use crate::domain::report_service::ReportService;
use crate::domain::student_service::StudentService;
use crate::domain::vaccination_service::VaccinationService;
use crate::rest::AppState;
use crate::store::drives::DriveStore;
use crate::store::students::StudentStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    info!("Connecting to database: {}", config.database_url);
    let db = DbConnection::new(&config.database_url).await?;

    let students = StudentStore::new(db.clone());
    let drives = DriveStore::new(db.clone());

    let state = AppState {
        students: StudentService::new(students.clone()),
        drives: DriveService::new(drives.clone(), students.clone(), config.eligibility_policy),
        vaccination: VaccinationService::new(db, students.clone(), drives.clone()),
        import: ImportService::new(students.clone()),
        reports: ReportService::new(students, drives),
        auth: CredentialPolicy::new(&config.admin_username, &config.admin_password),
    };

    let cors = CorsLayer::new()
        .allow_origin(config.cors_origin.parse::<HeaderValue>()?)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = axum::Router::new()
        .nest("/api", rest::api_router(state))
        .layer(cors);

    let addr = format!("127.0.0.1:{}", config.port);
    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
