mod jobs;
mod preferences;
mod problem;
mod recommendations;
mod router;
mod telemetry;

use std::net::SocketAddr;

use gojob_storage::Database;
use gojob_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let state = router::AppState::new(metrics, database, config.dashboard_limit);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        dashboard_limit = config.dashboard_limit,
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
