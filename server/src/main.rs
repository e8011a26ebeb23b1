use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bridge;
mod client;
mod config;
mod controller;
mod machine;

use client::HttpMachine;
use config::Config;
use controller::Controller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(
        root = %config.project_root.display(),
        files = config.controller.request.file_paths.len(),
        simulator = %config.simulator_url,
        "sicide server starting"
    );

    let machine = HttpMachine::new(config.simulator_url.clone());
    let controller = Arc::new(Controller::new(machine, config.controller.clone())?);
    let app = bridge::router(controller, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("listening on http://{}", config.bind);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
