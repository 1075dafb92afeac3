use std::sync::Arc;

use tracing::{info, warn};

use epicache::api::{self, AppState};
use epicache::backend::{BigQueryBackend, QueryBackend};
use epicache::cache::ContentCache;
use epicache::config::AppConfig;
use epicache::content::ContentCatalog;
use epicache::server::Server;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epicache=info,info".into()),
        )
        .with_target(true)
        .init();

    let config = AppConfig::from_env()?;
    info!(
        name = %config.api_name,
        version = %config.api_version,
        endpoint = %config.bigquery.endpoint,
        credentials = ?config.bigquery.credentials,
        "starting"
    );

    let backend = Arc::new(BigQueryBackend::new(&config.bigquery)?);
    if !backend.available() {
        warn!("no BigQuery project or credentials configured; every content request will return empty rows");
    }

    let catalog = Arc::new(ContentCatalog::builtin());
    info!(keys = catalog.len(), "content catalog loaded");

    let state = Arc::new(AppState {
        cache: Arc::new(ContentCache::new(catalog, backend)),
        api_name: config.api_name.clone(),
        api_version: config.api_version.clone(),
    });
    let router = Arc::new(api::router(state));

    let server = Server::bind(config.bind_addr()).await?;
    server
        .run_until(
            move |req| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
