use std::sync::Arc;

use anyhow::Context;

use khata_core::SystemClock;
use khata_infra::store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, RetryingStore};
use khata_infra::{AppConfig, LedgerServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    khata_observability::init(config.log_format);
    tracing::info!(?config, "starting khata-api");

    if config.uses_dev_secret() {
        tracing::warn!("KHATA_JWT_SECRET not set; using insecure dev default");
    }

    let store: Arc<dyn LedgerStore> = match &config.database_url {
        Some(url) => {
            let pg = PostgresLedgerStore::connect(url, config.db_max_connections)
                .await
                .context("failed to connect to postgres")?;
            pg.migrate().await.context("failed to apply schema")?;
            Arc::new(RetryingStore::new(pg, config.store_retry))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let services = LedgerServices::new(store, Arc::new(SystemClock), config.business_zone);
    let app = khata_api::app::build_app_with(services, config.jwt_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
