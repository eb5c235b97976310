//! OptBozor Marketplace - wholesale order, payment and seller-ledger service

use anyhow::{Context, Result};
use optbozor_market::auth::TokenVerifier;
use optbozor_market::config::Config;
use optbozor_market::http::{router, AppState};
use optbozor_market::notify::{LogNotifier, NatsNotifier, Notifier};
use optbozor_market::services::Services;
use optbozor_market::store::{MemoryStore, PgStore, Store};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;
    if config.payments.callback_secret.is_none() {
        tracing::warn!("PAYMENT_CALLBACK_SECRET not set, payment callbacks will be refused");
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await.context("connecting to postgres")?;
            sqlx::migrate!("./migrations").run(&db).await.context("running migrations")?;
            Arc::new(PgStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => async_nats::connect(url.as_str()).await.map_err(|e| tracing::warn!(error = %e, "NATS unavailable, logging events instead")).ok(),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = match nats {
        Some(client) => Arc::new(NatsNotifier::new(client, "marketplace.events")),
        None => Arc::new(LogNotifier),
    };

    let state = AppState { services: Services::new(store, notifier, &config), verifier: TokenVerifier::new(&config.jwt_secret) };
    let app = router(state);

    tracing::info!("OptBozor marketplace listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
