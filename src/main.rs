//! Praxia server binary.
//!
//! Loads configuration, wires the adapters to the handlers, spawns the sweep
//! scheduler, and serves the API.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use praxia::adapters::http::{build_router, AppState, TokenVerifier};
use praxia::adapters::notify::LoggingNotifier;
use praxia::adapters::postgres::PgSubscriptionStore;
use praxia::adapters::stripe::StripeBillingClient;
use praxia::application::handlers::subscription::{
    CancelSubscriptionHandler, CheckAccessHandler, CreatePortalSessionHandler,
    HandleBillingWebhookHandler, InitializeTrialHandler, StartCheckoutHandler,
};
use praxia::application::{SubscriptionGuard, SweepScheduler};
use praxia::config::AppConfig;
use praxia::domain::subscription::{ReconciliationEngine, WebhookVerifier};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations applied");
    }

    let store = Arc::new(PgSubscriptionStore::new(pool));
    let notifier = Arc::new(LoggingNotifier::new());
    let provider = Arc::new(StripeBillingClient::new(config.billing.clone())?);

    let engine = Arc::new(ReconciliationEngine::new(store.clone(), notifier.clone()));
    let verifier = WebhookVerifier::new(config.billing.webhook_secret.clone());

    let state = AppState {
        initialize_trial: Arc::new(InitializeTrialHandler::new(
            store.clone(),
            config.subscription.trial_days,
        )),
        start_checkout: Arc::new(StartCheckoutHandler::new(
            store.clone(),
            provider.clone(),
            config.billing.publishable_key.clone(),
        )),
        create_portal: Arc::new(CreatePortalSessionHandler::new(
            store.clone(),
            provider.clone(),
        )),
        cancel: Arc::new(CancelSubscriptionHandler::new(store.clone(), provider)),
        check_access: Arc::new(CheckAccessHandler::new(store.clone())),
        webhook: Arc::new(HandleBillingWebhookHandler::new(verifier, engine)),
        guard: Arc::new(SubscriptionGuard::new(store.clone())),
        auth: Arc::new(TokenVerifier::new(&config.auth)),
    };

    SweepScheduler::new(
        store,
        notifier,
        config.subscription.reminder_days.clone(),
        Duration::from_secs(config.subscription.sweep_interval_secs),
    )
    .spawn();

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "Praxia listening");
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
