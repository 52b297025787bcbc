mod config;
mod db;
mod fast_gate;
mod identity;
mod rate_limit;
mod routes;
mod services;
mod state;

use std::net::SocketAddr;
use std::process;

use config::AppConfig;
use fast_gate::FastGate;
use identity::IdentityResolver;
use rate_limit::RateLimiter;
use services::counter::AccurateCounter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Configuration is validated before anything connects or binds.
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };
    let resolver = match IdentityResolver::new(&config.guest_session_secret) {
        Ok(resolver) => resolver,
        Err(e) => {
            tracing::error!(error = %e, "invalid guest session secret");
            process::exit(1);
        }
    };
    let store = match fast_gate::open_store(&config.fast_gate_url) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "fast gate store init failed");
            process::exit(1);
        }
    };

    let pool = match db::init_pool(&config.database_url, config.db_max_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "database init failed");
            process::exit(1);
        }
    };

    let rate_limiter = RateLimiter::new(
        FastGate::new(store, config.fast_gate),
        AccurateCounter::new(pool.clone(), config.counter_timeout),
        config.quotas,
    );
    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set; reaper endpoint disabled");
    }

    let state = state::AppState {
        pool,
        resolver,
        rate_limiter,
        cookie_secure: config.cookie_secure,
        guest_retention_days: config.guest_retention_days,
        cron_secret: config.cron_secret,
    };

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, "quota-gate listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
