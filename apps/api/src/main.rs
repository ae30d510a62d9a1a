use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tollgate_api::config::Config;
use tollgate_api::middleware::exposed_headers;
use tollgate_api::repositories::{
    CounterStore, FallbackCounterStore, PgSessionStore, RedisCounterStore,
};
use tollgate_api::routes::{app_router, AppState, RouteTable};
use tollgate_api::services::{AuthService, RateLimiter, RsaKeyPairProvider};

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ORIGINS` is set, only those origins are allowed
/// - If `CORS_ORIGINS` is not set, CORS requests are rejected
///
/// In development mode without `CORS_ORIGINS`, permissive CORS is used.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                return CorsLayer::new();
            }

            tracing::info!(
                "CORS configured with {} allowed origin(s): {:?}",
                allowed_origins.len(),
                origins
            );
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                ])
                .expose_headers(exposed_headers())
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(3600))
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!("Using permissive CORS in development mode");
            CorsLayer::permissive()
        }
    }
}

/// Redis-backed counters, optionally shielded by per-instance counters
fn build_counter_store(config: &Config) -> anyhow::Result<Arc<dyn CounterStore>> {
    let client = redis::Client::open(config.redis().connection_url())?;
    let redis_store: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::new(client));

    if config.rate_limit_fallback {
        tracing::warn!("Rate limit fallback enabled: Redis faults switch to per-instance counters");
        Ok(Arc::new(FallbackCounterStore::new(redis_store)))
    } else {
        Ok(redis_store)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tollgate_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing::info!("Starting Tollgate API server on port {}", config.port);

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database().acquire_timeout_secs,
        ))
        .connect(&config.database().url)
        .await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let auth_config = config.auth_config()?;
    tracing::info!(
        access_ttl_secs = auth_config.access_ttl.num_seconds(),
        refresh_ttl_secs = auth_config.refresh_ttl.num_seconds(),
        key_bits = config.token_key_bits,
        "Token lifetimes configured"
    );

    let auth_service = AuthService::new(
        Arc::new(PgSessionStore::new(pool)),
        Arc::new(RsaKeyPairProvider::new(config.token_key_bits)?),
        auth_config,
    )?;

    let policy = config.policy_table()?;
    tracing::info!(
        endpoints = ?policy.endpoints(),
        bucket = ?config.rate_limit_bucket,
        "Rate limit policy loaded"
    );
    let limiter = RateLimiter::new(policy, build_counter_store(&config)?, config.rate_limit_bucket);

    if !config.trusted_proxies.is_empty() {
        tracing::info!(proxies = ?config.trusted_proxies, "Honouring forwarding headers from trusted proxies");
    }
    let state = AppState::new(auth_service, limiter, RouteTable::default_auth())
        .with_trusted_proxies(config.trusted_proxies.clone());

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds the client address to the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
