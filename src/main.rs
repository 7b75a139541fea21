use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod config;
mod crypto;
mod db;
mod device;
mod error;
mod import;
mod model;
mod state;
#[cfg(test)]
mod testutil;
mod users;

use auth::jwt::TokenIssuer;
use config::AppConfig;
use crypto::PiiCipher;
use db::DBLayer;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing or malformed keys abort here, before anything listens.
    let cfg = AppConfig::from_env()?;

    let state = AppState {
        db: Arc::new(DBLayer::new(&cfg.db_path)?),
        cipher: Arc::new(PiiCipher::new(cfg.pii_key)),
        tokens: Arc::new(TokenIssuer::new(&cfg)),
    };

    // The import job writes under a synthetic identity; make sure it
    // exists before the first cycle and keep re-asserting it.
    import::ensure_import_identity(&state).await?;
    import::spawn_import_cycle(state.clone(), cfg.import_interval_secs);

    let cors = match cfg.allowed_origin.as_deref() {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_headers(Any)
            .allow_methods(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods(Any),
    };

    let app = Router::new()
        .merge(auth::router())
        .merge(device::router())
        .merge(users::router())
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    info!("listening on http://{addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
