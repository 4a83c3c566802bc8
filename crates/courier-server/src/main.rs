mod config;

use std::sync::Arc;

use tracing::info;

use courier_api::AppStateInner;
use courier_gateway::TokenVerifier;
use courier_gateway::connection::ConnectionSettings;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier=debug,courier_gateway=debug,courier_api=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(courier_db::Database::open(&config.db_path)?);

    let state = AppStateInner::new(
        db,
        TokenVerifier::new(&config.jwt_secret),
        ConnectionSettings {
            auth_timeout: config.auth_timeout,
            ..ConnectionSettings::default()
        },
    );

    let app = courier_api::router(state, config.cors_layer());

    let addr = config.listen_addr()?;
    info!("Courier relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
