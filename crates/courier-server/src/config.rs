use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    /// `None` means any origin.
    pub cors_origins: Option<Vec<HeaderValue>>,
    pub auth_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = get("COURIER_JWT_SECRET").unwrap_or_else(|| {
            warn!("COURIER_JWT_SECRET not set, using the development secret");
            DEFAULT_JWT_SECRET.into()
        });

        let port = get("COURIER_PORT")
            .unwrap_or_else(|| "5001".into())
            .parse()
            .context("COURIER_PORT must be a port number")?;

        let auth_timeout_secs: u64 = get("COURIER_AUTH_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("COURIER_AUTH_TIMEOUT_SECS must be a number of seconds")?;

        let cors_origins = match get("COURIER_CORS_ORIGINS") {
            None => None,
            Some(raw) if raw.trim() == "*" => None,
            Some(raw) => Some(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|origin| {
                        HeaderValue::from_str(origin)
                            .with_context(|| format!("invalid CORS origin '{}'", origin))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        Ok(Self {
            db_path: PathBuf::from(get("COURIER_DB_PATH").unwrap_or_else(|| "courier.db".into())),
            jwt_secret,
            host: get("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origins,
            auth_timeout: Duration::from_secs(auth_timeout_secs),
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn cors_layer(&self) -> CorsLayer {
        match &self.cors_origins {
            None => CorsLayer::permissive(),
            Some(origins) => CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins.clone()))
                .allow_methods(Any)
                .allow_headers(Any),
        }
    }
}
