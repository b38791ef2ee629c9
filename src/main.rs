use std::{io, net::SocketAddr, time::Duration};

use access_logger::{config::AppConfig, create_app, AccessLogger};
use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let format = LogFormat::from_env_value(std::env::var("LOG_FORMAT").ok().as_deref());
    init_tracing(format)?;

    let config = AppConfig::load()?;
    info!("Configuration loaded successfully");

    let logger = AccessLogger::new(config.logging.debug);
    let app = create_app(logger, Duration::from_secs(config.server.timeout_seconds));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(debug = config.logging.debug, "Access logger demo listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Default directives when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "access_logger=info,tower_http=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// `LOG_FORMAT=json` or unset selects JSON; any other value selects plain text.
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(_) => LogFormat::Plain,
        }
    }
}

/// Diagnostics go to stderr; stdout carries the access log entries.
fn init_tracing(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json, plain) = match format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(io::stderr)), None),
        LogFormat::Plain => (None, Some(fmt::layer().with_writer(io::stderr))),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()?;

    Ok(())
}
