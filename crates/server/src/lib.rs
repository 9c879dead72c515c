//! Record lookup service for the print shop.
//!
//! The service loads the shop's published spreadsheet, keeps it refreshed in
//! the background, and answers name/date searches over HTTP. Records marked
//! cancelled are kept in a local SQLite overlay and hidden from every search.
//!
//! # Routes
//! - `GET /api/health`
//! - `GET /api/google-sheets` returns the spreadsheet's unwrapped JSON
//! - `GET /api/records/search?name=&day=&month=&year=`
//! - `GET /api/records/status`
//! - `POST /api/records/refresh`
//! - `POST /api/records/cancellations` with `{name, date}`
//!
//! # Configuration
//! Read from `phonix.toml` (or the file named by `PHONIX_CONFIG`), then
//! `PORT`, `PHONIX_SHEET_ID` and `PHONIX_DATABASE`. Log verbosity follows
//! `RUST_LOG`.

use tokio::signal::ctrl_c;
use tracing::info;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config;
pub mod error;
pub mod gviz;
pub mod routes;
pub mod session;
pub mod source;
pub mod state;

pub use config::{Config, ConfigError, LogFormat, SourceKind};
pub use error::ApiError;
pub use routes::router;
pub use session::{LoadError, LoadMode, LookupSession, RefreshStatus, SessionOptions};
pub use source::{FetchError, HttpTableSource, ProxySource, TableSource, UpstreamSource};
pub use state::AppState;

/// Installs the global subscriber. `RUST_LOG` wins over the `info` default.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            let formatting =
                BunyanFormattingLayer::new(env!("CARGO_PKG_NAME").into(), std::io::stdout);
            tracing_subscriber::registry()
                .with(filter)
                .with(JsonStorageLayer)
                .with(formatting)
                .init();
        }
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
