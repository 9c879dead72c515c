use std::sync::Arc;

use anyhow::Context;
use phonix_server::{
    init_tracing, router, shutdown_signal, AppState, Config, HttpTableSource, LoadMode,
    LookupSession, SessionOptions, UpstreamSource,
};
use phonix_storage::{create_db, SqliteOverlayStore};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    let pool = create_db(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    let source = HttpTableSource::from_config(&config).context("Failed to build sheet client")?;
    let upstream = UpstreamSource::new(
        &config.sheet_id,
        config.sheet_name.as_deref(),
        config.fetch_timeout(),
    )?;

    let options = SessionOptions {
        fetch_timeout: config.fetch_timeout(),
        refresh_interval: config.refresh_interval(),
        numerals: config.numerals,
    };
    let session = Arc::new(
        LookupSession::open(source, SqliteOverlayStore::new(pool), options)
            .await
            .context("Failed to load cancellation overlay")?,
    );

    let app = router(AppState::new(Arc::clone(&session), upstream));

    let address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(source = ?config.source, "Server running on {address}");

    // The first load runs once the listener is up so a proxy source can
    // point back at this server.
    tokio::spawn({
        let session = Arc::clone(&session);
        async move {
            let _ = session.load(LoadMode::Initial).await;
        }
    });
    let refresh = session.spawn_refresh_loop();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session.shutdown();
    refresh.await?;
    info!("Server stopped");
    Ok(())
}
