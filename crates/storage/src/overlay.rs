use std::future::Future;
use std::sync::Mutex;

use phonix_core::CancellationOverlay;
use thiserror::Error;

use crate::db::{get_setting, put_setting, DbPool};

/// Settings key holding the serialized cancellation set.
pub const OVERLAY_KEY: &str = "phonix_cancelled_records";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored cancellation list is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Durable home of the cancellation overlay. The whole set is read and
/// written at once.
pub trait OverlayStore: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<CancellationOverlay, StorageError>> + Send;

    fn save(
        &self,
        overlay: &CancellationOverlay,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Keeps the set as one JSON array in the `settings` table.
#[derive(Debug, Clone)]
pub struct SqliteOverlayStore {
    pool: DbPool,
}

impl SqliteOverlayStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OverlayStore for SqliteOverlayStore {
    async fn load(&self) -> Result<CancellationOverlay, StorageError> {
        match get_setting(&self.pool, OVERLAY_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(CancellationOverlay::new()),
        }
    }

    async fn save(&self, overlay: &CancellationOverlay) -> Result<(), StorageError> {
        let json = serde_json::to_string(overlay)?;
        put_setting(&self.pool, OVERLAY_KEY, &json).await?;
        tracing::debug!(keys = overlay.len(), "cancellation overlay saved");
        Ok(())
    }
}

/// Process-local store without persistence. Its contents last as long as the
/// value does.
#[derive(Debug, Default)]
pub struct MemoryOverlayStore {
    saved: Mutex<CancellationOverlay>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overlay(overlay: CancellationOverlay) -> Self {
        Self { saved: Mutex::new(overlay) }
    }

    pub fn snapshot(&self) -> CancellationOverlay {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl OverlayStore for MemoryOverlayStore {
    async fn load(&self) -> Result<CancellationOverlay, StorageError> {
        Ok(self.snapshot())
    }

    async fn save(&self, overlay: &CancellationOverlay) -> Result<(), StorageError> {
        *self.saved.lock().unwrap_or_else(|e| e.into_inner()) = overlay.clone();
        Ok(())
    }
}
