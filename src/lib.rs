//! Guard staging server - annotation workflow for keyword and rule proposals

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod staging;
pub mod store;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::staging::{ConfigWriter, SqliteConfigWriter, StagingManager, StagingSettings};

/// Application state shared across handlers
pub struct AppState {
    pub manager: StagingManager,
}

impl AppState {
    pub fn new(pool: SqlitePool, settings: StagingSettings) -> Arc<Self> {
        Self::with_writer(pool, settings, Arc::new(SqliteConfigWriter))
    }

    pub fn with_writer(
        pool: SqlitePool,
        settings: StagingSettings,
        writer: Arc<dyn ConfigWriter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager: StagingManager::new(store::Store::new(pool), writer, settings),
        })
    }
}
