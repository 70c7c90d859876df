use std::sync::Arc;

use crate::{config::AppConfig, services::storage_service::StorageService};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            storage: StorageService::new(&config.storage_dir),
            config: Arc::new(config),
        }
    }
}
