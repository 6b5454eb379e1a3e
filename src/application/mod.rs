pub mod config;
pub mod logging;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::warn;

use crate::db::Catalog;
use crate::embedding::{Embedder, Generator, HashEmbedder};
use crate::sync::manager::SyncManager;

use self::config::Configuration;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

/// The set of collaborators every core function is handed explicitly, in
/// place of the module-level singletons the original service used.
#[derive(Clone)]
pub struct Application {
    pub config: Arc<Configuration>,
    pub catalog: Catalog,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Option<Arc<dyn Generator>>,
    pub sync_manager: Arc<SyncManager>,
}

impl Application {
    pub async fn initialize(config: Configuration) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let catalog = Catalog::connect(&config.catalog_url).await?;
        catalog.migrate().await?;

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.embedding_dim));
        let generator: Option<Arc<dyn Generator>> = None;

        let sync_manager = Arc::new(SyncManager::new(catalog.clone(), config.clone(), embedder.clone()));

        Ok(Self {
            config,
            catalog,
            embedder,
            generator,
            sync_manager,
        })
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if !logging::tracing_subscribe(config) {
            warn!("failed to install tracing subscriber, there's probably one already installed");
        }

        LOGGER_INSTALLED.set(true).ok();
    }
}
