//! Application wiring.
//!
//! Dependencies are assembled explicitly at startup: the driver registry is
//! built first, then storage, scheduler, driver, and the review coordinator
//! are constructed from configuration and handed to the command.

use anyhow::Context;
use std::sync::Arc;
use tracing::warn;

use shellcard_core::{
    Config, ReviewService, Sandbox, SandboxDefaults, Scheduler, SqliteStore, Store,
};
use shellcard_sandbox::DriverRegistry;

/// All wired-up application dependencies.
pub struct App {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub driver: Arc<dyn Sandbox>,
    pub review: ReviewService,
}

impl App {
    /// Wire storage, scheduler, sandbox driver, and the review coordinator.
    pub fn new(config: Config, registry: &DriverRegistry) -> anyhow::Result<Self> {
        let db_path = config.database_path().context("resolving database path")?;
        let store = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("opening database at {}", db_path.display()))?,
        );

        let driver = registry
            .get(&config.sandbox.driver)
            .with_context(|| format!("creating sandbox driver {:?}", config.sandbox.driver))?;

        let review = ReviewService::new(store.clone(), Scheduler::new(), driver.clone())
            .with_sandbox_defaults(SandboxDefaults::from(&config.sandbox));

        Ok(Self {
            config,
            store,
            driver,
            review,
        })
    }

    /// Release resources; failures are logged, not propagated.
    pub async fn close(&self) {
        if let Err(e) = self.driver.cleanup().await {
            warn!(error = %e, "failed to clean up sandbox driver");
        }
        if let Err(e) = self.store.close() {
            warn!(error = %e, "failed to close store");
        }
    }
}
