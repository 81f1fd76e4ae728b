//! Runs one [`SyncEngine`] per registered source.
//!
//! Sources are fully independent: a paused or failing engine never
//! affects the others. The only shared state is the stores themselves.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sync_harness_core::store::CursorStore;

use crate::adapter::AdapterRegistry;
use crate::dedup::StoreSet;
use crate::engine::{EngineSettings, SyncEngine};
use crate::enrich::EnrichmentDispatcher;
use crate::health::EngineHealth;

pub struct Supervisor {
    engines: Vec<Arc<SyncEngine>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            engines: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// One engine per source in `registry`, all writing to `stores`.
    pub fn from_registry(
        registry: &AdapterRegistry,
        stores: StoreSet,
        cursors: Arc<dyn CursorStore>,
        settings: EngineSettings,
        enrichment: &EnrichmentDispatcher,
    ) -> Self {
        let mut supervisor = Self::new();
        for source in registry.sources() {
            let engine = SyncEngine::new(
                source.clone(),
                stores.clone(),
                cursors.clone(),
                settings.clone(),
            )
            .with_enrichment(enrichment.clone());
            supervisor.add(engine);
        }
        supervisor
    }

    pub fn add(&mut self, engine: SyncEngine) -> Arc<SyncEngine> {
        let engine = Arc::new(engine);
        self.engines.push(engine.clone());
        engine
    }

    pub fn engines(&self) -> &[Arc<SyncEngine>] {
        &self.engines
    }

    pub fn find(&self, source: &str) -> Option<&Arc<SyncEngine>> {
        self.engines.iter().find(|e| e.source() == source)
    }

    /// Spawn every engine that is not already running.
    pub fn start(&mut self) {
        self.tasks.retain(|t| !t.is_finished());
        for engine in &self.engines {
            let engine = engine.clone();
            info!(source = %engine.source(), owner = %engine.owner(), "starting engine");
            self.tasks.push(tokio::spawn(async move { engine.run().await }));
        }
    }

    /// Reset a paused engine and spawn it again.
    pub fn restart(&mut self, source: &str) -> bool {
        let Some(engine) = self.find(source).cloned() else {
            return false;
        };
        engine.reset();
        self.tasks.push(tokio::spawn(async move { engine.run().await }));
        true
    }

    pub fn health(&self) -> Vec<EngineHealth> {
        let now = Utc::now();
        self.engines.iter().map(|e| e.health_report(now)).collect()
    }

    /// Stop every engine and wait for their tasks to exit.
    pub async fn shutdown(self) {
        for engine in &self.engines {
            engine.stop();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        info!("all engines stopped");
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
