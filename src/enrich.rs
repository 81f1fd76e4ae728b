//! Best-effort post-indexing enrichment.
//!
//! Enrichers run after a cycle's writes are durable. Every (node, enricher)
//! pair is one task on a bounded pool; failures and timeouts are logged
//! and counted and nothing else. They never fail the cycle, hold back the
//! cursor, or cause a node to be rewritten.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tracing::warn;

use sync_harness_core::models::Node;

use crate::error::timed;

#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;
    async fn enrich(&self, node: &Node) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub attempted: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct EnrichmentDispatcher {
    enrichers: Vec<Arc<dyn Enricher>>,
    concurrency: usize,
    call_timeout: Duration,
}

impl EnrichmentDispatcher {
    pub fn new(concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            enrichers: Vec::new(),
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    pub fn register(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers.push(enricher);
    }

    pub fn with(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.register(enricher);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.enrichers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.enrichers.len()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(nodes = nodes.len(), enrichers = self.enrichers.len()))]
    pub async fn dispatch(&self, nodes: &[Node]) -> EnrichmentReport {
        if self.enrichers.is_empty() || nodes.is_empty() {
            return EnrichmentReport::default();
        }

        // Tasks own their node and enricher so a spawned `run()` stays Send.
        let tasks: Vec<BoxFuture<'static, bool>> = nodes
            .iter()
            .flat_map(|node| {
                self.enrichers
                    .iter()
                    .map(move |enricher| enrich_one(enricher.clone(), node.clone(), self.call_timeout))
            })
            .collect();

        let outcomes: Vec<bool> = stream::iter(tasks)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        EnrichmentReport {
            attempted: outcomes.len(),
            failed: outcomes.iter().filter(|ok| !**ok).count(),
        }
    }
}

fn enrich_one(
    enricher: Arc<dyn Enricher>,
    node: Node,
    call_timeout: Duration,
) -> BoxFuture<'static, bool> {
    async move {
        match timed("enricher.enrich", call_timeout, enricher.enrich(&node)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(
                    enricher = enricher.name(),
                    node_id = %node.id,
                    error = %format!("{:#}", e),
                    "enrichment failed"
                );
                false
            }
            Err(timeout) => {
                warn!(
                    enricher = enricher.name(),
                    node_id = %node.id,
                    error = %timeout,
                    "enrichment timed out"
                );
                false
            }
        }
    }
    .boxed()
}
