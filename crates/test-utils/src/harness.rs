use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use rebuildd::config::ConfigFile;
use rebuildd::engine::{Consumer, ConsumerStats};
use rebuildd::errors::Result;
use rebuildd::services::Services;
use rebuildd::services::memory::{InventorySnapshot, MemoryServices};
use rebuildd::store::{ArtifactBuild, BuildStore, MemoryBuildStore};

/// A consumer wired to an in-memory store and in-memory services.
pub struct TestHarness {
    pub consumer: Consumer,
    pub memory: Arc<MemoryServices>,
    pub store: Arc<dyn BuildStore>,
    pub shutdown: watch::Sender<bool>,
}

impl TestHarness {
    pub fn new(cfg: &ConfigFile, snapshot: InventorySnapshot) -> Self {
        let memory = Arc::new(MemoryServices::new(snapshot));
        let store: Arc<dyn BuildStore> = Arc::new(MemoryBuildStore::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let consumer = rebuildd::build_consumer(
            cfg,
            Services::from_memory(memory.clone()),
            store.clone(),
            shutdown_rx,
        )
        .expect("Failed to build consumer from test config");

        Self {
            consumer,
            memory,
            store,
            shutdown,
        }
    }

    /// Feed one raw message through the consumer.
    pub async fn send(&mut self, topic: &str, body: Value) -> Result<()> {
        self.consumer.consume(topic, &body).await
    }

    /// Builds of the plan created for message `msg_id`.
    pub fn builds_for(&self, msg_id: &str) -> Vec<ArtifactBuild> {
        self.store
            .builds_for_event(msg_id)
            .expect("memory store never fails to read")
    }

    /// Build names per batch for message `msg_id`.
    pub fn batches_for(&self, msg_id: &str) -> Vec<Vec<String>> {
        let mut batches: Vec<Vec<String>> = Vec::new();
        for build in self.builds_for(msg_id) {
            if batches.len() <= build.batch {
                batches.resize(build.batch + 1, Vec::new());
            }
            batches[build.batch].push(build.name);
        }
        for batch in &mut batches {
            batch.sort();
        }
        batches
    }

    pub fn stats(&self) -> ConsumerStats {
        self.consumer.stats()
    }
}
