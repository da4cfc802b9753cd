use crate::{DomainResult, EditContextStore, InMemoryEditContexts};
use std::sync::Arc;
use stixgraph_bus::PubSub;
use stixgraph_storage::{EntityStore, FileStore, IN_MEMORY, JobStore};

/// Shared collaborators of every family service.
#[derive(Clone)]
pub struct Backends {
    pub entities: EntityStore,
    pub files: FileStore,
    pub jobs: JobStore,
    pub bus: Arc<PubSub>,
    pub contexts: Arc<dyn EditContextStore>,
}

impl Backends {
    /// Opens every store on `database` (a path or `:memory:`).
    pub fn open(database: &str, bus_capacity: usize) -> DomainResult<Self> {
        Ok(Self {
            entities: EntityStore::open(database)?,
            files: FileStore::open(database)?,
            jobs: JobStore::open(database)?,
            bus: Arc::new(PubSub::new(bus_capacity)),
            contexts: Arc::new(InMemoryEditContexts::new()),
        })
    }

    pub fn in_memory() -> DomainResult<Self> {
        Self::open(IN_MEMORY, stixgraph_bus::DEFAULT_CAPACITY)
    }

    /// Replaces the edit-context registry.
    pub fn with_contexts(mut self, contexts: Arc<dyn EditContextStore>) -> Self {
        self.contexts = contexts;
        self
    }
}
