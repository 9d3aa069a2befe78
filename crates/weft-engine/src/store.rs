//! Workflow store port used by sub-workflow nodes.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::definition::WorkflowDefinition;

/// Resolves workflow ids to definitions. Supplied by the host; definitions
/// are external data, the engine never persists them.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn load_workflow(&self, id: &str) -> Result<WorkflowDefinition>;
}

/// In-memory store, sufficient for hosts that keep definitions loaded.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, definition: WorkflowDefinition) {
        self.workflows
            .write()
            .await
            .insert(definition.id.clone(), definition);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn load_workflow(&self, id: &str) -> Result<WorkflowDefinition> {
        self.workflows
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown workflow '{}'", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;

    #[tokio::test]
    async fn test_in_memory_store_round_trip() {
        let store = InMemoryWorkflowStore::new();
        let definition = WorkflowBuilder::new("child")
            .agent("only")
            .entry("only")
            .build()
            .unwrap();
        let id = definition.id.clone();

        store.insert(definition).await;
        let loaded = store.load_workflow(&id).await.unwrap();
        assert_eq!(loaded.name, "child");

        assert!(store.load_workflow("nope").await.is_err());
    }
}
