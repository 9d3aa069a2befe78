//! Agent runner port and the built-in mock runner.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::definition::{AgentConfig, Node};

/// Output of one agent step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerOutput {
    pub output: Value,
    /// Paths the step wrote, when the backend tracks file-level work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_changed: Option<Vec<String>>,
}

impl RunnerOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            files_changed: None,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_changed = Some(files);
        self
    }
}

/// Capability that actually executes an agent node.
///
/// Supplied by the host; the engine is agnostic to which backend runs the
/// step and never retries on its behalf.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_agent(
        &self,
        node: &Node,
        config: &AgentConfig,
        variables: &HashMap<String, Value>,
    ) -> Result<RunnerOutput>;
}

/// No-op runner for tests and previews.
///
/// Completes every agent node with a synthetic output. Substituting it via
/// mock mode changes only the completion source, never branching, merge, or
/// gating semantics.
pub struct MockRunner;

#[async_trait]
impl AgentRunner for MockRunner {
    async fn run_agent(
        &self,
        node: &Node,
        _config: &AgentConfig,
        _variables: &HashMap<String, Value>,
    ) -> Result<RunnerOutput> {
        Ok(RunnerOutput::new(json!({
            "mock": true,
            "node": node.id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Node, NodeConfig};

    #[tokio::test]
    async fn test_mock_runner_always_succeeds() {
        let node = Node {
            id: "step".to_string(),
            label: String::new(),
            config: NodeConfig::Agent(AgentConfig::default()),
            position: Default::default(),
        };
        let output = MockRunner
            .run_agent(&node, &AgentConfig::default(), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(output.output["node"], "step");
        assert!(output.files_changed.is_none());
    }
}
