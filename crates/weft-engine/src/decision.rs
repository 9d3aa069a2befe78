//! Decision channel between the engine and the host UI layer.
//!
//! The engine needs exactly two request/response exchanges: merge-conflict
//! resolution and gate approval. The port is injected at construction with
//! one concrete adapter per host; it is never a process-wide singleton.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::info;

use crate::conflict::{MergeConflict, MergeResolution};

/// Structured approval request for a human-in-the-loop gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRequest {
    pub gate_id: String,
    pub node_id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

/// Asynchronous request/response port to the host UI.
#[async_trait]
pub trait DecisionChannel: Send + Sync {
    /// Surface merge conflicts and suspend until resolutions arrive.
    async fn resolve_conflicts(
        &self,
        conflicts: Vec<MergeConflict>,
    ) -> Result<Vec<MergeResolution>>;

    /// Surface a gate approval request and suspend until an option is
    /// selected. Returns the selected option value.
    async fn request_approval(&self, request: GateRequest) -> Result<String>;
}

/// A decision the host still has to answer.
pub enum PendingDecision {
    Conflicts {
        conflicts: Vec<MergeConflict>,
        responder: oneshot::Sender<Vec<MergeResolution>>,
    },
    Approval {
        request: GateRequest,
        responder: oneshot::Sender<String>,
    },
}

/// Channel-backed decision adapter.
///
/// The engine side sends a [`PendingDecision`] and suspends on its oneshot
/// responder; the host side drains the receiver and answers. Waiting is
/// indefinite: a long-pending gate surfaces as `waiting_gate`, not as an
/// error.
pub struct DecisionHub {
    request_tx: mpsc::Sender<PendingDecision>,
    request_rx: Arc<Mutex<mpsc::Receiver<PendingDecision>>>,
}

impl DecisionHub {
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::channel(16);
        Self {
            request_tx,
            request_rx: Arc::new(Mutex::new(request_rx)),
        }
    }

    /// Receiver for the host side. Its holder is responsible for answering
    /// every pending decision it takes out.
    pub fn receiver(&self) -> Arc<Mutex<mpsc::Receiver<PendingDecision>>> {
        self.request_rx.clone()
    }
}

impl Default for DecisionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionChannel for DecisionHub {
    async fn resolve_conflicts(
        &self,
        conflicts: Vec<MergeConflict>,
    ) -> Result<Vec<MergeResolution>> {
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(PendingDecision::Conflicts {
                conflicts,
                responder,
            })
            .await
            .map_err(|_| anyhow!("decision channel closed"))?;
        response
            .await
            .map_err(|_| anyhow!("decision responder dropped"))
    }

    async fn request_approval(&self, request: GateRequest) -> Result<String> {
        info!(gate_id = %request.gate_id, node_id = %request.node_id, "forwarding gate approval request");
        let (responder, response) = oneshot::channel();
        self.request_tx
            .send(PendingDecision::Approval { request, responder })
            .await
            .map_err(|_| anyhow!("decision channel closed"))?;
        response
            .await
            .map_err(|_| anyhow!("decision responder dropped"))
    }
}

/// Adapter that answers everything itself: every gate gets its first
/// offered option and every conflict keeps the block-A writer. Used by
/// previews and tests.
pub struct AutoDecider;

#[async_trait]
impl DecisionChannel for AutoDecider {
    async fn resolve_conflicts(
        &self,
        conflicts: Vec<MergeConflict>,
    ) -> Result<Vec<MergeResolution>> {
        Ok(conflicts
            .into_iter()
            .map(|c| MergeResolution {
                file_path: c.file_path,
                keep_block_id: c.block_a_id,
            })
            .collect())
    }

    async fn request_approval(&self, request: GateRequest) -> Result<String> {
        Ok(request
            .options
            .first()
            .cloned()
            .unwrap_or_else(|| "approve".to_string()))
    }
}
