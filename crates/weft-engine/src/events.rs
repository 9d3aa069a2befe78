//! Engine event stream for host UIs.

use serde::{Deserialize, Serialize};

use crate::state::{NodeStatus, RunStatus};

/// State updates emitted while a run progresses. Delivery is best-effort;
/// a host that does not subscribe loses nothing but visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        workflow_id: String,
    },
    NodeStatusChanged {
        node_id: String,
        status: NodeStatus,
    },
    GroupStarted {
        group_id: String,
        lanes: usize,
    },
    GroupMerged {
        group_id: String,
        had_conflicts: bool,
    },
    RunFinished {
        workflow_id: String,
        status: RunStatus,
    },
}
