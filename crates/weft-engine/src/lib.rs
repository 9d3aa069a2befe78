//! weft-engine - declarative workflow execution.
//!
//! Walks a directed graph of agent steps and control-flow nodes, fans out
//! parallel lanes, detects and resolves cross-lane file conflicts, and
//! pauses for external (human) decisions without blocking the host process.
//! The agent backend, the decision UI, and the workflow store are injected
//! ports; the engine owns only traversal, state, and merging.

pub mod builder;
pub mod conflict;
pub mod decision;
pub mod definition;
pub mod engine;
pub mod error;
pub mod events;
pub mod expr;
pub mod merge;
pub mod runner;
pub mod state;
pub mod store;

pub use builder::WorkflowBuilder;
pub use conflict::{ConflictGate, ConflictOutcome, MergeConflict, MergeResolution, ABORT_RESOLUTION};
pub use decision::{AutoDecider, DecisionChannel, DecisionHub, GateRequest, PendingDecision};
pub use definition::{
    AgentConfig, ConditionConfig, ForEachConfig, Gate, Node, NodeConfig, NodeKind, ParallelGroup,
    Position, SubWorkflowConfig, Transition, TransitionCondition, ValidationError, VarType,
    VariableDecl, WorkflowDefinition,
};
pub use engine::{Engine, DEFAULT_MAX_STEPS};
pub use error::EngineError;
pub use events::EngineEvent;
pub use expr::{evaluate, ExprError};
pub use merge::{merge, workspace_merge, CustomMergeFn, LaneResult, MergeStrategy, WorkspaceMerge};
pub use runner::{AgentRunner, MockRunner, RunnerOutput};
pub use state::{NodeState, NodeStatus, RunResult, RunStatus};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
