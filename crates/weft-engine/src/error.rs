//! Engine error taxonomy.
//!
//! Only failures that stop a run before or outside node execution surface
//! here. Node-local failures (missing control config, runner errors, gate
//! rejections) are recorded in the node's state and never thrown.

use crate::definition::ValidationError;
use crate::expr::ExprError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Structural validation failed; nothing executed.
    #[error("workflow definition is invalid: {}", format_errors(.0))]
    InvalidDefinition(Vec<ValidationError>),

    /// A required variable had no default and no caller-supplied value.
    #[error("required variable '{0}' has no value")]
    MissingVariable(String),

    /// A caller-supplied value does not fit the declared variable type.
    #[error("variable '{name}' does not match its declared type {expected:?}")]
    VariableType {
        name: String,
        expected: crate::definition::VarType,
    },

    /// A transition condition could not be evaluated.
    #[error("transition '{id}' condition failed: {source}")]
    TransitionCondition {
        id: String,
        #[source]
        source: ExprError,
    },

    /// The traversal guard tripped, usually a condition loop.
    #[error("run exceeded {0} traversal steps")]
    StepLimitExceeded(usize),

    /// The host side of the decision channel went away.
    #[error("decision channel failed: {0}")]
    DecisionChannel(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
