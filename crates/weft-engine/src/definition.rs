//! Workflow definitions - the immutable input to a run.
//!
//! The engine never mutates a definition in place; execution state is
//! derived alongside it.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::merge::MergeStrategy;

/// A workflow definition: nodes, transitions, gates, declared variables and
/// parallel groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Entry node id.
    pub entry: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub parallel_groups: Vec<ParallelGroup>,
}

/// Node kind: an agent step or a control-flow construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Agent,
    Control,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub config: NodeConfig,
    #[serde(default)]
    pub position: Position,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.config {
            NodeConfig::Agent(_) => NodeKind::Agent,
            _ => NodeKind::Control,
        }
    }
}

/// Designer canvas position. Opaque to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Closed node configuration union, selected by the `kind` tag.
///
/// Control sub-configs are optional so a malformed definition still
/// deserializes; the engine fails the node at dispatch time instead of
/// rejecting the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Agent(AgentConfig),
    Condition {
        #[serde(default)]
        condition: Option<ConditionConfig>,
    },
    ForEach {
        #[serde(default)]
        for_each: Option<ForEachConfig>,
    },
    SubWorkflow {
        #[serde(default)]
        sub_workflow: Option<SubWorkflowConfig>,
    },
}

/// Runner parameters for an agent step. Opaque to the engine; passed
/// through to the injected runner untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Backend-specific parameters, passed through untouched.
    #[serde(default)]
    pub params: HashMap<String, Value>,
}

fn default_max_turns() -> usize {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: None,
            model: None,
            prompt: None,
            max_turns: default_max_turns(),
            params: HashMap::new(),
        }
    }
}

/// Branching on a sandboxed expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub expression: String,
    pub true_branch_node_id: String,
    pub false_branch_node_id: String,
}

/// Iteration over a collection variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachConfig {
    pub collection_variable: String,
    pub item_variable: String,
    pub body_node_ids: Vec<String>,
}

/// Delegation to another stored workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubWorkflowConfig {
    pub workflow_id: String,
}

/// Directed edge between nodes (or parallel groups).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: TransitionCondition,
}

/// Condition for taking a transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionCondition {
    #[default]
    Always,
    Expression { expression: String },
}

/// Human-in-the-loop approval attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_gate_options")]
    pub options: Vec<String>,
    /// Option value that approves; any other selection rejects.
    #[serde(default = "default_approve_option")]
    pub approve_option: String,
    /// A rejected required gate aborts the run; a rejected optional gate
    /// fails only the node.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_gate_options() -> Vec<String> {
    vec!["approve".to_string(), "reject".to_string()]
}

fn default_approve_option() -> String {
    "approve".to_string()
}

fn default_required() -> bool {
    true
}

/// Lanes executed concurrently and merged before the workflow continues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelGroup {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub lane_node_ids: Vec<String>,
    #[serde(default)]
    pub merge: MergeStrategy,
}

/// A declared workflow variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(default)]
    pub var_type: VarType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl VarType {
    /// Whether a value fits the declared type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            VarType::String => value.is_string(),
            VarType::Number => value.is_number(),
            VarType::Boolean => value.is_boolean(),
            VarType::Array => value.is_array(),
            VarType::Object => value.is_object(),
        }
    }
}

/// Structural validation errors, raised before any node executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("entry node '{0}' does not exist")]
    MissingEntry(String),

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("{context} references unknown node '{id}'")]
    DanglingReference { context: String, id: String },
}

impl WorkflowDefinition {
    /// Validate the graph structure. Every transition endpoint, condition
    /// branch, for-each body node, gate attachment and lane must reference
    /// an existing node (or group) id.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut node_ids: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }
        let group_ids: HashSet<&str> =
            self.parallel_groups.iter().map(|g| g.id.as_str()).collect();
        let known = |id: &str| node_ids.contains(id) || group_ids.contains(id);

        if !known(&self.entry) {
            errors.push(ValidationError::MissingEntry(self.entry.clone()));
        }

        for transition in &self.transitions {
            if !known(&transition.source) {
                errors.push(ValidationError::DanglingReference {
                    context: format!("transition '{}' source", transition.id),
                    id: transition.source.clone(),
                });
            }
            if !known(&transition.target) {
                errors.push(ValidationError::DanglingReference {
                    context: format!("transition '{}' target", transition.id),
                    id: transition.target.clone(),
                });
            }
        }

        for node in &self.nodes {
            match &node.config {
                NodeConfig::Condition {
                    condition: Some(config),
                } => {
                    for branch in [&config.true_branch_node_id, &config.false_branch_node_id] {
                        if !known(branch) {
                            errors.push(ValidationError::DanglingReference {
                                context: format!("condition node '{}' branch", node.id),
                                id: branch.clone(),
                            });
                        }
                    }
                }
                NodeConfig::ForEach {
                    for_each: Some(config),
                } => {
                    for body in &config.body_node_ids {
                        if !node_ids.contains(body.as_str()) {
                            errors.push(ValidationError::DanglingReference {
                                context: format!("for-each node '{}' body", node.id),
                                id: body.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        for gate in &self.gates {
            if !node_ids.contains(gate.node_id.as_str()) {
                errors.push(ValidationError::DanglingReference {
                    context: format!("gate '{}'", gate.id),
                    id: gate.node_id.clone(),
                });
            }
        }

        for group in &self.parallel_groups {
            for lane in &group.lane_node_ids {
                if !node_ids.contains(lane.as_str()) {
                    errors.push(ValidationError::DanglingReference {
                        context: format!("parallel group '{}' lane", group.id),
                        id: lane.clone(),
                    });
                }
            }
        }

        errors
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&ParallelGroup> {
        self.parallel_groups.iter().find(|g| g.id == id)
    }

    pub fn gate_for(&self, node_id: &str) -> Option<&Gate> {
        self.gates.iter().find(|g| g.node_id == node_id)
    }

    /// Outgoing transitions from a node or group, in declaration order.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.source == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use serde_json::json;

    #[test]
    fn test_validate_clean_definition() {
        let definition = WorkflowBuilder::new("ok")
            .agent("a")
            .agent("b")
            .transition("a", "b")
            .entry("a")
            .build()
            .unwrap();
        assert!(definition.validate().is_empty());
    }

    #[test]
    fn test_validate_dangling_transition() {
        let mut definition = WorkflowBuilder::new("broken")
            .agent("a")
            .entry("a")
            .build()
            .unwrap();
        definition.transitions.push(Transition {
            id: "t-bad".to_string(),
            source: "a".to_string(),
            target: "ghost".to_string(),
            condition: TransitionCondition::Always,
        });

        let errors = definition.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DanglingReference { id, .. } if id == "ghost")));
    }

    #[test]
    fn test_validate_dangling_lane() {
        let mut definition = WorkflowBuilder::new("broken")
            .agent("a")
            .entry("a")
            .build()
            .unwrap();
        definition.parallel_groups.push(ParallelGroup {
            id: "grp".to_string(),
            label: String::new(),
            lane_node_ids: vec!["a".to_string(), "phantom".to_string()],
            merge: MergeStrategy::Workspace,
        });

        let errors = definition.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DanglingReference { id, .. } if id == "phantom")));
    }

    #[test]
    fn test_validate_duplicate_node_id() {
        let mut definition = WorkflowBuilder::new("dup")
            .agent("a")
            .entry("a")
            .build()
            .unwrap();
        definition.nodes.push(Node {
            id: "a".to_string(),
            label: String::new(),
            config: NodeConfig::Agent(AgentConfig::default()),
            position: Position::default(),
        });

        let errors = definition.validate();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateNodeId(id) if id == "a")));
    }

    #[test]
    fn test_node_config_deserializes_by_kind_tag() {
        let node: Node = serde_json::from_value(json!({
            "id": "check",
            "config": {
                "kind": "condition",
                "condition": {
                    "expression": "ok == true",
                    "true_branch_node_id": "yes",
                    "false_branch_node_id": "no"
                }
            }
        }))
        .unwrap();
        assert_eq!(node.kind(), NodeKind::Control);
        match node.config {
            NodeConfig::Condition {
                condition: Some(config),
            } => assert_eq!(config.expression, "ok == true"),
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_control_node_without_subconfig_still_deserializes() {
        let node: Node = serde_json::from_value(json!({
            "id": "broken",
            "config": { "kind": "for_each" }
        }))
        .unwrap();
        assert!(matches!(
            node.config,
            NodeConfig::ForEach { for_each: None }
        ));
    }

    #[test]
    fn test_agent_config_keeps_backend_params() {
        let config: AgentConfig = serde_json::from_value(json!({
            "model": "sonnet",
            "params": { "temperature": 0.2, "sandbox": true }
        }))
        .unwrap();
        assert_eq!(config.model.as_deref(), Some("sonnet"));
        assert_eq!(config.max_turns, 10);
        assert_eq!(config.params.get("temperature"), Some(&json!(0.2)));
        assert_eq!(config.params.get("sandbox"), Some(&json!(true)));
    }

    #[test]
    fn test_var_type_matching() {
        assert!(VarType::Array.matches(&json!([1])));
        assert!(!VarType::Array.matches(&json!("nope")));
        assert!(VarType::Number.matches(&json!(3.5)));
        assert!(VarType::Object.matches(&json!({})));
    }
}
