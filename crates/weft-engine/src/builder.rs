//! Fluent construction of workflow definitions.

use anyhow::{anyhow, Result};
use serde_json::Value;
use uuid::Uuid;

use crate::definition::{
    AgentConfig, ConditionConfig, ForEachConfig, Gate, Node, NodeConfig, ParallelGroup, Position,
    SubWorkflowConfig, Transition, TransitionCondition, VariableDecl, VarType,
    WorkflowDefinition,
};
use crate::merge::MergeStrategy;

/// Builder for creating workflow definitions with a fluent API.
pub struct WorkflowBuilder {
    name: String,
    description: String,
    entry: Option<String>,
    nodes: Vec<Node>,
    transitions: Vec<Transition>,
    gates: Vec<Gate>,
    variables: Vec<VariableDecl>,
    parallel_groups: Vec<ParallelGroup>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            entry: None,
            nodes: Vec::new(),
            transitions: Vec::new(),
            gates: Vec::new(),
            variables: Vec::new(),
            parallel_groups: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an agent node with default runner parameters.
    pub fn agent(self, id: impl Into<String>) -> Self {
        self.agent_with(id, AgentConfig::default())
    }

    /// Add an agent node with explicit runner parameters.
    pub fn agent_with(mut self, id: impl Into<String>, config: AgentConfig) -> Self {
        self.nodes.push(Node {
            id: id.into(),
            label: String::new(),
            config: NodeConfig::Agent(config),
            position: Position::default(),
        });
        self
    }

    /// Add a condition node branching on a sandboxed expression.
    pub fn condition(
        mut self,
        id: impl Into<String>,
        expression: impl Into<String>,
        true_branch: impl Into<String>,
        false_branch: impl Into<String>,
    ) -> Self {
        self.nodes.push(Node {
            id: id.into(),
            label: String::new(),
            config: NodeConfig::Condition {
                condition: Some(ConditionConfig {
                    expression: expression.into(),
                    true_branch_node_id: true_branch.into(),
                    false_branch_node_id: false_branch.into(),
                }),
            },
            position: Position::default(),
        });
        self
    }

    /// Add a for-each node iterating a collection variable.
    pub fn for_each(
        mut self,
        id: impl Into<String>,
        collection: impl Into<String>,
        item: impl Into<String>,
        body: &[&str],
    ) -> Self {
        self.nodes.push(Node {
            id: id.into(),
            label: String::new(),
            config: NodeConfig::ForEach {
                for_each: Some(ForEachConfig {
                    collection_variable: collection.into(),
                    item_variable: item.into(),
                    body_node_ids: body.iter().map(|s| s.to_string()).collect(),
                }),
            },
            position: Position::default(),
        });
        self
    }

    /// Add a sub-workflow node delegating to a stored workflow.
    pub fn sub_workflow(mut self, id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        self.nodes.push(Node {
            id: id.into(),
            label: String::new(),
            config: NodeConfig::SubWorkflow {
                sub_workflow: Some(SubWorkflowConfig {
                    workflow_id: workflow_id.into(),
                }),
            },
            position: Position::default(),
        });
        self
    }

    /// Add a fully custom node.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an unconditional transition.
    pub fn transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let id = format!("t{}", self.transitions.len() + 1);
        self.transitions.push(Transition {
            id,
            source: from.into(),
            target: to.into(),
            condition: TransitionCondition::Always,
        });
        self
    }

    /// Add a transition guarded by an expression.
    pub fn transition_if(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        let id = format!("t{}", self.transitions.len() + 1);
        self.transitions.push(Transition {
            id,
            source: from.into(),
            target: to.into(),
            condition: TransitionCondition::Expression {
                expression: expression.into(),
            },
        });
        self
    }

    /// Attach a human-in-the-loop gate to a node.
    pub fn gate(mut self, gate: Gate) -> Self {
        self.gates.push(gate);
        self
    }

    /// Declare a variable with a default value.
    pub fn variable(mut self, name: impl Into<String>, default: Value) -> Self {
        let var_type = match &default {
            Value::Number(_) => VarType::Number,
            Value::Bool(_) => VarType::Boolean,
            Value::Array(_) => VarType::Array,
            Value::Object(_) => VarType::Object,
            _ => VarType::String,
        };
        self.variables.push(VariableDecl {
            name: name.into(),
            var_type,
            required: false,
            default: Some(default),
        });
        self
    }

    /// Declare a variable with full control over type and required-ness.
    pub fn variable_decl(mut self, decl: VariableDecl) -> Self {
        self.variables.push(decl);
        self
    }

    /// Add a parallel group over the given lane nodes.
    pub fn parallel(mut self, id: impl Into<String>, lanes: &[&str], merge: MergeStrategy) -> Self {
        self.parallel_groups.push(ParallelGroup {
            id: id.into(),
            label: String::new(),
            lane_node_ids: lanes.iter().map(|s| s.to_string()).collect(),
            merge,
        });
        self
    }

    /// Set the entry node.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    /// Build and validate the definition.
    pub fn build(self) -> Result<WorkflowDefinition> {
        let entry = self
            .entry
            .ok_or_else(|| anyhow!("workflow must have an entry node"))?;

        let definition = WorkflowDefinition {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            description: self.description,
            entry,
            nodes: self.nodes,
            transitions: self.transitions,
            gates: self.gates,
            variables: self.variables,
            parallel_groups: self.parallel_groups,
        };

        let errors = definition.validate();
        if !errors.is_empty() {
            let messages: Vec<_> = errors.iter().map(|e| e.to_string()).collect();
            return Err(anyhow!(
                "workflow validation failed:\n  {}",
                messages.join("\n  ")
            ));
        }

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_simple_workflow() {
        let definition = WorkflowBuilder::new("simple")
            .agent("a")
            .agent("b")
            .transition("a", "b")
            .entry("a")
            .build()
            .unwrap();

        assert_eq!(definition.nodes.len(), 2);
        assert_eq!(definition.transitions.len(), 1);
        assert_eq!(definition.entry, "a");
    }

    #[test]
    fn test_build_requires_entry() {
        let result = WorkflowBuilder::new("no-entry").agent("a").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_dangling_transition() {
        let result = WorkflowBuilder::new("dangling")
            .agent("a")
            .transition("a", "missing")
            .entry("a")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_variable_infers_type_from_default() {
        let definition = WorkflowBuilder::new("vars")
            .agent("a")
            .variable("count", json!(3))
            .variable("tags", json!(["x"]))
            .entry("a")
            .build()
            .unwrap();

        assert_eq!(definition.variables[0].var_type, VarType::Number);
        assert_eq!(definition.variables[1].var_type, VarType::Array);
    }

    #[test]
    fn test_parallel_group_participates_in_graph() {
        let definition = WorkflowBuilder::new("fanout")
            .agent("start")
            .agent("lane_a")
            .agent("lane_b")
            .agent("after")
            .parallel("grp", &["lane_a", "lane_b"], MergeStrategy::Workspace)
            .transition("start", "grp")
            .transition("grp", "after")
            .entry("start")
            .build()
            .unwrap();

        assert_eq!(definition.parallel_groups.len(), 1);
        assert!(definition.group("grp").is_some());
    }
}
