//! Workflow execution engine.
//!
//! The state machine that walks the graph: dispatches agent nodes to the
//! injected runner, control nodes to the expression evaluator, parallel
//! groups to concurrent lane execution plus the conflict gate, and pauses
//! at human-in-the-loop gates without blocking the host process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::conflict::ConflictGate;
use crate::decision::{AutoDecider, DecisionChannel, GateRequest};
use crate::definition::{
    AgentConfig, ConditionConfig, ForEachConfig, Gate, Node, NodeConfig, ParallelGroup,
    SubWorkflowConfig, TransitionCondition, ValidationError, WorkflowDefinition,
};
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::expr;
use crate::merge::{self, CustomMergeFn, LaneResult, MergeStrategy};
use crate::runner::{AgentRunner, MockRunner};
use crate::state::{NodeState, NodeStatus, RunResult, RunStatus};
use crate::store::{InMemoryWorkflowStore, WorkflowStore};

/// Default bound on traversal steps, preventing runaway condition loops.
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Where traversal goes after dispatching one node.
enum StepOutcome {
    /// Follow the node's outgoing transitions.
    Continue,
    /// Jump directly to a node or group (condition branches).
    Goto(String),
    /// The node failed; nothing downstream fires.
    Halt,
    /// An abort reached the run scope.
    Abort,
}

enum GateOutcome {
    Approved,
    Failed,
    Aborted,
}

/// Mutable state of one run: node records, the variable store, and the
/// traversal step counter.
struct RunContext {
    node_states: HashMap<String, NodeState>,
    variables: HashMap<String, Value>,
    steps: usize,
    last_error: Option<String>,
}

impl RunContext {
    fn seed(
        definition: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
    ) -> Result<Self, EngineError> {
        let mut variables = HashMap::new();
        for decl in &definition.variables {
            if let Some(default) = &decl.default {
                variables.insert(decl.name.clone(), default.clone());
            }
        }
        for (name, value) in inputs {
            if let Some(decl) = definition.variables.iter().find(|d| d.name == name) {
                if !decl.var_type.matches(&value) {
                    return Err(EngineError::VariableType {
                        name,
                        expected: decl.var_type,
                    });
                }
            }
            variables.insert(name, value);
        }
        for decl in &definition.variables {
            if decl.required && !variables.contains_key(&decl.name) {
                return Err(EngineError::MissingVariable(decl.name.clone()));
            }
        }

        let node_states = definition
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeState::pending(&n.id)))
            .collect();

        Ok(Self {
            node_states,
            variables,
            steps: 0,
            last_error: None,
        })
    }

    fn empty(variables: HashMap<String, Value>) -> Self {
        Self {
            node_states: HashMap::new(),
            variables,
            steps: 0,
            last_error: None,
        }
    }

    fn set_status(&mut self, node_id: &str, status: NodeStatus) {
        let state = self
            .node_states
            .entry(node_id.to_string())
            .or_insert_with(|| NodeState::pending(node_id));
        if state.started_at.is_none()
            && matches!(status, NodeStatus::Running | NodeStatus::WaitingGate)
        {
            state.started_at = Some(Utc::now());
        }
        if status.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        state.status = status;
    }

    fn record_error(&mut self, node_id: &str, error: String) {
        if let Some(state) = self.node_states.get_mut(node_id) {
            state.error = Some(error.clone());
        }
        self.last_error = Some(error);
    }
}

/// Outcome of one executed lane: its result plus the node states it touched.
struct LaneRun {
    result: LaneResult,
    node_states: HashMap<String, NodeState>,
}

/// The engine. One instance drives one or more runs; all collaborators are
/// injected at construction.
pub struct Engine {
    runner: Arc<dyn AgentRunner>,
    decisions: Arc<dyn DecisionChannel>,
    store: Arc<dyn WorkflowStore>,
    custom_merges: HashMap<String, Arc<CustomMergeFn>>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
    mock_mode: bool,
    max_steps: usize,
}

impl Engine {
    pub fn new(runner: Arc<dyn AgentRunner>, decisions: Arc<dyn DecisionChannel>) -> Self {
        Self {
            runner,
            decisions,
            store: Arc::new(InMemoryWorkflowStore::new()),
            custom_merges: HashMap::new(),
            events: None,
            mock_mode: false,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Preview engine: mock runner, self-answering decisions.
    pub fn mock() -> Self {
        Self::new(Arc::new(MockRunner), Arc::new(AutoDecider)).with_mock_mode(true)
    }

    /// Substitute the mock runner for agent nodes. Branching, merge and
    /// gating semantics are unaffected.
    pub fn with_mock_mode(mut self, on: bool) -> Self {
        self.mock_mode = on;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Register a custom merge function for a parallel group.
    pub fn with_custom_merge(
        mut self,
        group_id: impl Into<String>,
        merge_fn: Arc<CustomMergeFn>,
    ) -> Self {
        self.custom_merges.insert(group_id.into(), merge_fn);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run a workflow to its terminal state.
    ///
    /// Structural problems (dangling references, missing required inputs)
    /// fail fast before any node executes. Node-local failures land in the
    /// trace, not in the returned error.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        inputs: HashMap<String, Value>,
    ) -> Result<RunResult, EngineError> {
        let errors = definition.validate();
        if !errors.is_empty() {
            return Err(EngineError::InvalidDefinition(errors));
        }

        let mut ctx = RunContext::seed(definition, inputs)?;
        let started_at = Utc::now();
        self.emit(EngineEvent::RunStarted {
            workflow_id: definition.id.clone(),
        });
        info!(workflow = %definition.name, entry = %definition.entry, "starting workflow run");

        let mut status = RunStatus::Completed;
        let mut run_error: Option<String> = None;
        let mut current = Some(definition.entry.clone());

        while let Some(id) = current.take() {
            if ctx.steps >= self.max_steps {
                return Err(EngineError::StepLimitExceeded(self.max_steps));
            }
            ctx.steps += 1;

            let outcome = if let Some(group) = definition.group(&id) {
                self.run_group(definition, &mut ctx, group).await?
            } else if let Some(node) = definition.node(&id) {
                self.execute_node(definition, &mut ctx, node).await?
            } else {
                // Validation makes this unreachable; keep it honest anyway.
                return Err(EngineError::InvalidDefinition(vec![
                    ValidationError::DanglingReference {
                        context: "traversal".to_string(),
                        id,
                    },
                ]));
            };

            match outcome {
                StepOutcome::Goto(next) => current = Some(next),
                StepOutcome::Continue => match self.next_transition(definition, &ctx, &id) {
                    Ok(next) => current = next,
                    Err(err) => {
                        status = RunStatus::Failed;
                        run_error = Some(err.to_string());
                    }
                },
                StepOutcome::Halt => {
                    status = RunStatus::Failed;
                    run_error = ctx.last_error.clone();
                }
                StepOutcome::Abort => {
                    status = RunStatus::Aborted;
                    run_error = ctx.last_error.clone();
                }
            }
        }

        self.emit(EngineEvent::RunFinished {
            workflow_id: definition.id.clone(),
            status,
        });
        info!(workflow = %definition.name, ?status, "workflow run finished");

        Ok(RunResult {
            workflow_id: definition.id.clone(),
            status,
            error: run_error,
            node_states: ctx.node_states,
            variables: ctx.variables,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn execute_node(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut RunContext,
        node: &Node,
    ) -> Result<StepOutcome, EngineError> {
        // A gated node does not start until the gate decides.
        if let Some(gate) = definition.gate_for(&node.id) {
            match self.pass_gate(ctx, node, gate).await? {
                GateOutcome::Approved => {}
                GateOutcome::Failed => return Ok(StepOutcome::Halt),
                GateOutcome::Aborted => return Ok(StepOutcome::Abort),
            }
        }

        match &node.config {
            NodeConfig::Agent(config) => self.run_agent_node(ctx, node, config).await,
            NodeConfig::Condition { condition } => {
                Ok(self.run_condition_node(ctx, node, condition.as_ref()))
            }
            NodeConfig::ForEach { for_each } => {
                self.run_for_each(definition, ctx, node, for_each.as_ref())
                    .await
            }
            NodeConfig::SubWorkflow { sub_workflow } => {
                self.run_sub_workflow(ctx, node, sub_workflow.as_ref()).await
            }
        }
    }

    async fn pass_gate(
        &self,
        ctx: &mut RunContext,
        node: &Node,
        gate: &Gate,
    ) -> Result<GateOutcome, EngineError> {
        self.set_status(ctx, &node.id, NodeStatus::WaitingGate);
        info!(gate = %gate.id, node = %node.id, "waiting for gate decision");

        let request = GateRequest {
            gate_id: gate.id.clone(),
            node_id: node.id.clone(),
            prompt: gate.prompt.clone(),
            options: gate.options.clone(),
        };
        let selected = self
            .decisions
            .request_approval(request)
            .await
            .map_err(|e| EngineError::DecisionChannel(e.to_string()))?;

        if selected == gate.approve_option {
            debug!(gate = %gate.id, "gate approved");
            return Ok(GateOutcome::Approved);
        }

        let message = format!("gate '{}' rejected with '{}'", gate.id, selected);
        if gate.required {
            warn!(gate = %gate.id, selected = %selected, "required gate rejected, aborting");
            self.set_status(ctx, &node.id, NodeStatus::Aborted);
            ctx.record_error(&node.id, message);
            Ok(GateOutcome::Aborted)
        } else {
            warn!(gate = %gate.id, selected = %selected, "optional gate rejected, failing node");
            self.set_status(ctx, &node.id, NodeStatus::Failed);
            ctx.record_error(&node.id, message);
            Ok(GateOutcome::Failed)
        }
    }

    async fn run_agent_node(
        &self,
        ctx: &mut RunContext,
        node: &Node,
        config: &AgentConfig,
    ) -> Result<StepOutcome, EngineError> {
        self.set_status(ctx, &node.id, NodeStatus::Running);
        let start = Instant::now();

        let result = if self.mock_mode {
            MockRunner.run_agent(node, config, &ctx.variables).await
        } else {
            self.runner.run_agent(node, config, &ctx.variables).await
        };

        match result {
            Ok(output) => {
                // The node's record lands under its id so expressions can
                // address it with single-level property access
                // (`deploy.output`, `deploy.filesChanged`).
                let mut record = serde_json::Map::new();
                record.insert("output".to_string(), output.output);
                if let Some(files) = output.files_changed {
                    record.insert("filesChanged".to_string(), json!(files));
                }
                ctx.variables.insert(node.id.clone(), Value::Object(record));
                self.set_status(ctx, &node.id, NodeStatus::Completed);
                debug!(node = %node.id, elapsed = ?start.elapsed(), "agent node completed");
                Ok(StepOutcome::Continue)
            }
            Err(e) => {
                // No retry; that is the runner's concern.
                warn!(node = %node.id, error = %e, "agent node failed");
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(&node.id, e.to_string());
                Ok(StepOutcome::Halt)
            }
        }
    }

    fn run_condition_node(
        &self,
        ctx: &mut RunContext,
        node: &Node,
        config: Option<&ConditionConfig>,
    ) -> StepOutcome {
        let Some(config) = config else {
            self.set_status(ctx, &node.id, NodeStatus::Failed);
            ctx.record_error(
                &node.id,
                "condition node has no condition config".to_string(),
            );
            return StepOutcome::Halt;
        };

        self.set_status(ctx, &node.id, NodeStatus::Running);
        match expr::evaluate(&config.expression, &ctx.variables) {
            Ok(verdict) => {
                ctx.variables
                    .insert(format!("__condition_{}", node.id), Value::Bool(verdict));
                let (taken, skipped) = if verdict {
                    (&config.true_branch_node_id, &config.false_branch_node_id)
                } else {
                    (&config.false_branch_node_id, &config.true_branch_node_id)
                };
                // The untaken branch never executes and propagates nothing.
                self.set_status(ctx, skipped, NodeStatus::Skipped);
                self.set_status(ctx, &node.id, NodeStatus::Completed);
                debug!(node = %node.id, verdict, taken = %taken, "condition evaluated");
                StepOutcome::Goto(taken.clone())
            }
            Err(e) => {
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(&node.id, e.to_string());
                StepOutcome::Halt
            }
        }
    }

    async fn run_for_each(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut RunContext,
        node: &Node,
        config: Option<&ForEachConfig>,
    ) -> Result<StepOutcome, EngineError> {
        let Some(config) = config else {
            self.set_status(ctx, &node.id, NodeStatus::Failed);
            ctx.record_error(&node.id, "for-each node has no loop config".to_string());
            return Ok(StepOutcome::Halt);
        };

        self.set_status(ctx, &node.id, NodeStatus::Running);
        let items = match ctx
            .variables
            .get(&config.collection_variable)
            .and_then(Value::as_array)
        {
            Some(items) => items.clone(),
            None => {
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(
                    &node.id,
                    format!("variable '{}' is not a collection", config.collection_variable),
                );
                return Ok(StepOutcome::Halt);
            }
        };

        for (index, item) in items.iter().enumerate() {
            ctx.variables
                .insert(config.item_variable.clone(), item.clone());
            debug!(node = %node.id, index, "for-each iteration");

            for body_id in &config.body_node_ids {
                // Body nodes run in list order; a condition branch chain
                // runs to completion within the iteration.
                let mut cursor = Some(body_id.clone());
                while let Some(id) = cursor.take() {
                    if ctx.steps >= self.max_steps {
                        return Err(EngineError::StepLimitExceeded(self.max_steps));
                    }
                    ctx.steps += 1;

                    let Some(body) = definition.node(&id) else {
                        self.set_status(ctx, &node.id, NodeStatus::Failed);
                        ctx.record_error(&node.id, format!("unknown body node '{}'", id));
                        return Ok(StepOutcome::Halt);
                    };
                    match Box::pin(self.execute_node(definition, ctx, body)).await? {
                        StepOutcome::Goto(next) => cursor = Some(next),
                        StepOutcome::Continue => {}
                        StepOutcome::Halt => {
                            // First failure halts the remaining iterations.
                            self.set_status(ctx, &node.id, NodeStatus::Failed);
                            ctx.record_error(
                                &node.id,
                                format!("iteration {} failed at node '{}'", index, id),
                            );
                            return Ok(StepOutcome::Halt);
                        }
                        StepOutcome::Abort => {
                            self.set_status(ctx, &node.id, NodeStatus::Aborted);
                            return Ok(StepOutcome::Abort);
                        }
                    }
                }
            }
        }

        self.set_status(ctx, &node.id, NodeStatus::Completed);
        Ok(StepOutcome::Continue)
    }

    async fn run_sub_workflow(
        &self,
        ctx: &mut RunContext,
        node: &Node,
        config: Option<&SubWorkflowConfig>,
    ) -> Result<StepOutcome, EngineError> {
        let Some(config) = config else {
            self.set_status(ctx, &node.id, NodeStatus::Failed);
            ctx.record_error(&node.id, "sub-workflow node has no workflow id".to_string());
            return Ok(StepOutcome::Halt);
        };

        self.set_status(ctx, &node.id, NodeStatus::Running);
        let child = match self.store.load_workflow(&config.workflow_id).await {
            Ok(child) => child,
            Err(e) => {
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(&node.id, e.to_string());
                return Ok(StepOutcome::Halt);
            }
        };

        // The child scope is isolated: only the child's declared variables
        // are seeded from the parent, by name.
        let mut child_inputs = HashMap::new();
        for decl in &child.variables {
            if let Some(value) = ctx.variables.get(&decl.name) {
                child_inputs.insert(decl.name.clone(), value.clone());
            }
        }

        info!(node = %node.id, child = %child.name, "running sub-workflow");
        let result = match Box::pin(self.run(&child, child_inputs)).await {
            Ok(result) => result,
            Err(e) => {
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(&node.id, e.to_string());
                return Ok(StepOutcome::Halt);
            }
        };

        match result.status {
            RunStatus::Completed => {
                ctx.variables.insert(
                    node.id.clone(),
                    json!({
                        "output": {
                            "status": result.status,
                            "variables": result.variables,
                        }
                    }),
                );
                self.set_status(ctx, &node.id, NodeStatus::Completed);
                Ok(StepOutcome::Continue)
            }
            RunStatus::Failed => {
                self.set_status(ctx, &node.id, NodeStatus::Failed);
                ctx.record_error(
                    &node.id,
                    result
                        .error
                        .unwrap_or_else(|| "sub-workflow failed".to_string()),
                );
                Ok(StepOutcome::Halt)
            }
            RunStatus::Aborted => {
                self.set_status(ctx, &node.id, NodeStatus::Aborted);
                ctx.record_error(
                    &node.id,
                    result
                        .error
                        .unwrap_or_else(|| "sub-workflow aborted".to_string()),
                );
                Ok(StepOutcome::Abort)
            }
        }
    }

    async fn run_group(
        &self,
        definition: &WorkflowDefinition,
        ctx: &mut RunContext,
        group: &ParallelGroup,
    ) -> Result<StepOutcome, EngineError> {
        info!(group = %group.id, lanes = group.lane_node_ids.len(), "dispatching parallel group");
        self.emit(EngineEvent::GroupStarted {
            group_id: group.id.clone(),
            lanes: group.lane_node_ids.len(),
        });

        // Every lane runs on its own variables snapshot; in-flight sibling
        // writes stay invisible to branching decisions until the merge.
        let lane_futures: Vec<_> = group
            .lane_node_ids
            .iter()
            .map(|lane_id| self.run_lane(definition, lane_id.clone(), ctx.variables.clone()))
            .collect();
        let lane_runs = join_all(lane_futures).await;

        let mut results = Vec::with_capacity(lane_runs.len());
        for lane_run in lane_runs {
            for (id, state) in lane_run.node_states {
                let status = state.status;
                ctx.node_states.insert(id.clone(), state);
                self.emit(EngineEvent::NodeStatusChanged {
                    node_id: id,
                    status,
                });
            }
            results.push(lane_run.result);
        }

        let merged = match group.merge {
            MergeStrategy::Workspace => {
                let gate = ConflictGate::new(self.decisions.clone());
                let outcome = gate
                    .resolve(&results)
                    .await
                    .map_err(|e| EngineError::DecisionChannel(e.to_string()))?;
                self.emit(EngineEvent::GroupMerged {
                    group_id: group.id.clone(),
                    had_conflicts: outcome.had_conflicts,
                });
                if outcome.aborted {
                    warn!(group = %group.id, "conflict resolution aborted the run");
                    ctx.last_error = Some(format!(
                        "parallel group '{}' aborted at conflict resolution",
                        group.id
                    ));
                    return Ok(StepOutcome::Abort);
                }
                serde_json::to_value(&outcome).unwrap_or(Value::Null)
            }
            strategy => {
                let custom = self.custom_merges.get(&group.id).map(|f| f.as_ref());
                let value = merge::merge(strategy, &results, custom);
                self.emit(EngineEvent::GroupMerged {
                    group_id: group.id.clone(),
                    had_conflicts: false,
                });
                value
            }
        };

        ctx.variables
            .insert(group.id.clone(), json!({ "output": merged }));
        Ok(StepOutcome::Continue)
    }

    /// Execute one lane against a snapshot: the lane node, plus any
    /// condition branch chain it opens.
    async fn run_lane(
        &self,
        definition: &WorkflowDefinition,
        lane_id: String,
        snapshot: HashMap<String, Value>,
    ) -> LaneRun {
        let start = Instant::now();
        let mut lane_ctx = RunContext::empty(snapshot);
        let mut success = true;
        let mut error = None;

        let mut cursor = Some(lane_id.clone());
        while let Some(id) = cursor.take() {
            lane_ctx.steps += 1;
            if lane_ctx.steps > self.max_steps {
                success = false;
                error = Some(format!("lane '{}' exceeded traversal steps", lane_id));
                break;
            }
            let Some(node) = definition.node(&id) else {
                success = false;
                error = Some(format!("lane '{}' reached unknown node '{}'", lane_id, id));
                break;
            };
            match Box::pin(self.execute_node(definition, &mut lane_ctx, node)).await {
                Ok(StepOutcome::Goto(next)) => cursor = Some(next),
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Halt) | Ok(StepOutcome::Abort) => {
                    success = false;
                    error = lane_ctx.last_error.clone();
                }
                Err(e) => {
                    success = false;
                    error = Some(e.to_string());
                }
            }
        }

        // The lane's record (output plus filesChanged, when reported) is
        // the lane result's output value.
        let output = lane_ctx.variables.get(&lane_id).cloned();
        LaneRun {
            result: LaneResult {
                block_id: lane_id,
                success,
                output,
                error,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            node_states: lane_ctx.node_states,
        }
    }

    fn next_transition(
        &self,
        definition: &WorkflowDefinition,
        ctx: &RunContext,
        from: &str,
    ) -> Result<Option<String>, EngineError> {
        for transition in definition.outgoing(from) {
            let take = match &transition.condition {
                TransitionCondition::Always => true,
                TransitionCondition::Expression { expression } => {
                    expr::evaluate(expression, &ctx.variables).map_err(|e| {
                        EngineError::TransitionCondition {
                            id: transition.id.clone(),
                            source: e,
                        }
                    })?
                }
            };
            if take {
                debug!(from = %from, to = %transition.target, "taking transition");
                return Ok(Some(transition.target.clone()));
            }
        }
        Ok(None)
    }

    fn set_status(&self, ctx: &mut RunContext, node_id: &str, status: NodeStatus) {
        ctx.set_status(node_id, status);
        self.emit(EngineEvent::NodeStatusChanged {
            node_id: node_id.to_string(),
            status,
        });
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;

    #[tokio::test]
    async fn test_linear_run_completes() {
        let definition = WorkflowBuilder::new("linear")
            .agent("a")
            .agent("b")
            .transition("a", "b")
            .entry("a")
            .build()
            .unwrap();

        let result = Engine::mock().run(&definition, HashMap::new()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.status_of("a"), Some(NodeStatus::Completed));
        assert_eq!(result.status_of("b"), Some(NodeStatus::Completed));
        assert!(result.variable("a").is_some());
    }

    #[tokio::test]
    async fn test_validation_fails_before_execution() {
        let mut definition = WorkflowBuilder::new("broken")
            .agent("a")
            .entry("a")
            .build()
            .unwrap();
        definition.entry = "ghost".to_string();

        let err = Engine::mock()
            .run(&definition, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn test_required_variable_missing() {
        let definition = WorkflowBuilder::new("needs-input")
            .agent("a")
            .variable_decl(crate::definition::VariableDecl {
                name: "target".to_string(),
                var_type: crate::definition::VarType::String,
                required: true,
                default: None,
            })
            .entry("a")
            .build()
            .unwrap();

        let err = Engine::mock()
            .run(&definition, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingVariable(name) if name == "target"));
    }

    #[tokio::test]
    async fn test_condition_without_config_fails_node_only() {
        let definition = WorkflowBuilder::new("bare-condition")
            .node(crate::definition::Node {
                id: "check".to_string(),
                label: String::new(),
                config: NodeConfig::Condition { condition: None },
                position: Default::default(),
            })
            .agent("after")
            .transition("check", "after")
            .entry("check")
            .build()
            .unwrap();

        let result = Engine::mock().run(&definition, HashMap::new()).await.unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.status_of("check"), Some(NodeStatus::Failed));
        // Nothing downstream was scheduled.
        assert_eq!(result.status_of("after"), Some(NodeStatus::Pending));
    }

    #[tokio::test]
    async fn test_step_limit_trips_on_condition_loop() {
        let definition = WorkflowBuilder::new("loop")
            .condition("again", "true", "again", "again")
            .entry("again")
            .build()
            .unwrap();

        let err = Engine::mock()
            .with_max_steps(16)
            .run(&definition, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StepLimitExceeded(16)));
    }
}
