//! CLI-level tests: definition loading and a mock end-to-end run.

use std::collections::HashMap;
use std::io::Write;

use serde_json::json;
use tempfile::NamedTempFile;

use weft_cli::load_definition;
use weft_engine::{Engine, NodeStatus, RunStatus};

fn write_workflow(value: serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", value).unwrap();
    file
}

#[test]
fn load_definition_reads_a_full_document() {
    let file = write_workflow(json!({
        "id": "wf-1",
        "name": "review-pipeline",
        "entry": "plan",
        "nodes": [
            { "id": "plan", "config": { "kind": "agent", "prompt": "plan the work" } },
            {
                "id": "check",
                "config": {
                    "kind": "condition",
                    "condition": {
                        "expression": "plan.output",
                        "true_branch_node_id": "apply",
                        "false_branch_node_id": "stop"
                    }
                }
            },
            { "id": "apply", "config": { "kind": "agent" } },
            { "id": "stop", "config": { "kind": "agent" } }
        ],
        "transitions": [
            { "id": "t1", "source": "plan", "target": "check" }
        ],
        "variables": [
            { "name": "target", "var_type": "string", "default": "main" }
        ]
    }));

    let definition = load_definition(file.path()).unwrap();
    assert_eq!(definition.name, "review-pipeline");
    assert_eq!(definition.nodes.len(), 4);
    assert!(definition.validate().is_empty());
}

#[test]
fn load_definition_rejects_malformed_json() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(load_definition(file.path()).is_err());
}

#[tokio::test]
async fn loaded_workflow_runs_end_to_end_in_mock_mode() {
    let file = write_workflow(json!({
        "id": "wf-2",
        "name": "branchy",
        "entry": "plan",
        "nodes": [
            { "id": "plan", "config": { "kind": "agent" } },
            {
                "id": "check",
                "config": {
                    "kind": "condition",
                    "condition": {
                        "expression": "plan.output",
                        "true_branch_node_id": "apply",
                        "false_branch_node_id": "stop"
                    }
                }
            },
            { "id": "apply", "config": { "kind": "agent" } },
            { "id": "stop", "config": { "kind": "agent" } }
        ],
        "transitions": [
            { "id": "t1", "source": "plan", "target": "check" }
        ]
    }));

    let definition = load_definition(file.path()).unwrap();
    let result = Engine::mock().run(&definition, HashMap::new()).await.unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    // The mock runner produced plan.output, so the condition took the
    // true branch.
    assert_eq!(result.status_of("apply"), Some(NodeStatus::Completed));
    assert_eq!(result.status_of("stop"), Some(NodeStatus::Skipped));
}
