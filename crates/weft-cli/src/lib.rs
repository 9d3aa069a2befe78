//! Command-line host for the weft workflow engine.
//!
//! Loads a workflow definition from JSON, runs it against the mock runner,
//! and answers the engine's decision requests (gate approvals, merge
//! conflicts) on stdin. Real agent backends integrate through the library
//! ports; this binary exists to exercise workflows end-to-end.

pub mod console;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

use weft_engine::{
    DecisionHub, Engine, MergeResolution, MockRunner, PendingDecision, WorkflowDefinition,
    ABORT_RESOLUTION,
};

#[derive(Parser)]
#[command(name = "weft", version, about = "Run declaratively-defined agent workflows")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow definition
    Run {
        /// Path to the workflow definition JSON
        workflow: PathBuf,
        /// Use the built-in mock runner for agent nodes
        #[arg(long)]
        mock: bool,
        /// Input variable as key=value (the value is parsed as JSON when
        /// possible, otherwise taken as a string)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// JSON object file with input variables
        #[arg(long)]
        inputs: Option<PathBuf>,
    },
    /// Validate a workflow definition without executing it
    Validate {
        /// Path to the workflow definition JSON
        workflow: PathBuf,
    },
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workflow,
            mock,
            vars,
            inputs,
        } => run_workflow(&workflow, mock, vars, inputs).await,
        Command::Validate { workflow } => validate_workflow(&workflow),
    }
}

/// Load a workflow definition from a JSON file.
pub fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a `key=value` input variable. Values that parse as JSON stay
/// typed; anything else becomes a string.
pub fn parse_var(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("--var expects key=value, got '{}'", raw))?;
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn collect_inputs(
    vars: Vec<String>,
    inputs: Option<PathBuf>,
) -> Result<HashMap<String, Value>> {
    let mut collected = HashMap::new();
    if let Some(path) = inputs {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let object: HashMap<String, Value> =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        collected.extend(object);
    }
    for raw in vars {
        let (key, value) = parse_var(&raw)?;
        collected.insert(key, value);
    }
    Ok(collected)
}

async fn run_workflow(
    path: &Path,
    mock: bool,
    vars: Vec<String>,
    inputs: Option<PathBuf>,
) -> Result<()> {
    let definition = load_definition(path)?;
    let inputs = collect_inputs(vars, inputs)?;

    if !mock {
        return Err(anyhow!(
            "no agent backend is configured in this build; pass --mock to preview the workflow"
        ));
    }

    info!(workflow = %definition.name, nodes = definition.nodes.len(), "loaded workflow");

    let hub = Arc::new(DecisionHub::new());
    let decider = tokio::spawn(answer_decisions(hub.receiver()));

    let engine = Engine::new(Arc::new(MockRunner), hub).with_mock_mode(true);
    let result = engine.run(&definition, inputs).await?;

    decider.abort();
    print!("{}", console::render_result(&definition, &result));

    if !result.is_success() {
        return Err(anyhow!(
            "workflow '{}' finished with status {:?}",
            definition.name,
            result.status
        ));
    }
    Ok(())
}

fn validate_workflow(path: &Path) -> Result<()> {
    let definition = load_definition(path)?;
    let errors = definition.validate();
    if errors.is_empty() {
        println!(
            "workflow '{}' is valid ({} nodes, {} transitions)",
            definition.name,
            definition.nodes.len(),
            definition.transitions.len()
        );
        Ok(())
    } else {
        for error in &errors {
            eprintln!("  {}", error);
        }
        Err(anyhow!(
            "workflow '{}' has {} validation error(s)",
            definition.name,
            errors.len()
        ))
    }
}

/// Answer the engine's pending decisions from stdin until the hub closes.
async fn answer_decisions(receiver: Arc<Mutex<mpsc::Receiver<PendingDecision>>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let pending = { receiver.lock().await.recv().await };
        let Some(pending) = pending else { break };
        match pending {
            PendingDecision::Approval { request, responder } => {
                print!("{}", console::format_gate_request(&request));
                let selected = read_gate_answer(&mut lines, &request.options).await;
                let _ = responder.send(selected);
            }
            PendingDecision::Conflicts {
                conflicts,
                responder,
            } => {
                print!("{}", console::format_conflicts(&conflicts));
                let resolutions = read_conflict_answers(&mut lines, &conflicts).await;
                let _ = responder.send(resolutions);
            }
        }
    }
}

async fn read_gate_answer(lines: &mut Lines<BufReader<Stdin>>, options: &[String]) -> String {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(option) = console::parse_gate_answer(&line, options) {
                    return option;
                }
                println!("unrecognized answer; options: {}", options.join(", "));
            }
            // stdin closed: treat as a rejection rather than hanging.
            _ => return options.last().cloned().unwrap_or_default(),
        }
    }
}

async fn read_conflict_answers(
    lines: &mut Lines<BufReader<Stdin>>,
    conflicts: &[weft_engine::MergeConflict],
) -> Vec<MergeResolution> {
    let mut resolutions = Vec::new();
    for conflict in conflicts {
        loop {
            println!(
                "{}: keep which block? [a={} / b={} / abort]",
                conflict.file_path, conflict.block_a_id, conflict.block_b_id
            );
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(keep) = console::parse_conflict_answer(&line, conflict) {
                        let aborting = keep == ABORT_RESOLUTION;
                        resolutions.push(MergeResolution {
                            file_path: conflict.file_path.clone(),
                            keep_block_id: keep,
                        });
                        if aborting {
                            return resolutions;
                        }
                        break;
                    }
                }
                _ => {
                    resolutions.push(MergeResolution {
                        file_path: conflict.file_path.clone(),
                        keep_block_id: ABORT_RESOLUTION.to_string(),
                    });
                    return resolutions;
                }
            }
        }
    }
    resolutions
}
