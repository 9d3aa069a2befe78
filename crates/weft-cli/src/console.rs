//! Console rendering and answer parsing for decision requests.

use weft_engine::{
    GateRequest, MergeConflict, NodeStatus, RunResult, WorkflowDefinition, ABORT_RESOLUTION,
};

const BOX_WIDTH: usize = 58;

/// Render a gate approval request as a boxed prompt.
pub fn format_gate_request(request: &GateRequest) -> String {
    let mut output = String::new();

    output.push_str(&format!("╭{}╮\n", "─".repeat(BOX_WIDTH)));
    output.push_str(&format!(
        "│ {:56} │\n",
        format!("Gate approval: {}", request.gate_id)
    ));
    output.push_str(&format!("├{}┤\n", "─".repeat(BOX_WIDTH)));
    output.push_str(&format!(
        "│ {:56} │\n",
        format!("Node: {}", request.node_id)
    ));

    if !request.prompt.is_empty() {
        output.push_str(&format!("├{}┤\n", "─".repeat(BOX_WIDTH)));
        for line in textwrap::wrap(&request.prompt, BOX_WIDTH - 4) {
            output.push_str(&format!("│ {:56} │\n", line));
        }
    }

    output.push_str(&format!("├{}┤\n", "─".repeat(BOX_WIDTH)));
    output.push_str(&format!(
        "│ {:56} │\n",
        format!("Options: {}", request.options.join(" | "))
    ));
    output.push_str(&format!("╰{}╯\n", "─".repeat(BOX_WIDTH)));

    output
}

/// Parse a gate answer into one of the offered options.
///
/// Accepts an option name (case-insensitive), a 1-based index, or the
/// shortcuts y/yes and n/no when approve/reject are offered.
pub fn parse_gate_answer(input: &str, options: &[String]) -> Option<String> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(option) = options.iter().find(|o| o.to_lowercase() == trimmed) {
        return Some(option.clone());
    }

    if let Ok(index) = trimmed.parse::<usize>() {
        if index >= 1 && index <= options.len() {
            return Some(options[index - 1].clone());
        }
    }

    let shortcut = match trimmed.as_str() {
        "y" | "yes" => "approve",
        "n" | "no" => "reject",
        _ => return None,
    };
    options.iter().find(|o| *o == shortcut).cloned()
}

/// Render the conflict list ahead of the per-file prompts.
pub fn format_conflicts(conflicts: &[MergeConflict]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} conflicting file write(s) between parallel lanes:\n",
        conflicts.len()
    ));
    for conflict in conflicts {
        output.push_str(&format!(
            "  {} (written by '{}' and '{}')\n",
            conflict.file_path, conflict.block_a_id, conflict.block_b_id
        ));
    }
    output
}

/// Parse a conflict answer into a kept block id or the abort sentinel.
pub fn parse_conflict_answer(input: &str, conflict: &MergeConflict) -> Option<String> {
    let trimmed = input.trim().to_lowercase();
    match trimmed.as_str() {
        "" => None,
        "abort" => Some(ABORT_RESOLUTION.to_string()),
        "a" => Some(conflict.block_a_id.clone()),
        "b" => Some(conflict.block_b_id.clone()),
        _ => {
            if trimmed == conflict.block_a_id.to_lowercase() {
                Some(conflict.block_a_id.clone())
            } else if trimmed == conflict.block_b_id.to_lowercase() {
                Some(conflict.block_b_id.clone())
            } else {
                None
            }
        }
    }
}

fn status_badge(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Pending => "pending",
        NodeStatus::Running => "running",
        NodeStatus::WaitingGate => "waiting_gate",
        NodeStatus::Completed => "completed",
        NodeStatus::Skipped => "skipped",
        NodeStatus::Failed => "failed",
        NodeStatus::Aborted => "aborted",
    }
}

/// Render the per-node trace and run summary.
pub fn render_result(definition: &WorkflowDefinition, result: &RunResult) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\nWorkflow '{}' finished: {:?}\n",
        definition.name, result.status
    ));
    if let Some(error) = &result.error {
        output.push_str(&format!("  error: {}\n", error));
    }

    output.push_str("\nNode trace:\n");
    for node in &definition.nodes {
        let Some(state) = result.node_states.get(&node.id) else {
            continue;
        };
        output.push_str(&format!(
            "  {:24} {:12}",
            node.id,
            status_badge(state.status)
        ));
        if let Some(error) = &state.error {
            output.push_str(&format!("  {}", error));
        }
        output.push('\n');
    }

    let mut names: Vec<&String> = result.variables.keys().collect();
    names.sort();
    output.push_str("\nVariables:\n");
    for name in names {
        output.push_str(&format!("  {} = {}\n", name, result.variables[name]));
    }

    output
}
