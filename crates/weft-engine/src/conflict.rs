//! Conflict resolution gating for workspace merges.
//!
//! Runs the workspace merge to find overlapping file writes, surfaces the
//! conflicts to the host, suspends until resolutions arrive, and folds them
//! back into a resolved outcome.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decision::DecisionChannel;
use crate::merge::{files_changed, workspace_merge, LaneResult};

/// Sentinel `keep_block_id` that aborts the whole resolution.
pub const ABORT_RESOLUTION: &str = "abort";

/// The first two lanes observed writing the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub file_path: String,
    pub block_a_id: String,
    pub block_b_id: String,
}

/// Decision for one conflicting path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResolution {
    pub file_path: String,
    pub keep_block_id: String,
}

/// Outcome of running the conflict gate over a set of lane results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictOutcome {
    pub had_conflicts: bool,
    pub aborted: bool,
    /// Full union of written paths, including non-conflicting ones.
    pub resolved_files: Vec<String>,
    /// Conflicting path -> the lane whose write was kept.
    pub kept_blocks: HashMap<String, String>,
}

/// Orchestrates conflict detection against an external decision-maker.
pub struct ConflictGate {
    decisions: Arc<dyn DecisionChannel>,
}

impl ConflictGate {
    pub fn new(decisions: Arc<dyn DecisionChannel>) -> Self {
        Self { decisions }
    }

    /// Detect overlapping file writes across lanes and resolve them.
    ///
    /// The conflict-free path returns immediately without touching the
    /// decision channel.
    pub async fn resolve(&self, results: &[LaneResult]) -> Result<ConflictOutcome> {
        let merged = workspace_merge(results);

        if merged.conflicts.is_empty() {
            return Ok(ConflictOutcome {
                had_conflicts: false,
                aborted: false,
                resolved_files: merged.files,
                kept_blocks: HashMap::new(),
            });
        }

        let conflicts: Vec<MergeConflict> = merged
            .conflicts
            .iter()
            .map(|path| first_two_writers(results, path))
            .collect();

        info!(
            conflicts = conflicts.len(),
            lanes = results.len(),
            "overlapping file writes, requesting resolutions"
        );
        let resolutions = self.decisions.resolve_conflicts(conflicts).await?;

        // The first abort signal anywhere in the list wins.
        if let Some(resolution) = resolutions
            .iter()
            .find(|r| r.keep_block_id == ABORT_RESOLUTION)
        {
            warn!(file = %resolution.file_path, "abort resolution received");
            return Ok(ConflictOutcome {
                had_conflicts: true,
                aborted: true,
                resolved_files: Vec::new(),
                kept_blocks: HashMap::new(),
            });
        }

        debug!(resolutions = resolutions.len(), "folding resolutions");
        let kept_blocks = resolutions
            .into_iter()
            .map(|r| (r.file_path, r.keep_block_id))
            .collect();

        Ok(ConflictOutcome {
            had_conflicts: true,
            aborted: false,
            resolved_files: merged.files,
            kept_blocks,
        })
    }
}

// One conflict record per path, naming the first two writers in lane
// declaration order. A path written by three or more lanes still yields
// exactly one record.
fn first_two_writers(results: &[LaneResult], path: &str) -> MergeConflict {
    let mut writers = results
        .iter()
        .filter(|r| files_changed(r).any(|f| f == path));
    let first = writers.next();
    let second = writers.next().or(first);
    MergeConflict {
        file_path: path.to_string(),
        block_a_id: first.map(|r| r.block_id.clone()).unwrap_or_default(),
        block_b_id: second.map(|r| r.block_id.clone()).unwrap_or_default(),
    }
}
