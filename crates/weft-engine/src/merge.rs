//! Lane merge strategies.
//!
//! Pure functions that combine the independent results of concurrently
//! executed lanes into one value. Inputs are never mutated.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Terminal record of one parallel lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneResult {
    /// Lane (block) node id.
    pub block_id: String,
    /// Whether the lane reached `completed`.
    pub success: bool,
    /// Arbitrary lane output; conventionally carries a `filesChanged`
    /// string array when the lane performs file-level work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message for unsuccessful lanes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Lane execution time in milliseconds.
    pub duration_ms: u64,
}

impl LaneResult {
    /// Create a successful lane result.
    pub fn success(block_id: impl Into<String>, output: Value) -> Self {
        Self {
            block_id: block_id.into(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms: 0,
        }
    }

    /// Create a failed lane result.
    pub fn failure(block_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms: 0,
        }
    }
}

/// Named policy for combining lane results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Concatenate,
    #[default]
    Workspace,
    Custom,
}

impl MergeStrategy {
    /// Parse a strategy name. Unknown names fall back to `concatenate`;
    /// this is the deliberate default, not an error path.
    pub fn from_name(name: &str) -> Self {
        match name {
            "workspace" => MergeStrategy::Workspace,
            "custom" => MergeStrategy::Custom,
            _ => MergeStrategy::Concatenate,
        }
    }
}

impl<'de> Deserialize<'de> for MergeStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(MergeStrategy::from_name(&name))
    }
}

/// Result of the `workspace` merge: the union of written files plus the
/// paths written by more than one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMerge {
    pub files: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Caller-supplied merge function for the `custom` strategy.
pub type CustomMergeFn = dyn Fn(&[LaneResult]) -> Value + Send + Sync;

/// Combine lane results under the given strategy.
pub fn merge(strategy: MergeStrategy, results: &[LaneResult], custom: Option<&CustomMergeFn>) -> Value {
    match strategy {
        MergeStrategy::Concatenate => concatenate(results),
        MergeStrategy::Workspace => {
            serde_json::to_value(workspace_merge(results)).unwrap_or(Value::Null)
        }
        MergeStrategy::Custom => match custom {
            Some(f) => f(results),
            // No function supplied: explicit pass-through of the results.
            None => serde_json::to_value(results).unwrap_or(Value::Null),
        },
    }
}

// Lane outputs in declared lane order, null standing in for lanes without
// output. No filtering, no reordering.
fn concatenate(results: &[LaneResult]) -> Value {
    Value::Array(
        results
            .iter()
            .map(|r| r.output.clone().unwrap_or(Value::Null))
            .collect(),
    )
}

/// Scan every lane's `filesChanged` list, keeping first-seen order and
/// recording paths written more than once. Lanes without a `filesChanged`
/// array contribute nothing; they are never an error.
pub fn workspace_merge(results: &[LaneResult]) -> WorkspaceMerge {
    let mut files: Vec<String> = Vec::new();
    let mut write_counts: HashMap<String, usize> = HashMap::new();

    for result in results {
        for path in files_changed(result) {
            let count = write_counts.entry(path.to_string()).or_insert(0);
            if *count == 0 {
                files.push(path.to_string());
            }
            *count += 1;
        }
    }

    let conflicts = files
        .iter()
        .filter(|path| write_counts.get(*path).copied().unwrap_or(0) > 1)
        .cloned()
        .collect();

    WorkspaceMerge { files, conflicts }
}

/// Paths a lane reported writing, empty when the output lacks a
/// `filesChanged` array.
pub(crate) fn files_changed(result: &LaneResult) -> impl Iterator<Item = &str> {
    result
        .output
        .as_ref()
        .and_then(|output| output.get("filesChanged"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lane(block_id: &str, files: &[&str]) -> LaneResult {
        LaneResult::success(block_id, json!({ "filesChanged": files }))
    }

    #[test]
    fn test_workspace_merge_detects_conflicts() {
        let results = vec![lane("b1", &["a.ts", "b.ts"]), lane("b2", &["b.ts", "c.ts"])];
        let merged = workspace_merge(&results);
        assert_eq!(merged.files, vec!["a.ts", "b.ts", "c.ts"]);
        assert_eq!(merged.conflicts, vec!["b.ts"]);
    }

    #[test]
    fn test_workspace_merge_ignores_lanes_without_files() {
        let results = vec![
            lane("b1", &["a.ts"]),
            LaneResult::success("b2", json!({ "note": "no files" })),
            LaneResult::success("b3", json!({ "filesChanged": "not-an-array" })),
            LaneResult::failure("b4", "boom"),
        ];
        let merged = workspace_merge(&results);
        assert_eq!(merged.files, vec!["a.ts"]);
        assert!(merged.conflicts.is_empty());
    }

    #[test]
    fn test_concatenate_preserves_lane_order_and_gaps() {
        let results = vec![
            LaneResult::success("b1", json!("first")),
            LaneResult::failure("b2", "boom"),
            LaneResult::success("b3", json!({ "n": 3 })),
        ];
        let merged = merge(MergeStrategy::Concatenate, &results, None);
        assert_eq!(merged, json!(["first", null, { "n": 3 }]));
    }

    #[test]
    fn test_concatenate_empty() {
        let merged = merge(MergeStrategy::Concatenate, &[], None);
        assert_eq!(merged, json!([]));
    }

    #[test]
    fn test_custom_with_function() {
        let results = vec![lane("b1", &["a.ts"]), lane("b2", &["b.ts"])];
        let merged = merge(
            MergeStrategy::Custom,
            &results,
            Some(&|lanes: &[LaneResult]| json!(lanes.len())),
        );
        assert_eq!(merged, json!(2));
    }

    #[test]
    fn test_custom_without_function_passes_through() {
        let results = vec![LaneResult::success("b1", json!("out"))];
        let merged = merge(MergeStrategy::Custom, &results, None);
        assert_eq!(merged, serde_json::to_value(&results).unwrap());
    }

    #[test]
    fn test_unknown_strategy_name_falls_back_to_concatenate() {
        assert_eq!(MergeStrategy::from_name("zip"), MergeStrategy::Concatenate);
        assert_eq!(MergeStrategy::from_name(""), MergeStrategy::Concatenate);
        assert_eq!(
            MergeStrategy::from_name("workspace"),
            MergeStrategy::Workspace
        );
        let parsed: MergeStrategy = serde_json::from_str("\"frobnicate\"").unwrap();
        assert_eq!(parsed, MergeStrategy::Concatenate);
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let results = vec![lane("b1", &["a.ts"]), lane("b2", &["a.ts"])];
        let before = results.clone();
        let first = workspace_merge(&results);
        let second = workspace_merge(&results);
        assert_eq!(first, second);
        assert_eq!(results, before);
    }
}
