use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::wbs::WbsNode;
use crate::ops::tree::{StructuralError, build_tree};

/// Structured result from `cg check`, suitable for --json output.
#[derive(Debug, Default, Serialize)]
pub struct CheckResult {
    pub valid: bool,
    pub errors: Vec<CheckError>,
    pub warnings: Vec<CheckWarning>,
}

/// A problem that stops the grid from being built
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckError {
    DuplicateId { id: String, count: usize },
    DanglingParent { id: String, parent_id: String },
    Cycle { ids: Vec<String> },
}

/// Something the grid tolerates but a planner probably wants to fix
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckWarning {
    /// Leaf without quantity: progress is always 0
    ZeroQuantity { id: String, code: String },
    /// Summary node with nothing beneath it
    EmptySummary { id: String, code: String },
    /// Non-summary node with children; its own cells do not roll up
    LeafWithChildren { id: String, code: String },
    /// Stored non-zero level disagrees with the hierarchy (it is recomputed on load)
    StaleLevel { id: String, stored: u32, actual: u32 },
    /// Allocation for an id that is not in the WBS
    OrphanAllocation { item_id: String, date: NaiveDate },
    /// Allocation recorded against a summary node
    SummaryAllocation { item_id: String, date: NaiveDate },
}

/// Validate WBS records and the (item, date) keys of stored allocations.
///
/// Reports every duplicate and dangling parent rather than stopping at the
/// first. Cycles are only looked for once those are clean.
pub fn check_project(wbs: &[WbsNode], allocated: &[(String, NaiveDate)]) -> CheckResult {
    let mut result = CheckResult::default();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for node in wbs {
        *counts.entry(node.id.as_str()).or_default() += 1;
    }
    let mut reported = HashSet::new();
    for node in wbs {
        let count = counts[node.id.as_str()];
        if count > 1 && reported.insert(node.id.as_str()) {
            result.errors.push(CheckError::DuplicateId {
                id: node.id.clone(),
                count,
            });
        }
        if let Some(parent_id) = &node.parent_id
            && !counts.contains_key(parent_id.as_str())
        {
            result.errors.push(CheckError::DanglingParent {
                id: node.id.clone(),
                parent_id: parent_id.clone(),
            });
        }
    }

    if result.errors.is_empty() {
        match build_tree(wbs.to_vec()) {
            Ok(tree) => {
                for (stored, node) in wbs.iter().zip(tree.nodes()) {
                    check_node(stored, node, tree.children(&node.id).len(), &mut result);
                }
            }
            Err(StructuralError::Cycle { ids }) => {
                result.errors.push(CheckError::Cycle { ids });
            }
            // Duplicates and dangling parents were reported above
            Err(e) => tracing::debug!(error = %e, "structural error already reported"),
        }
    }

    let summaries: HashSet<&str> = wbs
        .iter()
        .filter(|n| n.is_summary)
        .map(|n| n.id.as_str())
        .collect();
    for (item_id, date) in allocated {
        if !counts.contains_key(item_id.as_str()) {
            result.warnings.push(CheckWarning::OrphanAllocation {
                item_id: item_id.clone(),
                date: *date,
            });
        } else if summaries.contains(item_id.as_str()) {
            result.warnings.push(CheckWarning::SummaryAllocation {
                item_id: item_id.clone(),
                date: *date,
            });
        }
    }

    result.valid = result.errors.is_empty();
    result
}

fn check_node(stored: &WbsNode, node: &WbsNode, children: usize, result: &mut CheckResult) {
    // Level 0 is what records without a level deserialize to
    if stored.level != 0 && stored.level != node.level {
        result.warnings.push(CheckWarning::StaleLevel {
            id: node.id.clone(),
            stored: stored.level,
            actual: node.level,
        });
    }
    if node.is_summary {
        if children == 0 {
            result.warnings.push(CheckWarning::EmptySummary {
                id: node.id.clone(),
                code: node.code.clone(),
            });
        }
        return;
    }
    if children > 0 {
        result.warnings.push(CheckWarning::LeafWithChildren {
            id: node.id.clone(),
            code: node.code.clone(),
        });
    }
    if node.quantity <= 0.0 {
        result.warnings.push(CheckWarning::ZeroQuantity {
            id: node.id.clone(),
            code: node.code.clone(),
        });
    }
}
