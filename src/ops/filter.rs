use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use crate::model::filter::FilterState;
use crate::model::row::MatrixRow;
use crate::ops::tree::WbsTree;

/// A `FilterState` with its search text compiled once
#[derive(Debug, Clone)]
pub struct RowFilter {
    state: FilterState,
    search: Option<Regex>,
}

impl RowFilter {
    /// Compile the predicates. Search text is matched literally, ignoring case.
    pub fn new(state: FilterState) -> Result<Self, regex::Error> {
        let search = match state.search.trim() {
            "" => None,
            text => Some(
                RegexBuilder::new(&regex::escape(text))
                    .case_insensitive(true)
                    .build()?,
            ),
        };
        Ok(RowFilter { state, search })
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Content predicates only. Summary rows always pass.
    pub fn matches(&self, row: &MatrixRow) -> bool {
        if row.is_summary() {
            return true;
        }
        let node = &row.node;
        let attrs = &node.attributes;

        if let Some(re) = &self.search {
            if !re.is_match(&node.code) && !re.is_match(&node.name) {
                return false;
            }
        }
        if !self.state.levels.is_empty() && !self.state.levels.contains(&node.level) {
            return false;
        }
        if !self.state.buildings.is_empty()
            && !attrs
                .building
                .as_ref()
                .is_some_and(|b| self.state.buildings.contains(b))
        {
            return false;
        }
        if !self.state.statuses.is_empty()
            && !attrs
                .status
                .as_ref()
                .is_some_and(|s| self.state.statuses.contains(s))
        {
            return false;
        }
        if !self.state.target_period.is_empty()
            && !attrs
                .target_kw
                .as_deref()
                .is_some_and(|t| t.contains(self.state.target_period.as_str()))
        {
            return false;
        }
        if self.state.progress_min.is_some_and(|min| row.progress_pct < min) {
            return false;
        }
        if self.state.progress_max.is_some_and(|max| row.progress_pct > max) {
            return false;
        }
        true
    }
}

/// True when any ancestor of `id`, at any depth, is collapsed
pub fn is_collapsed_away(tree: &WbsTree, collapsed: &HashSet<String>, id: &str) -> bool {
    if collapsed.is_empty() {
        return false;
    }
    tree.ancestors(id).any(|a| collapsed.contains(&a.id))
}

/// Rows left visible after collapse and the content predicates, in order
pub fn visible_rows<'a>(
    rows: &'a [MatrixRow],
    tree: &WbsTree,
    collapsed: &HashSet<String>,
    filter: &RowFilter,
) -> Vec<&'a MatrixRow> {
    rows.iter()
        .filter(|r| !is_collapsed_away(tree, collapsed, r.id()))
        .filter(|r| filter.matches(r))
        .collect()
}
