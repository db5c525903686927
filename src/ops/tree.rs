use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;

use crate::model::wbs::WbsNode;

/// Error type for hierarchy construction. Fatal: no partial tree is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("duplicate WBS id: {0}")]
    DuplicateId(String),
    #[error("WBS node {id} references missing parent {parent_id}")]
    DanglingParent { id: String, parent_id: String },
    #[error("WBS hierarchy contains a cycle through: {}", .ids.join(", "))]
    Cycle { ids: Vec<String> },
}

/// A validated WBS forest with recomputed levels
#[derive(Debug, Clone)]
pub struct WbsTree {
    /// All nodes, in input order
    nodes: IndexMap<String, WbsNode>,
    /// parent id → child ids, ordered by (sort_order, code)
    children: HashMap<String, Vec<String>>,
    /// Root ids, ordered by (sort_order, code)
    roots: Vec<String>,
}

/// Build a forest from flat WBS records.
///
/// Levels are recomputed from the roots (root = 0), replacing whatever the
/// records carried. Fails on duplicate ids, parents that do not exist, and
/// cycles.
pub fn build_tree(records: Vec<WbsNode>) -> Result<WbsTree, StructuralError> {
    let mut nodes: IndexMap<String, WbsNode> = IndexMap::with_capacity(records.len());
    for node in records {
        if nodes.contains_key(&node.id) {
            return Err(StructuralError::DuplicateId(node.id));
        }
        nodes.insert(node.id.clone(), node);
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots = Vec::new();
    for node in nodes.values() {
        match &node.parent_id {
            None => roots.push(node.id.clone()),
            Some(parent_id) => {
                if !nodes.contains_key(parent_id) {
                    return Err(StructuralError::DanglingParent {
                        id: node.id.clone(),
                        parent_id: parent_id.clone(),
                    });
                }
                children
                    .entry(parent_id.clone())
                    .or_default()
                    .push(node.id.clone());
            }
        }
    }

    let order_key = |id: &String| {
        let n = &nodes[id];
        (n.sort_order, n.code.clone())
    };
    roots.sort_by_key(order_key);
    for ids in children.values_mut() {
        ids.sort_by_key(order_key);
    }

    // Walk down from the roots; anything not reached sits on a cycle
    let mut levels: HashMap<String, u32> = HashMap::with_capacity(nodes.len());
    let mut queue: VecDeque<(String, u32)> = roots.iter().map(|id| (id.clone(), 0)).collect();
    while let Some((id, level)) = queue.pop_front() {
        if let Some(kids) = children.get(&id) {
            for kid in kids {
                queue.push_back((kid.clone(), level + 1));
            }
        }
        levels.insert(id, level);
    }

    if levels.len() != nodes.len() {
        let ids: Vec<String> = nodes
            .keys()
            .filter(|id| !levels.contains_key(*id))
            .cloned()
            .collect();
        tracing::warn!(count = ids.len(), "WBS hierarchy has a cycle");
        return Err(StructuralError::Cycle { ids });
    }

    for (id, node) in nodes.iter_mut() {
        node.level = levels[id];
    }

    tracing::debug!(nodes = nodes.len(), roots = roots.len(), "built WBS tree");
    Ok(WbsTree {
        nodes,
        children,
        roots,
    })
}

impl WbsTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&WbsNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes in input order
    pub fn nodes(&self) -> impl Iterator<Item = &WbsNode> {
        self.nodes.values()
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent(&self, id: &str) -> Option<&WbsNode> {
        self.get(id)
            .and_then(|n| n.parent_id.as_deref())
            .and_then(|p| self.get(p))
    }

    /// Ancestors from the immediate parent up to the root
    pub fn ancestors<'a>(&'a self, id: &str) -> Ancestors<'a> {
        Ancestors {
            tree: self,
            next: self.get(id).and_then(|n| n.parent_id.as_deref()),
        }
    }

    /// Whether `ancestor_id` lies anywhere on `id`'s parent chain
    pub fn is_ancestor(&self, ancestor_id: &str, id: &str) -> bool {
        self.ancestors(id).any(|n| n.id == ancestor_id)
    }

    /// All descendants of `id` in depth-first, child-order
    pub fn descendants(&self, id: &str) -> Vec<&WbsNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.children(id).iter().rev().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(node);
            }
            stack.extend(self.children(next).iter().rev().map(String::as_str));
        }
        out
    }

    /// Codes from the root down to `id` inclusive
    pub fn code_path(&self, id: &str) -> Vec<&str> {
        let mut path: Vec<&str> = self.ancestors(id).map(|n| n.code.as_str()).collect();
        path.reverse();
        if let Some(node) = self.get(id) {
            path.push(node.code.as_str());
        }
        path
    }

    /// Every node in depth-first order starting from the roots
    pub fn walk(&self) -> Vec<&WbsNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in &self.roots {
            if let Some(node) = self.get(root) {
                out.push(node);
                out.extend(self.descendants(root));
            }
        }
        out
    }
}

/// Iterator over a node's parent chain
pub struct Ancestors<'a> {
    tree: &'a WbsTree,
    next: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a WbsNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get(self.next?)?;
        self.next = node.parent_id.as_deref();
        Some(node)
    }
}
