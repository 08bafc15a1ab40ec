use std::collections::HashSet;

use fiber_trace_protocol::FiberId;
use serde::{Deserialize, Serialize};

use super::fiber::FiberRecord;
use super::store::CommitStore;

/// Which axis a tree projection follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grouping {
    /// Structural nesting (host containers).
    Parent,
    /// Logical authorship (the component that created the node).
    Owner,
}

/// Whether unmounted fibers take part in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Liveness {
    Live,
    All,
}

impl Liveness {
    pub fn includes(self, record: &FiberRecord) -> bool {
        match self {
            Self::Live => !record.is_unmounted,
            Self::All => true,
        }
    }
}

/// A nested snapshot of one projection, detached from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: FiberId,
    pub display_name: String,
    pub depth: u32,
    pub is_unmounted: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Keep nodes whose name contains `query` (case-insensitive) and the
    /// ancestors leading to them.
    pub fn filter(&self, query: &str) -> Option<TreeNode> {
        let needle = query.to_lowercase();
        self.filter_lowercase(&needle)
    }

    fn filter_lowercase(&self, needle: &str) -> Option<TreeNode> {
        let children: Vec<TreeNode> = self
            .children
            .iter()
            .filter_map(|child| child.filter_lowercase(needle))
            .collect();
        let matches = self.display_name.to_lowercase().contains(needle);
        (matches || !children.is_empty()).then(|| TreeNode {
            children,
            ..self.shallow()
        })
    }

    fn shallow(&self) -> TreeNode {
        TreeNode {
            id: self.id,
            display_name: self.display_name.clone(),
            depth: self.depth,
            is_unmounted: self.is_unmounted,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

impl CommitStore {
    /// Build the nested tree for one projection.
    pub fn tree(&self, grouping: Grouping, liveness: Liveness) -> Vec<TreeNode> {
        let mut visited = HashSet::new();
        self.roots(grouping, liveness)
            .into_iter()
            .filter_map(|root| self.subtree(root, grouping, liveness, &mut visited))
            .collect()
    }

    fn subtree(
        &self,
        record: &FiberRecord,
        grouping: Grouping,
        liveness: Liveness,
        visited: &mut HashSet<FiberId>,
    ) -> Option<TreeNode> {
        if !visited.insert(record.id) {
            return None;
        }
        let children = self
            .child_ids(record.id, grouping)
            .iter()
            .filter_map(|id| self.fiber(*id).ok())
            .filter(|child| liveness.includes(child))
            .filter_map(|child| self.subtree(child, grouping, liveness, visited))
            .collect();
        Some(TreeNode {
            id: record.id,
            display_name: record.display_name.clone(),
            depth: record.depth,
            is_unmounted: record.is_unmounted,
            children,
        })
    }
}
