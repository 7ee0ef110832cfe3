//! The canonical tree and the merger that folds discovery results into it.
//!
//! The tree has a single writer. [`CanonicalTree::merge`] is a synchronous step: readers take an
//! [`Arc`] snapshot and keep it for the duration of one operation, so a correlation or dispatch pass
//! never observes a half-merged tree.

use std::sync::Arc;

use crate::node::TestNode;

/// Ids touched by one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// File subtrees that replaced an existing child in place.
    pub replaced: Vec<String>,
    /// File subtrees appended as new children.
    pub appended: Vec<String>,
}

impl MergeOutcome {
    /// Every id touched, in merge order.
    pub fn touched(&self) -> Vec<String> {
        self.replaced.iter().chain(&self.appended).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.replaced.is_empty() && self.appended.is_empty()
    }
}

/// Fold file subtrees into `root`'s children.
///
/// ## Parameters
/// - `root`: the tree to update.
/// - `subtrees`: freshly discovered file suites.
///
/// ## Returns
/// - (`MergeOutcome`): which ids were replaced and which were appended.
///
/// ## Notes
/// - A child with an equal id is replaced wholesale (children included) at its current position.
/// - Children absent from `subtrees` are left untouched; merging never deletes.
/// - Idempotent: merging the same subtree twice yields the same tree as merging it once.
pub fn merge(root: &mut TestNode, subtrees: Vec<TestNode>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    for subtree in subtrees {
        match root.children.iter_mut().find(|existing| existing.id == subtree.id) {
            Some(existing) => {
                outcome.replaced.push(subtree.id.clone());
                *existing = subtree;
            }
            None => {
                outcome.appended.push(subtree.id.clone());
                root.children.push(subtree);
            }
        }
    }
    outcome
}

/// Session-lifetime test tree, created empty and grown by discovery rounds.
#[derive(Debug, Clone)]
pub struct CanonicalTree {
    root: Arc<TestNode>,
}

impl Default for CanonicalTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalTree {
    /// An empty root suite.
    pub fn new() -> Self {
        Self {
            root: Arc::new(TestNode::root()),
        }
    }

    /// Immutable view of the current tree.
    pub fn snapshot(&self) -> Arc<TestNode> {
        Arc::clone(&self.root)
    }

    /// Merge discovered file subtrees (see [`merge`]).
    ///
    /// Outstanding snapshots keep seeing the tree as it was before this call.
    #[tracing::instrument(skip_all, fields(subtrees = subtrees.len()))]
    pub fn merge(&mut self, subtrees: Vec<TestNode>) -> MergeOutcome {
        let outcome = merge(Arc::make_mut(&mut self.root), subtrees);
        tracing::debug!(
            replaced = outcome.replaced.len(),
            appended = outcome.appended.len(),
            "merged discovery results"
        );
        outcome
    }
}
