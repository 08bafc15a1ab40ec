pub mod commit;
pub mod encoded;
pub mod operations;

use std::collections::HashMap;

use fiber_trace_protocol::{FiberId, MessageId};
use thiserror::Error;

pub use commit::{CommitChangeParser, CommitData, CommitParseError, FiberChange, FiberSnapshot};
pub use operations::{DecodeError, decode_batch, decode_operations};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("operations: {0}")]
    Operations(#[from] DecodeError),
    #[error("commit: {0}")]
    Commit(#[from] CommitParseError),
}

/// What the decoder and the commit parser know about a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFiber {
    pub parent: Option<FiberId>,
    pub depth: u32,
    pub live: bool,
}

/// The parsers' view of which fibers exist, used to reject references to
/// fibers the producer never announced.
#[derive(Debug, Clone, Default)]
pub struct FiberView {
    fibers: HashMap<FiberId, KnownFiber>,
}

impl FiberView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FiberId) -> Option<KnownFiber> {
        self.fibers.get(&id).copied()
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Start a batch. Nothing is written back until [`StagedView::commit`].
    pub fn stage(&mut self) -> StagedView<'_> {
        StagedView {
            base: self,
            overlay: HashMap::new(),
        }
    }
}

/// Copy-on-write overlay over a [`FiberView`]. Dropping it discards the batch.
#[derive(Debug)]
pub struct StagedView<'a> {
    base: &'a mut FiberView,
    overlay: HashMap<FiberId, KnownFiber>,
}

impl StagedView<'_> {
    pub fn get(&self, id: FiberId) -> Option<KnownFiber> {
        self.overlay
            .get(&id)
            .copied()
            .or_else(|| self.base.get(id))
    }

    pub fn set(&mut self, id: FiberId, fiber: KnownFiber) {
        self.overlay.insert(id, fiber);
    }

    /// Depth a new child of `parent` gets (roots sit at 0).
    pub fn child_depth(&self, parent: Option<FiberId>) -> u32 {
        parent
            .and_then(|p| self.get(p))
            .map_or(0, |p| p.depth + 1)
    }

    /// Whether `ancestor` is `id` itself or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: FiberId, id: FiberId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|fiber| fiber.parent);
        }
        false
    }

    /// Move `id` under `parent` and recompute the depth of its subtree.
    ///
    /// The caller rejects moves under a descendant first (see
    /// [`is_ancestor`](Self::is_ancestor)).
    pub fn reparent(&mut self, id: FiberId, parent: FiberId) {
        let mut children: HashMap<FiberId, Vec<FiberId>> = HashMap::new();
        for (child, fiber) in self.entries() {
            if let Some(p) = fiber.parent {
                children.entry(p).or_default().push(child);
            }
        }

        let depth = self.child_depth(Some(parent));
        if let Some(known) = self.get(id) {
            self.set(
                id,
                KnownFiber {
                    parent: Some(parent),
                    depth,
                    ..known
                },
            );
        }
        let mut pending = vec![id];
        while let Some(node) = pending.pop() {
            let depth = self.child_depth(Some(node));
            for child in children.remove(&node).unwrap_or_default() {
                if let Some(known) = self.get(child) {
                    self.set(child, KnownFiber { depth, ..known });
                }
                pending.push(child);
            }
        }
    }

    fn entries(&self) -> impl Iterator<Item = (FiberId, KnownFiber)> + '_ {
        let staged = self.overlay.iter().map(|(id, fiber)| (*id, *fiber));
        let untouched = self
            .base
            .fibers
            .iter()
            .filter(|(id, _)| !self.overlay.contains_key(id))
            .map(|(id, fiber)| (*id, *fiber));
        staged.chain(untouched)
    }

    pub fn commit(self) {
        self.base.fibers.extend(self.overlay);
    }
}

/// Allocator for session-wide message ids. Ids start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSequence {
    next: MessageId,
}

impl MessageSequence {
    pub fn new() -> Self {
        Self { next: MessageId(1) }
    }

    pub fn take(&mut self) -> MessageId {
        let id = self.next;
        self.next = id.next();
        id
    }
}

impl Default for MessageSequence {
    fn default() -> Self {
        Self::new()
    }
}
