use std::collections::{HashMap, HashSet};

use fiber_trace_protocol::{CommitId, FiberEvent, FiberId, FiberUpdate, Message, MessageId};
use thiserror::Error;

use super::commit::{Commit, CommitStats};
use super::fiber::FiberRecord;
use super::tree::{Grouping, Liveness};
use crate::config::StoreConfig;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("fiber {0} not found")]
    NotFound(FiberId),
    #[error("commit {0} not found")]
    CommitNotFound(CommitId),
    #[error("message {message}: unknown fiber {fiber}")]
    UnknownFiber { message: MessageId, fiber: FiberId },
    #[error("message {message}: fiber {fiber} references unknown parent {parent}")]
    UnknownParent {
        message: MessageId,
        fiber: FiberId,
        parent: FiberId,
    },
    #[error("message {message}: fiber {fiber} references unknown owner {owner}")]
    UnknownOwner {
        message: MessageId,
        fiber: FiberId,
        owner: FiberId,
    },
    #[error("message {message}: fiber {fiber} is already known")]
    DuplicateFiber { message: MessageId, fiber: FiberId },
    #[error("message {message}: fiber {child} is not a child of {fiber}")]
    NotAChild {
        message: MessageId,
        fiber: FiberId,
        child: FiberId,
    },
    #[error("message {message}: fiber {fiber} cannot move under its own descendant {parent}")]
    CyclicParent {
        message: MessageId,
        fiber: FiberId,
        parent: FiberId,
    },
}

/// Canonical fiber map and commit list, rebuilt from the published
/// message stream.
///
/// Fibers are kept after they unmount so history stays queryable. Two child
/// indexes (by parent and by owner) project the same flat map into the
/// structural and the authorship tree.
#[derive(Debug, Clone, Default)]
pub struct CommitStore {
    config: StoreConfig,
    fibers: HashMap<FiberId, FiberRecord>,
    by_parent: HashMap<FiberId, Vec<FiberId>>,
    by_owner: HashMap<FiberId, Vec<FiberId>>,
    commits: Vec<Commit>,
    commit_index: HashMap<CommitId, usize>,
    events: Vec<Message>,
    fiber_events: HashMap<FiberId, Vec<usize>>,
    last_applied: Option<MessageId>,
}

impl CommitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Apply a batch of messages in order and return how many were applied.
    ///
    /// Messages at or below the last applied id are skipped, so re-delivered
    /// batches are harmless. The batch is validated before anything is
    /// mutated: an invalid batch changes nothing.
    pub fn apply_events(&mut self, events: &[Message]) -> Result<usize, StoreError> {
        let mut last = self.last_applied;
        let pending: Vec<&Message> = events
            .iter()
            .filter(|message| {
                let fresh = last.is_none_or(|last| message.id > last);
                if fresh {
                    last = Some(message.id);
                }
                fresh
            })
            .collect();

        self.validate(&pending)?;
        for message in &pending {
            self.apply(message);
        }
        Ok(pending.len())
    }

    fn validate(&self, pending: &[&Message]) -> Result<(), StoreError> {
        let mut mounted: HashSet<FiberId> = HashSet::new();
        // Parent links as they stand at each point of the batch.
        let mut moved: HashMap<FiberId, Option<FiberId>> = HashMap::new();
        let parent_of = |id: FiberId, moved: &HashMap<FiberId, Option<FiberId>>| {
            moved
                .get(&id)
                .copied()
                .unwrap_or_else(|| self.fibers.get(&id).and_then(|record| record.parent_id))
        };
        let exists = |id: FiberId, mounted: &HashSet<FiberId>| {
            self.fibers.contains_key(&id) || mounted.contains(&id)
        };

        for message in pending {
            let fiber = message.fiber_id;
            let id = message.id;
            let unknown = |other: FiberId| StoreError::UnknownFiber {
                message: id,
                fiber: other,
            };

            if let FiberEvent::Mount { fiber: info } = &message.event {
                if exists(fiber, &mounted) {
                    return Err(StoreError::DuplicateFiber { message: id, fiber });
                }
                if let Some(parent) = info.parent_id
                    && !exists(parent, &mounted)
                {
                    return Err(StoreError::UnknownParent {
                        message: id,
                        fiber,
                        parent,
                    });
                }
                if let Some(owner) = info.owner_id
                    && !exists(owner, &mounted)
                {
                    return Err(StoreError::UnknownOwner {
                        message: id,
                        fiber,
                        owner,
                    });
                }
                mounted.insert(fiber);
                moved.insert(fiber, info.parent_id);
                continue;
            }

            if !exists(fiber, &mounted) {
                return Err(unknown(fiber));
            }
            match &message.event {
                FiberEvent::Update { changes } => {
                    if let Some(parent) = changes.parent_id {
                        if !exists(parent, &mounted) {
                            return Err(StoreError::UnknownParent {
                                message: id,
                                fiber,
                                parent,
                            });
                        }
                        let mut ancestor = Some(parent);
                        while let Some(node) = ancestor {
                            if node == fiber {
                                return Err(StoreError::CyclicParent {
                                    message: id,
                                    fiber,
                                    parent,
                                });
                            }
                            ancestor = parent_of(node, &moved);
                        }
                        moved.insert(fiber, Some(parent));
                    }
                    for child in changes.children.iter().flatten() {
                        if !exists(*child, &mounted) {
                            return Err(unknown(*child));
                        }
                        if parent_of(*child, &moved) != Some(fiber) {
                            return Err(StoreError::NotAChild {
                                message: id,
                                fiber,
                                child: *child,
                            });
                        }
                    }
                }
                FiberEvent::OwnershipChange {
                    owner_id: Some(owner),
                } if !exists(*owner, &mounted) => {
                    return Err(StoreError::UnknownOwner {
                        message: id,
                        fiber,
                        owner: *owner,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, message: &Message) {
        let id = message.fiber_id;
        match &message.event {
            FiberEvent::Mount { fiber } => {
                let mut record = FiberRecord::from_mount(id, fiber, message.commit_id);
                if let Some(timing) = message.timing {
                    record.timings.record(timing.duration, None);
                }
                self.fibers.insert(id, record);
                if let Some(parent) = fiber.parent_id {
                    self.attach_child(parent, id);
                }
                if let Some(owner) = fiber.owner_id {
                    self.by_owner.entry(owner).or_default().push(id);
                }
            }
            FiberEvent::Update { changes } => self.apply_update(id, changes),
            FiberEvent::Unmount => {
                let parent = self.fibers.get_mut(&id).and_then(|record| {
                    record.is_unmounted = true;
                    record.unmounted_in = message.commit_id;
                    record.parent_id
                });
                if let Some(parent) = parent.and_then(|p| self.fibers.get_mut(&p)) {
                    parent.children.retain(|child| *child != id);
                }
            }
            FiberEvent::OwnershipChange { owner_id } => {
                let previous = self.fibers.get_mut(&id).and_then(|record| {
                    std::mem::replace(&mut record.owner_id, *owner_id)
                });
                if let Some(previous) = previous
                    && let Some(owned) = self.by_owner.get_mut(&previous)
                {
                    owned.retain(|child| *child != id);
                }
                if let Some(owner) = owner_id {
                    self.by_owner.entry(*owner).or_default().push(id);
                }
            }
            FiberEvent::EffectTrigger { .. } => {}
        }

        self.fiber_events
            .entry(id)
            .or_default()
            .push(self.events.len());
        self.events.push(message.clone());

        if let Some(commit_id) = message.commit_id {
            match self.commit_index.get(&commit_id) {
                Some(&idx) => self.commits[idx].push(message),
                None => {
                    self.commit_index.insert(commit_id, self.commits.len());
                    self.commits.push(Commit::open(commit_id, message));
                }
            }
        }
        self.last_applied = Some(message.id);
    }

    fn apply_update(&mut self, id: FiberId, changes: &FiberUpdate) {
        if let Some(new_parent) = changes.parent_id {
            let old_parent = self.fibers.get(&id).and_then(|r| r.parent_id);
            if old_parent != Some(new_parent) {
                if let Some(old) = old_parent {
                    self.detach_child(old, id);
                }
                self.attach_child(new_parent, id);
                if let Some(record) = self.fibers.get_mut(&id) {
                    record.parent_id = Some(new_parent);
                }
                self.update_depths(id);
            }
        }

        if let Some(order) = &changes.children {
            let indexed = self.by_parent.entry(id).or_default();
            let mut reordered: Vec<FiberId> = order
                .iter()
                .copied()
                .filter(|child| indexed.contains(child))
                .collect();
            reordered.extend(indexed.iter().copied().filter(|c| !order.contains(c)));
            *indexed = reordered;

            let live: Vec<FiberId> = indexed
                .iter()
                .copied()
                .filter(|child| self.fibers.get(child).is_some_and(|c| !c.is_unmounted))
                .collect();
            if let Some(record) = self.fibers.get_mut(&id) {
                record.children = live;
            }
        }

        if let Some(record) = self.fibers.get_mut(&id) {
            if let Some(name) = &changes.display_name {
                record.display_name.clone_from(name);
            }
            if let Some(duration) = changes.duration {
                record.timings.record(duration, changes.self_duration);
            }
        }
    }

    /// Recompute depths below `id` after it moved.
    fn update_depths(&mut self, id: FiberId) {
        let mut pending = vec![id];
        while let Some(node) = pending.pop() {
            let depth = self
                .fibers
                .get(&node)
                .and_then(|record| record.parent_id)
                .and_then(|parent| self.fibers.get(&parent))
                .map_or(0, |parent| parent.depth + 1);
            if let Some(record) = self.fibers.get_mut(&node) {
                record.depth = depth;
            }
            pending.extend(self.child_ids(node, Grouping::Parent));
        }
    }

    fn attach_child(&mut self, parent: FiberId, child: FiberId) {
        self.by_parent.entry(parent).or_default().push(child);
        let live = self.fibers.get(&child).is_some_and(|c| !c.is_unmounted);
        if live && let Some(record) = self.fibers.get_mut(&parent) {
            record.children.push(child);
        }
    }

    fn detach_child(&mut self, parent: FiberId, child: FiberId) {
        if let Some(indexed) = self.by_parent.get_mut(&parent) {
            indexed.retain(|c| *c != child);
        }
        if let Some(record) = self.fibers.get_mut(&parent) {
            record.children.retain(|c| *c != child);
        }
    }

    /// Look up a fiber, live or unmounted.
    pub fn fiber(&self, id: FiberId) -> Result<&FiberRecord, StoreError> {
        self.fibers.get(&id).ok_or(StoreError::NotFound(id))
    }

    pub fn fibers(&self) -> impl Iterator<Item = &FiberRecord> {
        self.fibers.values()
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Children of `id` in one of the two tree projections.
    pub fn children(
        &self,
        id: FiberId,
        grouping: Grouping,
        liveness: Liveness,
    ) -> Result<Vec<&FiberRecord>, StoreError> {
        self.fiber(id)?;
        Ok(self
            .child_ids(id, grouping)
            .iter()
            .filter_map(|child| self.fibers.get(child))
            .filter(|record| liveness.includes(record))
            .collect())
    }

    pub(crate) fn child_ids(&self, id: FiberId, grouping: Grouping) -> &[FiberId] {
        let index = match grouping {
            Grouping::Parent => &self.by_parent,
            Grouping::Owner => &self.by_owner,
        };
        index.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Top-level fibers of a projection, in id order.
    pub fn roots(&self, grouping: Grouping, liveness: Liveness) -> Vec<&FiberRecord> {
        let mut roots: Vec<&FiberRecord> = self
            .fibers
            .values()
            .filter(|record| match grouping {
                Grouping::Parent => record.parent_id.is_none(),
                Grouping::Owner => record.owner_id.is_none(),
            })
            .filter(|record| liveness.includes(record))
            .collect();
        roots.sort_by_key(|record| record.id);
        roots
    }

    /// Every applied event that touched `id`, oldest first.
    pub fn fiber_events(&self, id: FiberId) -> Result<Vec<&Message>, StoreError> {
        self.fiber(id)?;
        Ok(self
            .fiber_events
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&idx| &self.events[idx])
            .collect())
    }

    /// Every applied event, in application order.
    pub fn events(&self) -> &[Message] {
        &self.events
    }

    pub fn last_applied(&self) -> Option<MessageId> {
        self.last_applied
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn commit(&self, id: CommitId) -> Result<&Commit, StoreError> {
        self.commit_index
            .get(&id)
            .map(|&idx| &self.commits[idx])
            .ok_or(StoreError::CommitNotFound(id))
    }

    /// The last `window` commits, oldest first.
    pub fn recent_commits(&self, window: usize) -> &[Commit] {
        &self.commits[self.commits.len().saturating_sub(window)..]
    }

    /// The trailing commit window from the store configuration.
    pub fn recent(&self) -> &[Commit] {
        self.recent_commits(self.config.commit_window)
    }

    pub fn commit_stats(&self, id: CommitId) -> Result<CommitStats, StoreError> {
        self.commit(id).map(Commit::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiber_trace_protocol::{FiberInfo, MessageOp, Timing, Trigger, TriggerKind};

    fn mount(id: u64, fiber: u64, parent: Option<u64>, commit: Option<u64>) -> Message {
        Message {
            id: MessageId(id),
            fiber_id: FiberId(fiber),
            commit_id: commit.map(CommitId),
            triggers: Vec::new(),
            timing: None,
            event: FiberEvent::Mount {
                fiber: FiberInfo {
                    parent_id: parent.map(FiberId),
                    owner_id: parent.map(FiberId),
                    display_name: format!("Fiber{fiber}"),
                    key: None,
                    element_type: 5,
                    depth: if parent.is_some() { 1 } else { 0 },
                },
            },
        }
    }

    fn event(id: u64, fiber: u64, commit: Option<u64>, event: FiberEvent) -> Message {
        Message {
            id: MessageId(id),
            fiber_id: FiberId(fiber),
            commit_id: commit.map(CommitId),
            triggers: Vec::new(),
            timing: None,
            event,
        }
    }

    fn ids(records: &[&FiberRecord]) -> Vec<u64> {
        records.iter().map(|r| r.id.get()).collect()
    }

    #[test]
    fn mount_then_fetch() {
        let mut store = CommitStore::new();
        store.apply_events(&[mount(1, 1, None, None)]).unwrap();
        let root = store.fiber(FiberId(1)).unwrap();
        assert_eq!(root.display_name, "Fiber1");
        assert!(!root.is_unmounted);
        assert_eq!(root.depth, 0);
        assert!(root.is_root());
    }

    #[test]
    fn missing_fiber_is_not_found() {
        let store = CommitStore::new();
        assert_eq!(
            store.fiber(FiberId(3)),
            Err(StoreError::NotFound(FiberId(3)))
        );
        assert!(store.children(FiberId(3), Grouping::Parent, Liveness::All).is_err());
    }

    #[test]
    fn unmount_keeps_history() {
        let mut store = CommitStore::new();
        store
            .apply_events(&[
                mount(1, 1, None, Some(1)),
                mount(2, 5, Some(1), Some(1)),
                event(3, 5, Some(2), FiberEvent::Unmount),
            ])
            .unwrap();

        let gone = store.fiber(FiberId(5)).unwrap();
        assert!(gone.is_unmounted);
        assert_eq!(gone.mounted_in, Some(CommitId(1)));
        assert_eq!(gone.unmounted_in, Some(CommitId(2)));

        let live = store
            .children(FiberId(1), Grouping::Parent, Liveness::Live)
            .unwrap();
        assert!(live.is_empty());
        let all = store
            .children(FiberId(1), Grouping::Parent, Liveness::All)
            .unwrap();
        assert_eq!(ids(&all), vec![5]);
        assert!(store.fiber(FiberId(1)).unwrap().children.is_empty());
        assert_eq!(store.fiber_events(FiberId(5)).unwrap().len(), 2);
    }

    #[test]
    fn parent_and_owner_projections_differ() {
        let mut store = CommitStore::new();
        let mut portal = mount(4, 4, Some(2), None);
        if let FiberEvent::Mount { fiber } = &mut portal.event {
            fiber.owner_id = Some(FiberId(3));
        }
        store
            .apply_events(&[
                mount(1, 1, None, None),
                mount(2, 2, Some(1), None),
                mount(3, 3, Some(1), None),
                portal,
            ])
            .unwrap();

        let by_parent = store
            .children(FiberId(2), Grouping::Parent, Liveness::Live)
            .unwrap();
        assert_eq!(ids(&by_parent), vec![4]);
        let by_owner = store
            .children(FiberId(2), Grouping::Owner, Liveness::Live)
            .unwrap();
        assert!(by_owner.is_empty());
        let owned = store
            .children(FiberId(3), Grouping::Owner, Liveness::Live)
            .unwrap();
        assert_eq!(ids(&owned), vec![4]);
    }

    #[test]
    fn invalid_batch_applies_nothing() {
        let mut store = CommitStore::new();
        let err = store
            .apply_events(&[mount(1, 1, None, Some(1)), mount(2, 3, Some(2), Some(1))])
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::UnknownParent {
                message: MessageId(2),
                fiber: FiberId(3),
                parent: FiberId(2),
            }
        );
        assert!(store.is_empty());
        assert!(store.commits().is_empty());
        assert_eq!(store.last_applied(), None);
    }

    #[test]
    fn redelivery_is_skipped() {
        let mut store = CommitStore::new();
        let batch = vec![mount(1, 1, None, Some(1)), mount(2, 2, Some(1), Some(1))];
        assert_eq!(store.apply_events(&batch).unwrap(), 2);
        assert_eq!(store.apply_events(&batch).unwrap(), 0);
        assert_eq!(store.commit(CommitId(1)).unwrap().events.len(), 2);
    }

    #[test]
    fn updates_reorder_reparent_and_time() {
        let mut store = CommitStore::new();
        store
            .apply_events(&[
                mount(1, 1, None, None),
                mount(2, 2, Some(1), None),
                mount(3, 3, Some(1), None),
                mount(4, 4, Some(2), None),
            ])
            .unwrap();
        store
            .apply_events(&[
                event(
                    5,
                    1,
                    None,
                    FiberEvent::Update {
                        changes: FiberUpdate {
                            children: Some(vec![FiberId(3), FiberId(2)]),
                            ..FiberUpdate::default()
                        },
                    },
                ),
                event(
                    6,
                    4,
                    Some(1),
                    FiberEvent::Update {
                        changes: FiberUpdate {
                            parent_id: Some(FiberId(3)),
                            display_name: Some("Moved".into()),
                            duration: Some(2.5),
                            self_duration: Some(1.0),
                            ..FiberUpdate::default()
                        },
                    },
                ),
            ])
            .unwrap();

        assert_eq!(
            store.fiber(FiberId(1)).unwrap().children,
            vec![FiberId(3), FiberId(2)]
        );
        let moved = store.fiber(FiberId(4)).unwrap();
        assert_eq!(moved.parent_id, Some(FiberId(3)));
        assert_eq!(moved.display_name, "Moved");
        assert_eq!(moved.timings.last_duration(), Some(2.5));
        assert!(store.fiber(FiberId(2)).unwrap().children.is_empty());
        assert_eq!(store.fiber(FiberId(3)).unwrap().children, vec![FiberId(4)]);
    }

    #[test]
    fn ownership_change_reindexes() {
        let mut store = CommitStore::new();
        store
            .apply_events(&[
                mount(1, 1, None, None),
                mount(2, 2, Some(1), None),
                mount(3, 3, Some(1), None),
                event(
                    4,
                    3,
                    Some(1),
                    FiberEvent::OwnershipChange {
                        owner_id: Some(FiberId(2)),
                    },
                ),
            ])
            .unwrap();
        let owned = store
            .children(FiberId(2), Grouping::Owner, Liveness::All)
            .unwrap();
        assert_eq!(ids(&owned), vec![3]);
        let owned_by_root = store
            .children(FiberId(1), Grouping::Owner, Liveness::All)
            .unwrap();
        assert_eq!(ids(&owned_by_root), vec![2]);
    }

    #[test]
    fn commits_window_and_stats() {
        let mut store = CommitStore::with_config(StoreConfig { commit_window: 2 });
        let mut opening = mount(1, 1, None, Some(1));
        opening.triggers = vec![Trigger::new("click", TriggerKind::State)];
        opening.timing = Some(Timing {
            timestamp: 5.0,
            duration: 1.0,
        });
        store
            .apply_events(&[
                opening,
                mount(2, 2, Some(1), Some(1)),
                event(3, 2, Some(2), FiberEvent::Unmount),
                event(
                    4,
                    1,
                    Some(3),
                    FiberEvent::EffectTrigger {
                        effect: "useEffect".into(),
                    },
                ),
            ])
            .unwrap();

        assert_eq!(store.commits().len(), 3);
        let recent: Vec<u64> = store.recent().iter().map(|c| c.commit_id.get()).collect();
        assert_eq!(recent, vec![2, 3]);
        assert_eq!(store.recent_commits(10).len(), 3);

        let stats = store.commit_stats(CommitId(1)).unwrap();
        assert_eq!(stats.count(MessageOp::Mount), 2);
        assert_eq!(stats.trigger.map(|t| t.event), Some("click".to_string()));
        let first = store.commit(CommitId(1)).unwrap();
        assert_eq!(first.start.timestamp, Some(5.0));
        assert_eq!(
            store.commit_stats(CommitId(9)),
            Err(StoreError::CommitNotFound(CommitId(9)))
        );
    }

    fn reparent(id: u64, fiber: u64, parent: u64) -> Message {
        event(
            id,
            fiber,
            None,
            FiberEvent::Update {
                changes: FiberUpdate {
                    parent_id: Some(FiberId(parent)),
                    ..FiberUpdate::default()
                },
            },
        )
    }

    fn reorder(id: u64, fiber: u64, children: &[u64]) -> Message {
        event(
            id,
            fiber,
            None,
            FiberEvent::Update {
                changes: FiberUpdate {
                    children: Some(children.iter().copied().map(FiberId).collect()),
                    ..FiberUpdate::default()
                },
            },
        )
    }

    /// 1 <- 2 <- 3 and 1 <- 4 <- 5, with depths as the decoder reports them.
    fn two_branches() -> CommitStore {
        let mut store = CommitStore::new();
        let leaf = |id: u64, fiber: u64, parent: u64| {
            let mut message = mount(id, fiber, Some(parent), None);
            if let FiberEvent::Mount { fiber } = &mut message.event {
                fiber.depth = 2;
            }
            message
        };
        let batch = vec![
            mount(1, 1, None, None),
            mount(2, 2, Some(1), None),
            leaf(3, 3, 2),
            mount(4, 4, Some(1), None),
            leaf(5, 5, 4),
        ];
        store.apply_events(&batch).expect("failed to mount two branches");
        store
    }

    #[test]
    fn reparent_moves_descendant_depths() {
        let mut store = two_branches();
        store
            .apply_events(&[reparent(6, 2, 5)])
            .expect("failed to reparent");

        let depth = |id| store.fiber(FiberId(id)).map(|record| record.depth);
        assert_eq!(depth(2), Ok(3));
        assert_eq!(depth(3), Ok(4));
        assert_eq!(depth(4), Ok(1));
        assert_eq!(
            store.fiber(FiberId(5)).map(|record| record.children.clone()),
            Ok(vec![FiberId(2)])
        );
        assert!(store.fiber(FiberId(1)).is_ok_and(|root| root.children == vec![FiberId(4)]));
    }

    #[test]
    fn reparent_under_descendant_is_rejected() {
        let mut store = two_branches();
        assert_eq!(
            store.apply_events(&[reparent(6, 2, 3)]),
            Err(StoreError::CyclicParent {
                message: MessageId(6),
                fiber: FiberId(2),
                parent: FiberId(3),
            })
        );
        // A move earlier in the same batch counts.
        assert_eq!(
            store.apply_events(&[reparent(6, 4, 3), reparent(7, 2, 5)]),
            Err(StoreError::CyclicParent {
                message: MessageId(7),
                fiber: FiberId(2),
                parent: FiberId(5),
            })
        );
        assert_eq!(store.last_applied(), Some(MessageId(5)));
    }

    #[test]
    fn reorder_of_a_non_child_is_rejected() {
        let mut store = two_branches();
        assert_eq!(
            store.apply_events(&[reorder(6, 1, &[3, 2])]),
            Err(StoreError::NotAChild {
                message: MessageId(6),
                fiber: FiberId(1),
                child: FiberId(3),
            })
        );
        assert!(store.fiber(FiberId(1)).is_ok_and(|root| root.children.len() == 2));
    }

    #[test]
    fn reorder_keeps_unlisted_children_and_skips_unmounted() {
        let mut store = two_branches();
        store
            .apply_events(&[
                mount(6, 6, Some(1), None),
                event(7, 2, None, FiberEvent::Unmount),
                reorder(8, 1, &[6, 2]),
            ])
            .expect("failed to reorder");
        let root = store.fiber(FiberId(1)).expect("root should exist");
        assert_eq!(root.children, vec![FiberId(6), FiberId(4)]);
        let all = store
            .children(FiberId(1), Grouping::Parent, Liveness::All)
            .expect("root should exist");
        assert_eq!(ids(&all), vec![6, 2, 4]);
    }
}
