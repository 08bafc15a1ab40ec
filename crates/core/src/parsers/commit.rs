use std::rc::Rc;

use fiber_trace_protocol::{
    CommitId, FiberEvent, FiberId, FiberInfo, FiberUpdate, Message, RendererId, Timing, Trigger,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{FiberView, KnownFiber, MessageSequence, StagedView};
use crate::bridge::dedup::SeenSet;

#[derive(Debug, Error, PartialEq)]
pub enum CommitParseError {
    #[error("commit {commit_id}: change for fiber {fiber_id} has neither a before nor an after state")]
    EmptyChange {
        commit_id: CommitId,
        fiber_id: FiberId,
    },
    #[error("commit {commit_id}: unknown fiber {fiber_id}")]
    UnknownFiber {
        commit_id: CommitId,
        fiber_id: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} references unknown parent {parent}")]
    UnknownParent {
        commit_id: CommitId,
        fiber_id: FiberId,
        parent: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} references unknown owner {owner}")]
    UnknownOwner {
        commit_id: CommitId,
        fiber_id: FiberId,
        owner: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} is already mounted")]
    DuplicateFiber {
        commit_id: CommitId,
        fiber_id: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} is not mounted")]
    NotMounted {
        commit_id: CommitId,
        fiber_id: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} lost its parent without unmounting")]
    ParentRemoved {
        commit_id: CommitId,
        fiber_id: FiberId,
    },
    #[error("commit {commit_id}: fiber {fiber_id} cannot move under its own descendant {parent}")]
    CyclicParent {
        commit_id: CommitId,
        fiber_id: FiberId,
        parent: FiberId,
    },
}

/// State of a fiber as observed on one side of a render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberSnapshot {
    pub display_name: String,
    #[serde(default)]
    pub parent_id: Option<FiberId>,
    #[serde(default)]
    pub owner_id: Option<FiberId>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub element_type: u32,
    /// Explicit depth; derived from the parent when absent.
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub actual_duration: f64,
    #[serde(default)]
    pub self_duration: f64,
}

/// One fiber state transition observed during a render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberChange {
    pub fiber_id: FiberId,
    #[serde(default)]
    pub before: Option<FiberSnapshot>,
    #[serde(default)]
    pub after: Option<FiberSnapshot>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Effects that fired for this fiber in the pass, by label.
    #[serde(default)]
    pub effects: Vec<String>,
}

/// Payload of a `commit` notification.
///
/// Changes are shared with the producer, which may hand the same object
/// over more than once.
#[derive(Debug, Clone)]
pub struct CommitData {
    pub renderer_id: RendererId,
    pub commit_id: CommitId,
    pub timestamp: f64,
    pub duration: f64,
    /// Causal chain that started the pass, outermost first.
    pub triggers: Vec<Trigger>,
    pub changes: Vec<Rc<FiberChange>>,
}

/// Turns commit notifications into messages, delivering each change object
/// at most once for the parser's lifetime.
#[derive(Debug, Default)]
pub struct CommitChangeParser {
    seen: SeenSet<FiberChange>,
    last_opened: Option<CommitId>,
}

impl CommitChangeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change objects currently tracked for deduplication.
    pub fn seen(&self) -> &SeenSet<FiberChange> {
        &self.seen
    }

    /// Parse one notification.
    ///
    /// All-or-nothing: on error the fiber view, the message sequence and the
    /// dedup set are left as they were.
    pub fn parse(
        &mut self,
        data: &CommitData,
        view: &mut FiberView,
        sequence: &mut MessageSequence,
    ) -> Result<Vec<Message>, CommitParseError> {
        let mut staged = view.stage();
        let mut ids = *sequence;
        let mut marked: Vec<&Rc<FiberChange>> = Vec::new();
        let mut messages = Vec::new();
        let opens_commit = self.last_opened.is_none_or(|last| data.commit_id > last);

        let result: Result<(), CommitParseError> = data.changes.iter().try_for_each(|change| {
            if !self.seen.insert(change) {
                tracing::trace!(
                    commit_id = %data.commit_id,
                    fiber_id = %change.fiber_id,
                    "skipping change delivered twice"
                );
                return Ok(());
            }
            marked.push(change);
            for (event, timing, triggers) in transitions(data, change, &mut staged)? {
                messages.push(Message {
                    id: ids.take(),
                    fiber_id: change.fiber_id,
                    commit_id: Some(data.commit_id),
                    triggers,
                    timing,
                    event,
                });
            }
            Ok(())
        });

        if let Err(err) = result {
            for change in marked {
                self.seen.remove(change);
            }
            return Err(err);
        }

        if opens_commit && let Some(first) = messages.first_mut() {
            let primary = data.triggers.first().cloned().unwrap_or_else(Trigger::forced);
            first.triggers.insert(0, primary);
            self.last_opened = Some(data.commit_id);
        }

        staged.commit();
        *sequence = ids;
        Ok(messages)
    }
}

type Transition = (FiberEvent, Option<Timing>, Vec<Trigger>);

fn check_references(
    data: &CommitData,
    fiber_id: FiberId,
    snapshot: &FiberSnapshot,
    view: &StagedView<'_>,
) -> Result<(), CommitParseError> {
    if let Some(parent) = snapshot.parent_id
        && view.get(parent).is_none()
    {
        return Err(CommitParseError::UnknownParent {
            commit_id: data.commit_id,
            fiber_id,
            parent,
        });
    }
    if let Some(owner) = snapshot.owner_id
        && view.get(owner).is_none()
    {
        return Err(CommitParseError::UnknownOwner {
            commit_id: data.commit_id,
            fiber_id,
            owner,
        });
    }
    Ok(())
}

/// Derive the messages for one change: the render transition first, then
/// one effect-trigger per fired effect.
fn transitions(
    data: &CommitData,
    change: &FiberChange,
    view: &mut StagedView<'_>,
) -> Result<Vec<Transition>, CommitParseError> {
    let fiber_id = change.fiber_id;
    let commit_id = data.commit_id;
    let mut out = Vec::new();

    match (&change.before, &change.after) {
        (None, None) => {
            return Err(CommitParseError::EmptyChange {
                commit_id,
                fiber_id,
            });
        }
        (None, Some(after)) => {
            if view.get(fiber_id).is_some() {
                return Err(CommitParseError::DuplicateFiber {
                    commit_id,
                    fiber_id,
                });
            }
            check_references(data, fiber_id, after, view)?;
            let depth = after
                .depth
                .unwrap_or_else(|| view.child_depth(after.parent_id));
            view.set(
                fiber_id,
                KnownFiber {
                    parent: after.parent_id,
                    depth,
                    live: true,
                },
            );
            out.push((
                FiberEvent::Mount {
                    fiber: FiberInfo {
                        parent_id: after.parent_id,
                        owner_id: after.owner_id,
                        display_name: after.display_name.clone(),
                        key: after.key.clone(),
                        element_type: after.element_type,
                        depth,
                    },
                },
                Some(Timing {
                    timestamp: data.timestamp,
                    duration: after.actual_duration,
                }),
                change.triggers.clone(),
            ));
        }
        (Some(_), None) => {
            let known = view
                .get(fiber_id)
                .ok_or(CommitParseError::UnknownFiber {
                    commit_id,
                    fiber_id,
                })?;
            if !known.live {
                return Err(CommitParseError::NotMounted {
                    commit_id,
                    fiber_id,
                });
            }
            view.set(
                fiber_id,
                KnownFiber {
                    live: false,
                    ..known
                },
            );
            out.push((FiberEvent::Unmount, None, change.triggers.clone()));
        }
        (Some(before), Some(after)) => {
            if view.get(fiber_id).is_none() {
                return Err(CommitParseError::UnknownFiber {
                    commit_id,
                    fiber_id,
                });
            }
            check_references(data, fiber_id, after, view)?;

            if before.owner_id != after.owner_id {
                out.push((
                    FiberEvent::OwnershipChange {
                        owner_id: after.owner_id,
                    },
                    None,
                    change.triggers.clone(),
                ));
            }

            let mut changes = FiberUpdate::default();
            if before.display_name != after.display_name {
                changes.display_name = Some(after.display_name.clone());
            }
            if before.parent_id != after.parent_id {
                let parent = after.parent_id.ok_or(CommitParseError::ParentRemoved {
                    commit_id,
                    fiber_id,
                })?;
                if view.is_ancestor(fiber_id, parent) {
                    return Err(CommitParseError::CyclicParent {
                        commit_id,
                        fiber_id,
                        parent,
                    });
                }
                changes.parent_id = Some(parent);
                view.reparent(fiber_id, parent);
            }
            if after.actual_duration > 0.0 {
                changes.duration = Some(after.actual_duration);
                changes.self_duration = Some(after.self_duration);
            }
            if !changes.is_empty() {
                let timing = changes.duration.map(|duration| Timing {
                    timestamp: data.timestamp,
                    duration,
                });
                out.push((
                    FiberEvent::Update { changes },
                    timing,
                    change.triggers.clone(),
                ));
            }
        }
    }

    if !change.effects.is_empty() && view.get(fiber_id).is_none() {
        return Err(CommitParseError::UnknownFiber {
            commit_id,
            fiber_id,
        });
    }
    out.extend(change.effects.iter().map(|effect| {
        (
            FiberEvent::EffectTrigger {
                effect: effect.clone(),
            },
            None,
            Vec::new(),
        )
    }));

    Ok(out)
}
