use std::borrow::Cow;

use fiber_trace_protocol::{
    FiberEvent, FiberId, FiberInfo, FiberUpdate, Message, OperationsBatch, OperationsPayload,
    RawOperation, RendererId,
};
use thiserror::Error;

use super::encoded;
use super::{FiberView, KnownFiber, MessageSequence, StagedView};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("truncated batch at word {offset}: expected {expected}")]
    Truncated {
        offset: usize,
        expected: &'static str,
    },
    #[error("negative value {value} at word {offset}")]
    NegativeValue { offset: usize, value: i64 },
    #[error("invalid code point {value} at word {offset}")]
    InvalidCodePoint { offset: usize, value: i64 },
    #[error("unknown string id {id} at word {offset}")]
    UnknownStringId { offset: usize, id: u64 },
    #[error("unknown operation code {code} at word {offset}")]
    UnknownOpcode { offset: usize, code: i64 },
    #[error("batch encoded for renderer {found}, delivered for renderer {expected}")]
    RendererMismatch {
        expected: RendererId,
        found: RendererId,
    },
    #[error("operation {index}: unknown fiber {id}")]
    UnknownFiber { index: usize, id: FiberId },
    #[error("operation {index}: fiber {id} references unknown parent {parent}")]
    UnknownParent {
        index: usize,
        id: FiberId,
        parent: FiberId,
    },
    #[error("operation {index}: fiber {id} references unknown owner {owner}")]
    UnknownOwner {
        index: usize,
        id: FiberId,
        owner: FiberId,
    },
    #[error("operation {index}: fiber {id} was already added")]
    DuplicateFiber { index: usize, id: FiberId },
    #[error("operation {index}: fiber {id} cannot be reparented to no parent")]
    InvalidReparent { index: usize, id: FiberId },
    #[error("operation {index}: fiber {id} cannot move under its own descendant {parent}")]
    CyclicReparent {
        index: usize,
        id: FiberId,
        parent: FiberId,
    },
    #[error("operation {index}: fiber {child} is not a child of {id}")]
    NotAChild {
        index: usize,
        id: FiberId,
        child: FiberId,
    },
}

fn require(
    view: &StagedView<'_>,
    index: usize,
    id: FiberId,
) -> Result<KnownFiber, DecodeError> {
    view.get(id).ok_or(DecodeError::UnknownFiber { index, id })
}

/// Decode a single record against the staged view. Returns `None` for
/// records with no observable effect.
fn decode_record(
    index: usize,
    record: &RawOperation,
    view: &mut StagedView<'_>,
) -> Result<Option<(FiberId, FiberEvent)>, DecodeError> {
    let decoded = match record {
        RawOperation::Add {
            id,
            parent_id,
            owner_id,
            depth,
            name,
            key,
            element_type,
        } => {
            if view.get(*id).is_some() {
                return Err(DecodeError::DuplicateFiber { index, id: *id });
            }
            let parent = FiberId::from_wire(*parent_id);
            let owner = FiberId::from_wire(*owner_id);
            if let Some(parent) = parent
                && view.get(parent).is_none()
            {
                return Err(DecodeError::UnknownParent {
                    index,
                    id: *id,
                    parent,
                });
            }
            if let Some(owner) = owner
                && view.get(owner).is_none()
            {
                return Err(DecodeError::UnknownOwner {
                    index,
                    id: *id,
                    owner,
                });
            }
            let depth = depth.unwrap_or_else(|| view.child_depth(parent));
            view.set(
                *id,
                KnownFiber {
                    parent,
                    depth,
                    live: true,
                },
            );
            Some((
                *id,
                FiberEvent::Mount {
                    fiber: FiberInfo {
                        parent_id: parent,
                        owner_id: owner,
                        display_name: name.clone(),
                        key: key.clone(),
                        element_type: *element_type,
                        depth,
                    },
                },
            ))
        }
        RawOperation::Update {
            id,
            name,
            duration,
            self_duration,
        } => {
            require(view, index, *id)?;
            let changes = FiberUpdate {
                display_name: name.clone(),
                duration: *duration,
                self_duration: *self_duration,
                ..FiberUpdate::default()
            };
            (!changes.is_empty()).then_some((*id, FiberEvent::Update { changes }))
        }
        RawOperation::Remove { id } => {
            let known = require(view, index, *id)?;
            if !known.live {
                tracing::trace!(fiber_id = %id, "ignoring removal of unmounted fiber");
                return Ok(None);
            }
            view.set(
                *id,
                KnownFiber {
                    live: false,
                    ..known
                },
            );
            Some((*id, FiberEvent::Unmount))
        }
        RawOperation::Reorder { id, children } => {
            require(view, index, *id)?;
            for child in children {
                if require(view, index, *child)?.parent != Some(*id) {
                    return Err(DecodeError::NotAChild {
                        index,
                        id: *id,
                        child: *child,
                    });
                }
            }
            Some((
                *id,
                FiberEvent::Update {
                    changes: FiberUpdate {
                        children: Some(children.clone()),
                        ..FiberUpdate::default()
                    },
                },
            ))
        }
        RawOperation::Reparent { id, parent_id } => {
            require(view, index, *id)?;
            let parent = FiberId::from_wire(*parent_id)
                .ok_or(DecodeError::InvalidReparent { index, id: *id })?;
            if view.get(parent).is_none() {
                return Err(DecodeError::UnknownParent {
                    index,
                    id: *id,
                    parent,
                });
            }
            if view.is_ancestor(*id, parent) {
                return Err(DecodeError::CyclicReparent {
                    index,
                    id: *id,
                    parent,
                });
            }
            view.reparent(*id, parent);
            Some((
                *id,
                FiberEvent::Update {
                    changes: FiberUpdate {
                        parent_id: Some(parent),
                        ..FiberUpdate::default()
                    },
                },
            ))
        }
        RawOperation::SetOwner { id, owner_id } => {
            require(view, index, *id)?;
            let owner = FiberId::from_wire(*owner_id);
            if let Some(owner) = owner
                && view.get(owner).is_none()
            {
                return Err(DecodeError::UnknownOwner {
                    index,
                    id: *id,
                    owner,
                });
            }
            Some((*id, FiberEvent::OwnershipChange { owner_id: owner }))
        }
        RawOperation::ErrorsAndWarnings { id, .. } | RawOperation::SubtreeMode { id, .. } => {
            require(view, index, *id)?;
            None
        }
    };
    Ok(decoded)
}

/// Decode structured records into messages, in input order.
///
/// The batch is all-or-nothing: on error neither `view` nor `sequence`
/// is advanced.
pub fn decode_operations(
    records: &[RawOperation],
    view: &mut FiberView,
    sequence: &mut MessageSequence,
) -> Result<Vec<Message>, DecodeError> {
    let mut staged = view.stage();
    let mut ids = *sequence;
    let mut messages = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        if let Some((fiber_id, event)) = decode_record(index, record, &mut staged)? {
            messages.push(Message {
                id: ids.take(),
                fiber_id,
                commit_id: None,
                triggers: Vec::new(),
                timing: None,
                event,
            });
        }
    }

    staged.commit();
    *sequence = ids;
    Ok(messages)
}

/// Decode one `operations` notification, unpacking the numeric encoding
/// first when needed.
pub fn decode_batch(
    batch: &OperationsBatch,
    view: &mut FiberView,
    sequence: &mut MessageSequence,
) -> Result<Vec<Message>, DecodeError> {
    let records: Cow<'_, [RawOperation]> = match &batch.operations {
        OperationsPayload::Encoded(words) if words.is_empty() => return Ok(Vec::new()),
        OperationsPayload::Encoded(words) => {
            let unpacked = encoded::unpack(words)?;
            if unpacked.renderer_id != batch.renderer_id {
                return Err(DecodeError::RendererMismatch {
                    expected: batch.renderer_id,
                    found: unpacked.renderer_id,
                });
            }
            Cow::Owned(unpacked.operations)
        }
        OperationsPayload::Records(records) => Cow::Borrowed(records),
    };
    decode_operations(&records, view, sequence)
}
