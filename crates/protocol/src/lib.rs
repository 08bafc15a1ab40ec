pub mod ids;
pub mod message;
pub mod operations;

pub use ids::{CommitId, FiberId, MessageId, RendererId};
pub use message::{
    FiberEvent, FiberInfo, FiberUpdate, Message, MessageOp, Timing, Trigger, TriggerKind,
};
pub use operations::{OperationsBatch, OperationsPayload, RawOperation};

/// Outbound channel carrying decoded tree changes.
pub const TREE_CHANGES_CHANNEL: &str = "tree-changes";
