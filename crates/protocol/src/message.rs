use serde::{Deserialize, Serialize};

use crate::ids::{CommitId, FiberId, MessageId};

/// Why a fiber (or a whole commit) rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Props,
    State,
    Parent,
    Context,
    ForceUpdate,
    Hooks,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Props => write!(f, "props"),
            Self::State => write!(f, "state"),
            Self::Parent => write!(f, "parent"),
            Self::Context => write!(f, "context"),
            Self::ForceUpdate => write!(f, "force-update"),
            Self::Hooks => write!(f, "hooks"),
        }
    }
}

/// One link of a causal chain: the event that happened and what kind of
/// change it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Producer-supplied label, e.g. `"setState"` or `"click"`.
    pub event: String,
    pub kind: TriggerKind,
}

impl Trigger {
    pub fn new(event: impl Into<String>, kind: TriggerKind) -> Self {
        Self {
            event: event.into(),
            kind,
        }
    }

    /// Trigger used when a render pass started without any reported cause.
    pub fn forced() -> Self {
        Self::new("forceUpdate", TriggerKind::ForceUpdate)
    }
}

/// When a fiber rendered and for how long, in the producer's clock (ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub timestamp: f64,
    pub duration: f64,
}

impl Timing {
    pub fn end(&self) -> f64 {
        self.timestamp + self.duration
    }
}

/// Everything known about a fiber at the time it mounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberInfo {
    pub parent_id: Option<FiberId>,
    pub owner_id: Option<FiberId>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub element_type: u32,
    pub depth: u32,
}

/// Fields that changed in an update. Absent fields are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiberUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FiberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FiberId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_duration: Option<f64>,
}

impl FiberUpdate {
    /// An update that changes nothing is never emitted.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.parent_id.is_none()
            && self.children.is_none()
            && self.duration.is_none()
            && self.self_duration.is_none()
    }
}

/// Operation-specific payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FiberEvent {
    Mount { fiber: FiberInfo },
    Update { changes: FiberUpdate },
    Unmount,
    EffectTrigger { effect: String },
    OwnershipChange { owner_id: Option<FiberId> },
}

impl FiberEvent {
    pub fn op(&self) -> MessageOp {
        match self {
            Self::Mount { .. } => MessageOp::Mount,
            Self::Update { .. } => MessageOp::Update,
            Self::Unmount => MessageOp::Unmount,
            Self::EffectTrigger { .. } => MessageOp::EffectTrigger,
            Self::OwnershipChange { .. } => MessageOp::OwnershipChange,
        }
    }
}

/// Payload-free operation kind, used for statistics and dedup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageOp {
    Mount,
    Update,
    Unmount,
    EffectTrigger,
    OwnershipChange,
}

impl MessageOp {
    pub const ALL: [MessageOp; 5] = [
        Self::Mount,
        Self::Update,
        Self::Unmount,
        Self::EffectTrigger,
        Self::OwnershipChange,
    ];
}

impl std::fmt::Display for MessageOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount => write!(f, "mount"),
            Self::Update => write!(f, "update"),
            Self::Unmount => write!(f, "unmount"),
            Self::EffectTrigger => write!(f, "effect-trigger"),
            Self::OwnershipChange => write!(f, "ownership-change"),
        }
    }
}

/// A single fiber-affecting action, as published on the tree-changes channel.
///
/// Messages produced from an operations batch have no `commit_id`; messages
/// produced from a commit notification always have one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub fiber_id: FiberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<CommitId>,
    /// Causal chain. The first entry describes this event; for the message
    /// that opened a commit it is the commit's primary trigger.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(flatten)]
    pub event: FiberEvent,
}

impl Message {
    pub fn op(&self) -> MessageOp {
        self.event.op()
    }

    /// The trigger describing this event, if any.
    pub fn trigger(&self) -> Option<&Trigger> {
        self.triggers.first()
    }
}
