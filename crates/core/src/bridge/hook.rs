use std::collections::VecDeque;

use fiber_trace_protocol::{OperationsBatch, RendererId};
use serde::{Deserialize, Serialize};

use crate::parsers::CommitData;

/// Notification channels the bridge listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookChannel {
    Renderer,
    RendererAttached,
    Operations,
    Commit,
}

impl HookChannel {
    pub const ALL: [Self; 4] = [
        Self::Renderer,
        Self::RendererAttached,
        Self::Operations,
        Self::Commit,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Renderer => "renderer",
            Self::RendererAttached => "renderer-attached",
            Self::Operations => "operations",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for HookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Entry points a renderer build exposes to instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererCapabilities {
    pub find_fiber_by_host_instance: bool,
}

impl RendererCapabilities {
    /// Whether an adapter can be attached. Builds without host-instance
    /// lookup predate the instrumentation protocol.
    pub fn is_attachable(&self) -> bool {
        self.find_fiber_by_host_instance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Renderer {
    pub version: String,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub capabilities: RendererCapabilities,
}

/// Inbound notification from the hook.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Renderer { id: RendererId, renderer: Renderer },
    RendererAttached { id: RendererId },
    Operations(OperationsBatch),
    Commit(CommitData),
}

impl HookEvent {
    pub fn channel(&self) -> HookChannel {
        match self {
            Self::Renderer { .. } => HookChannel::Renderer,
            Self::RendererAttached { .. } => HookChannel::RendererAttached,
            Self::Operations(_) => HookChannel::Operations,
            Self::Commit(_) => HookChannel::Commit,
        }
    }

    pub fn renderer_id(&self) -> RendererId {
        match self {
            Self::Renderer { id, .. } | Self::RendererAttached { id } => *id,
            Self::Operations(batch) => batch.renderer_id,
            Self::Commit(data) => data.renderer_id,
        }
    }
}

/// Outbound signal the bridge raises on the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookSignal {
    RendererAttached { id: RendererId },
    UnsupportedRendererVersion(RendererId),
}

/// FIFO of notifications waiting to be handled.
///
/// Handlers never recurse into the bridge: anything raised while a
/// notification is being handled is queued here and processed after it.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    events: VecDeque<HookEvent>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: HookEvent) {
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<HookEvent> {
        self.events.pop_front()
    }

    /// Put `other` ahead of everything already queued, keeping its order.
    pub fn prepend(&mut self, mut other: NotificationQueue) {
        other.events.append(&mut self.events);
        self.events = other.events;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Extend<HookEvent> for NotificationQueue {
    fn extend<I: IntoIterator<Item = HookEvent>>(&mut self, iter: I) {
        self.events.extend(iter);
    }
}

/// Adapter attached to one renderer.
pub trait RendererInterface {
    /// Queue operations describing the tree as it exists right now.
    fn flush_initial_operations(&mut self, queue: &mut NotificationQueue);

    fn start_profiling(&mut self, enabled: bool);
}

/// The global instrumentation hook the bridge subscribes to.
pub trait DevtoolsHook {
    fn subscribe(&mut self, channel: HookChannel) -> SubscriptionId;

    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Adapter registered for `id`, whether the hook attached it on its
    /// own or through an earlier [`attach`](Self::attach).
    fn renderer_interface(&mut self, id: RendererId) -> Option<Box<dyn RendererInterface>>;

    /// Construct an adapter for `renderer` and register it under `id`.
    fn attach(&mut self, id: RendererId, renderer: &Renderer)
    -> Option<Box<dyn RendererInterface>>;

    fn emit(&mut self, signal: HookSignal);
}
