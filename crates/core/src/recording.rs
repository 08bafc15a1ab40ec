//! Recorded hook sessions, replayable through a [`Bridge`](crate::bridge::Bridge).
//!
//! A recording lists the renderers the hook knew about, a pool of change
//! objects, and the notifications in arrival order. Commit notifications
//! refer to pooled changes by index, so one change object can be delivered
//! more than once, exactly as a live producer may do.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use fiber_trace_protocol::{CommitId, OperationsBatch, OperationsPayload, RendererId, Trigger};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::{
    DevtoolsHook, HookChannel, HookEvent, HookSignal, NotificationQueue, Renderer,
    RendererInterface, SubscriptionId,
};
use crate::parsers::{CommitData, FiberChange};

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to read recording {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid recording: {0}")]
    Json(#[from] serde_json::Error),
    #[error("notification {notification}: no change at index {index}")]
    UnknownChange { notification: usize, index: usize },
    #[error("notification {notification}: renderer {renderer_id} is not listed")]
    UnknownRenderer {
        notification: usize,
        renderer_id: RendererId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRenderer {
    pub id: RendererId,
    #[serde(flatten)]
    pub renderer: Renderer,
    /// An adapter was already attached when recording started.
    #[serde(default)]
    pub preattached: bool,
    /// Operations the adapter reports when asked for the current tree.
    #[serde(default)]
    pub initial_operations: Vec<OperationsPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RecordedNotification {
    Renderer {
        id: RendererId,
    },
    RendererAttached {
        id: RendererId,
    },
    Operations {
        renderer_id: RendererId,
        operations: OperationsPayload,
    },
    Commit {
        renderer_id: RendererId,
        commit_id: CommitId,
        #[serde(default)]
        timestamp: f64,
        #[serde(default)]
        duration: f64,
        #[serde(default)]
        triggers: Vec<Trigger>,
        /// Indexes into [`Recording::changes`].
        changes: Vec<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recording {
    pub renderers: Vec<RecordedRenderer>,
    pub changes: Vec<FiberChange>,
    pub notifications: Vec<RecordedNotification>,
}

impl Recording {
    pub fn from_json(input: &str) -> Result<Self, RecordingError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RecordingError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| RecordingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&input)
    }

    /// Build the hook and the notification stream to feed a bridge.
    ///
    /// Each pooled change becomes one `Rc`, shared by every commit that
    /// references it.
    pub fn into_session(self) -> Result<(ReplayHook, Vec<HookEvent>), RecordingError> {
        let pool: Vec<Rc<FiberChange>> = self.changes.into_iter().map(Rc::new).collect();
        let renderers: HashMap<RendererId, RecordedRenderer> = self
            .renderers
            .into_iter()
            .map(|renderer| (renderer.id, renderer))
            .collect();

        let events = self
            .notifications
            .into_iter()
            .enumerate()
            .map(|(notification, recorded)| -> Result<HookEvent, RecordingError> {
                match recorded {
                    RecordedNotification::Renderer { id } => renderers
                        .get(&id)
                        .map(|recorded| HookEvent::Renderer {
                            id,
                            renderer: recorded.renderer.clone(),
                        })
                        .ok_or(RecordingError::UnknownRenderer {
                            notification,
                            renderer_id: id,
                        }),
                    RecordedNotification::RendererAttached { id } => {
                        Ok(HookEvent::RendererAttached { id })
                    }
                    RecordedNotification::Operations {
                        renderer_id,
                        operations,
                    } => Ok(HookEvent::Operations(OperationsBatch {
                        renderer_id,
                        operations,
                    })),
                    RecordedNotification::Commit {
                        renderer_id,
                        commit_id,
                        timestamp,
                        duration,
                        triggers,
                        changes: indexes,
                    } => {
                        let changes = indexes
                            .into_iter()
                            .map(|index| {
                                pool.get(index)
                                    .cloned()
                                    .ok_or(RecordingError::UnknownChange {
                                        notification,
                                        index,
                                    })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(HookEvent::Commit(CommitData {
                            renderer_id,
                            commit_id,
                            timestamp,
                            duration,
                            triggers,
                            changes,
                        }))
                    }
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((ReplayHook::new(renderers), events))
    }
}

/// Hook that serves adapters for the renderers of a recording.
#[derive(Debug, Default)]
pub struct ReplayHook {
    renderers: HashMap<RendererId, RecordedRenderer>,
    registered: HashSet<RendererId>,
    next_subscription: u64,
    signals: Vec<HookSignal>,
}

impl ReplayHook {
    pub fn new(renderers: HashMap<RendererId, RecordedRenderer>) -> Self {
        let registered = renderers
            .values()
            .filter(|recorded| recorded.preattached)
            .map(|recorded| recorded.id)
            .collect();
        Self {
            renderers,
            registered,
            ..Self::default()
        }
    }

    /// Signals raised by the bridge, in order.
    pub fn signals(&self) -> &[HookSignal] {
        &self.signals
    }

    fn adapter(&self, id: RendererId) -> Option<Box<dyn RendererInterface>> {
        let recorded = self.renderers.get(&id)?;
        Some(Box::new(ReplayRenderer {
            id,
            initial_operations: recorded.initial_operations.clone(),
        }))
    }
}

impl DevtoolsHook for ReplayHook {
    fn subscribe(&mut self, _channel: HookChannel) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        tracing::trace!(?subscription, "unsubscribed");
    }

    fn renderer_interface(&mut self, id: RendererId) -> Option<Box<dyn RendererInterface>> {
        if self.registered.contains(&id) {
            self.adapter(id)
        } else {
            None
        }
    }

    fn attach(
        &mut self,
        id: RendererId,
        _renderer: &Renderer,
    ) -> Option<Box<dyn RendererInterface>> {
        let adapter = self.adapter(id)?;
        self.registered.insert(id);
        Some(adapter)
    }

    fn emit(&mut self, signal: HookSignal) {
        tracing::debug!(?signal, "hook signal");
        self.signals.push(signal);
    }
}

/// Adapter that reports the recorded initial tree.
struct ReplayRenderer {
    id: RendererId,
    initial_operations: Vec<OperationsPayload>,
}

impl RendererInterface for ReplayRenderer {
    fn flush_initial_operations(&mut self, queue: &mut NotificationQueue) {
        let renderer_id = self.id;
        queue.extend(
            self.initial_operations
                .drain(..)
                .map(|operations| HookEvent::Operations(OperationsBatch {
                    renderer_id,
                    operations,
                })),
        );
    }

    fn start_profiling(&mut self, enabled: bool) {
        tracing::debug!(renderer_id = %self.id, enabled, "profiling");
    }
}
