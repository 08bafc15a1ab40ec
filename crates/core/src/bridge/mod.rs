//! Glue between the instrumentation hook and the outbound channel.
//!
//! The bridge attaches to renderers as they announce themselves, decodes
//! their `operations` and `commit` notifications, and publishes the
//! resulting messages in production order.

pub mod dedup;
pub mod hook;
pub mod publisher;

use std::collections::{HashMap, VecDeque};

use fiber_trace_protocol::{Message, RendererId};
use thiserror::Error;

use crate::config::BridgeConfig;
use crate::parsers::{
    CommitChangeParser, FiberView, MessageSequence, ParseError, decode_batch,
};
pub use dedup::SeenSet;
pub use hook::{
    DevtoolsHook, HookChannel, HookEvent, HookSignal, NotificationQueue, Renderer,
    RendererCapabilities, RendererInterface, SubscriptionId,
};
pub use publisher::{MemoryPublisher, Publisher, StorePublisher};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("renderer {renderer_id}: rejected notification: {source}")]
    Rejected {
        renderer_id: RendererId,
        #[source]
        source: ParseError,
    },
    #[error("{} notifications failed", .0.len())]
    Multiple(Vec<BridgeError>),
}

/// Attachment lifecycle of one renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachState {
    #[default]
    Unattached,
    Attaching,
    Attached,
    /// Terminal: the renderer build cannot be instrumented.
    Unsupported,
}

#[derive(Default)]
struct RendererSlot {
    state: AttachState,
    interface: Option<Box<dyn RendererInterface>>,
    buffered: VecDeque<HookEvent>,
}

pub struct Bridge<H, P> {
    hook: H,
    publisher: P,
    config: BridgeConfig,
    subscriptions: Vec<SubscriptionId>,
    renderers: HashMap<RendererId, RendererSlot>,
    fibers: FiberView,
    sequence: MessageSequence,
    commits: CommitChangeParser,
    queue: NotificationQueue,
    history: Vec<Message>,
    destroyed: bool,
}

impl<H: DevtoolsHook, P: Publisher> Bridge<H, P> {
    /// Subscribe to every hook channel.
    pub fn new(mut hook: H, publisher: P, config: BridgeConfig) -> Self {
        let subscriptions = HookChannel::ALL
            .iter()
            .map(|channel| hook.subscribe(*channel))
            .collect();
        Self {
            hook,
            publisher,
            config,
            subscriptions,
            renderers: HashMap::new(),
            fibers: FiberView::new(),
            sequence: MessageSequence::new(),
            commits: CommitChangeParser::new(),
            queue: NotificationQueue::new(),
            history: Vec::new(),
            destroyed: false,
        }
    }

    /// Handle one notification and everything it causes to be queued.
    ///
    /// A failing notification does not stop the ones queued behind it.
    pub fn handle(&mut self, event: HookEvent) -> Result<(), BridgeError> {
        if self.destroyed {
            return Ok(());
        }
        self.queue.push(event);

        let mut errors = Vec::new();
        while let Some(event) = self.queue.pop() {
            if let Err(err) = self.dispatch(event) {
                errors.push(err);
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(BridgeError::Multiple(errors)),
        }
    }

    fn dispatch(&mut self, event: HookEvent) -> Result<(), BridgeError> {
        match event {
            HookEvent::Renderer { id, renderer } => {
                self.on_renderer(id, &renderer);
                Ok(())
            }
            HookEvent::RendererAttached { id } => {
                self.on_renderer_attached(id);
                Ok(())
            }
            event => {
                let renderer_id = event.renderer_id();
                match self.renderer_state(renderer_id) {
                    AttachState::Attached => self.decode(&event),
                    AttachState::Unsupported => {
                        tracing::trace!(
                            %renderer_id,
                            channel = %event.channel(),
                            "dropping notification for unsupported renderer"
                        );
                        Ok(())
                    }
                    AttachState::Unattached | AttachState::Attaching => {
                        self.buffer(event);
                        Ok(())
                    }
                }
            }
        }
    }

    fn on_renderer(&mut self, id: RendererId, renderer: &Renderer) {
        if self.renderer_state(id) != AttachState::Unattached {
            tracing::debug!(renderer_id = %id, "renderer already announced");
            return;
        }

        let interface = match self.hook.renderer_interface(id) {
            Some(interface) => Some(interface),
            None if renderer.capabilities.is_attachable() => self.hook.attach(id, renderer),
            None => None,
        };

        let slot = self.renderers.entry(id).or_default();
        let Some(interface) = interface else {
            slot.state = AttachState::Unsupported;
            slot.buffered.clear();
            tracing::warn!(
                renderer_id = %id,
                version = %renderer.version,
                "unsupported renderer version"
            );
            self.hook.emit(HookSignal::UnsupportedRendererVersion(id));
            return;
        };

        slot.interface = Some(interface);
        slot.state = AttachState::Attaching;
        tracing::info!(
            renderer_id = %id,
            version = %renderer.version,
            package = renderer.package_name.as_deref().unwrap_or("unknown"),
            "renderer attached"
        );
        self.hook.emit(HookSignal::RendererAttached { id });
        self.on_renderer_attached(id);
    }

    fn on_renderer_attached(&mut self, id: RendererId) {
        if self.renderer_state(id) == AttachState::Unattached {
            // Attached by the hook itself, before or without a `renderer`
            // notification reaching us.
            let Some(interface) = self.hook.renderer_interface(id) else {
                tracing::debug!(renderer_id = %id, "no registered interface, still waiting");
                return;
            };
            let slot = self.renderers.entry(id).or_default();
            slot.interface = Some(interface);
            slot.state = AttachState::Attaching;
            tracing::info!(renderer_id = %id, "renderer attached by hook");
        }
        let Some(slot) = self.renderers.get_mut(&id) else {
            return;
        };
        if slot.state != AttachState::Attaching {
            tracing::debug!(renderer_id = %id, state = ?slot.state, "ignoring renderer-attached");
            return;
        }

        let mut initial = NotificationQueue::new();
        if let Some(interface) = slot.interface.as_mut() {
            interface.flush_initial_operations(&mut initial);
            interface.start_profiling(self.config.profiling);
        }
        let replayed = slot.buffered.len();
        initial.extend(slot.buffered.drain(..));
        self.queue.prepend(initial);
        slot.state = AttachState::Attached;
        tracing::debug!(renderer_id = %id, replayed, "renderer ready");
    }

    fn buffer(&mut self, event: HookEvent) {
        let renderer_id = event.renderer_id();
        let limit = self.config.max_buffered_notifications;
        let slot = self.renderers.entry(renderer_id).or_default();
        if limit == 0 {
            tracing::warn!(%renderer_id, "buffering disabled, dropping notification");
            return;
        }
        if slot.buffered.len() >= limit {
            slot.buffered.pop_front();
            tracing::warn!(%renderer_id, limit, "notification buffer full, dropping oldest");
        }
        slot.buffered.push_back(event);
    }

    fn decode(&mut self, event: &HookEvent) -> Result<(), BridgeError> {
        let renderer_id = event.renderer_id();
        let decoded: Result<Vec<Message>, ParseError> = match event {
            HookEvent::Operations(batch) => {
                decode_batch(batch, &mut self.fibers, &mut self.sequence).map_err(Into::into)
            }
            HookEvent::Commit(data) => self
                .commits
                .parse(data, &mut self.fibers, &mut self.sequence)
                .map_err(Into::into),
            HookEvent::Renderer { .. } | HookEvent::RendererAttached { .. } => Ok(Vec::new()),
        };

        match decoded {
            Ok(messages) => {
                self.publish(messages);
                Ok(())
            }
            Err(source) => {
                tracing::warn!(%renderer_id, error = %source, "rejected notification");
                Err(BridgeError::Rejected {
                    renderer_id,
                    source,
                })
            }
        }
    }

    fn publish(&mut self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        tracing::debug!(channel = %self.config.channel, count = messages.len(), "publishing batch");
        self.publisher.publish(&self.config.channel, &messages);
        if self.config.history {
            self.history.extend(messages);
        }
    }

    /// Republish everything published so far, as one batch.
    pub fn resync(&mut self) {
        if self.destroyed || self.history.is_empty() {
            return;
        }
        tracing::debug!(count = self.history.len(), "resync");
        self.publisher.publish(&self.config.channel, &self.history);
    }

    /// Unsubscribe from the hook and drop all pending state. Safe to call
    /// more than once.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        for subscription in self.subscriptions.drain(..) {
            self.hook.unsubscribe(subscription);
        }
        self.renderers.clear();
        self.queue.clear();
        self.destroyed = true;
        tracing::debug!("bridge destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn renderer_state(&self, id: RendererId) -> AttachState {
        self.renderers
            .get(&id)
            .map_or(AttachState::Unattached, |slot| slot.state)
    }

    /// Messages published so far, when history is enabled.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::parsers::{CommitData, FiberChange, FiberSnapshot};
    use fiber_trace_protocol::{
        CommitId, FiberId, MessageOp, OperationsBatch, OperationsPayload, RawOperation, Trigger,
        TriggerKind,
    };

    type Log = Rc<RefCell<Vec<String>>>;

    struct FakeRenderer {
        id: RendererId,
        initial: Vec<RawOperation>,
        log: Log,
    }

    impl RendererInterface for FakeRenderer {
        fn flush_initial_operations(&mut self, queue: &mut NotificationQueue) {
            self.log.borrow_mut().push(format!("flush {}", self.id));
            if !self.initial.is_empty() {
                queue.push(operations(self.id.get(), std::mem::take(&mut self.initial)));
            }
        }

        fn start_profiling(&mut self, enabled: bool) {
            self.log.borrow_mut().push(format!("profiling {enabled}"));
        }
    }

    #[derive(Default)]
    struct FakeHook {
        next: u64,
        active: Vec<SubscriptionId>,
        unsubscribed: Vec<SubscriptionId>,
        signals: Vec<HookSignal>,
        preattached: HashMap<RendererId, Vec<RawOperation>>,
        initial: HashMap<RendererId, Vec<RawOperation>>,
        registered: Vec<RendererId>,
        log: Log,
    }

    impl DevtoolsHook for FakeHook {
        fn subscribe(&mut self, _channel: HookChannel) -> SubscriptionId {
            self.next += 1;
            let id = SubscriptionId(self.next);
            self.active.push(id);
            id
        }

        fn unsubscribe(&mut self, subscription: SubscriptionId) {
            self.active.retain(|s| *s != subscription);
            self.unsubscribed.push(subscription);
        }

        fn renderer_interface(&mut self, id: RendererId) -> Option<Box<dyn RendererInterface>> {
            let initial = self.preattached.remove(&id)?;
            Some(Box::new(FakeRenderer {
                id,
                initial,
                log: self.log.clone(),
            }))
        }

        fn attach(
            &mut self,
            id: RendererId,
            _renderer: &Renderer,
        ) -> Option<Box<dyn RendererInterface>> {
            self.registered.push(id);
            Some(Box::new(FakeRenderer {
                id,
                initial: self.initial.remove(&id).unwrap_or_default(),
                log: self.log.clone(),
            }))
        }

        fn emit(&mut self, signal: HookSignal) {
            self.signals.push(signal);
        }
    }

    fn add(id: u64, parent: u64, name: &str) -> RawOperation {
        RawOperation::Add {
            id: FiberId(id),
            parent_id: parent,
            owner_id: parent,
            depth: None,
            name: name.to_string(),
            key: None,
            element_type: 5,
        }
    }

    fn operations(renderer: u64, records: Vec<RawOperation>) -> HookEvent {
        HookEvent::Operations(OperationsBatch {
            renderer_id: RendererId(renderer),
            operations: OperationsPayload::Records(records),
        })
    }

    fn announce(id: u64, attachable: bool) -> HookEvent {
        HookEvent::Renderer {
            id: RendererId(id),
            renderer: Renderer {
                version: "18.2.0".into(),
                package_name: Some("react-dom".into()),
                capabilities: RendererCapabilities {
                    find_fiber_by_host_instance: attachable,
                },
            },
        }
    }

    fn mount_change(id: u64, parent: Option<u64>, name: &str) -> Rc<FiberChange> {
        Rc::new(FiberChange {
            fiber_id: FiberId(id),
            before: None,
            after: Some(FiberSnapshot {
                display_name: name.to_string(),
                parent_id: parent.map(FiberId),
                owner_id: parent.map(FiberId),
                key: None,
                element_type: 5,
                depth: None,
                actual_duration: 1.0,
                self_duration: 1.0,
            }),
            triggers: Vec::new(),
            effects: Vec::new(),
        })
    }

    fn commit(commit_id: u64, changes: Vec<Rc<FiberChange>>) -> HookEvent {
        HookEvent::Commit(CommitData {
            renderer_id: RendererId(1),
            commit_id: CommitId(commit_id),
            timestamp: 10.0,
            duration: 2.0,
            triggers: vec![Trigger::new("click", TriggerKind::State)],
            changes,
        })
    }

    fn bridge(hook: FakeHook) -> Bridge<FakeHook, MemoryPublisher> {
        Bridge::new(hook, MemoryPublisher::new(), BridgeConfig::default())
    }

    #[test]
    fn subscribes_to_every_channel() {
        let bridge = bridge(FakeHook::default());
        assert_eq!(bridge.hook().active.len(), HookChannel::ALL.len());
    }

    #[test]
    fn attach_flushes_then_starts_profiling() {
        let mut hook = FakeHook::default();
        hook.initial.insert(RendererId(1), vec![add(1, 0, "Root"), add(2, 1, "App")]);
        let log = hook.log.clone();
        let mut bridge = bridge(hook);

        bridge.handle(announce(1, true)).unwrap();

        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Attached);
        assert_eq!(
            bridge.hook().signals,
            vec![HookSignal::RendererAttached { id: RendererId(1) }]
        );
        assert_eq!(*log.borrow(), vec!["flush 1", "profiling true"]);
        let published = &bridge.publisher().batches;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "tree-changes");
        assert_eq!(published[0].1.len(), 2);
    }

    #[test]
    fn preattached_interface_is_reused() {
        let mut hook = FakeHook::default();
        hook.preattached.insert(RendererId(1), vec![add(1, 0, "Root")]);
        let mut bridge = bridge(hook);

        bridge.handle(announce(1, false)).unwrap();
        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Attached);
        assert_eq!(bridge.history().len(), 1);
    }

    #[test]
    fn hook_attached_renderer_flushes_and_publishes() {
        let mut hook = FakeHook::default();
        hook.preattached.insert(RendererId(1), vec![add(1, 0, "Root")]);
        let log = hook.log.clone();
        let mut bridge = bridge(hook);

        bridge
            .handle(HookEvent::RendererAttached { id: RendererId(1) })
            .expect("failed to attach renderer 1");
        bridge
            .handle(operations(1, vec![add(2, 1, "App")]))
            .expect("failed to decode operations");

        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Attached);
        assert_eq!(*log.borrow(), vec!["flush 1", "profiling true"]);
        let ids: Vec<u64> = bridge
            .publisher()
            .messages()
            .map(|m| m.fiber_id.get())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn attached_before_any_interface_keeps_buffering() {
        let mut hook = FakeHook::default();
        hook.initial.insert(RendererId(1), vec![add(1, 0, "Root")]);
        let mut bridge = bridge(hook);

        bridge
            .handle(HookEvent::RendererAttached { id: RendererId(1) })
            .expect("failed to handle renderer-attached");
        bridge
            .handle(operations(1, vec![add(2, 1, "App")]))
            .expect("failed to buffer operations");
        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Unattached);
        assert!(bridge.publisher().batches.is_empty());

        bridge.handle(announce(1, true)).expect("failed to attach renderer 1");
        assert_eq!(bridge.hook().registered, vec![RendererId(1)]);
        assert_eq!(bridge.history().len(), 2);
    }

    #[test]
    fn repeated_renderer_attached_does_not_flush_again() {
        let mut hook = FakeHook::default();
        let log = hook.log.clone();
        hook.initial.insert(RendererId(1), vec![add(1, 0, "Root")]);
        let mut bridge = bridge(hook);

        bridge.handle(announce(1, true)).expect("failed to attach renderer 1");
        bridge
            .handle(HookEvent::RendererAttached { id: RendererId(1) })
            .expect("failed to handle renderer-attached");
        assert_eq!(*log.borrow(), vec!["flush 1", "profiling true"]);
        assert_eq!(bridge.history().len(), 1);
    }

    #[test]
    fn unsupported_renderer_signals_once_and_drops() {
        let mut bridge = bridge(FakeHook::default());
        bridge.handle(announce(2, false)).unwrap();
        bridge.handle(announce(2, false)).unwrap();
        bridge
            .handle(operations(2, vec![add(1, 0, "Root")]))
            .unwrap();

        assert_eq!(bridge.renderer_state(RendererId(2)), AttachState::Unsupported);
        assert_eq!(
            bridge.hook().signals,
            vec![HookSignal::UnsupportedRendererVersion(RendererId(2))]
        );
        assert!(bridge.publisher().batches.is_empty());
    }

    #[test]
    fn early_notifications_replay_after_initial_tree() {
        let mut hook = FakeHook::default();
        hook.initial.insert(RendererId(1), vec![add(1, 0, "Root")]);
        let mut bridge = bridge(hook);

        bridge
            .handle(operations(1, vec![add(2, 1, "Early")]))
            .unwrap();
        assert!(bridge.publisher().batches.is_empty());

        bridge.handle(announce(1, true)).unwrap();
        let names: Vec<u64> = bridge
            .publisher()
            .messages()
            .map(|m| m.fiber_id.get())
            .collect();
        assert_eq!(names, vec![1, 2]);
    }

    #[test]
    fn buffer_drops_oldest_past_limit() {
        let config = BridgeConfig {
            max_buffered_notifications: 1,
            ..BridgeConfig::default()
        };
        let mut bridge = Bridge::new(FakeHook::default(), MemoryPublisher::new(), config);
        bridge.handle(operations(1, vec![add(1, 0, "Lost")])).unwrap();
        bridge.handle(operations(1, vec![add(2, 0, "Kept")])).unwrap();
        bridge.handle(announce(1, true)).unwrap();

        let ids: Vec<u64> = bridge
            .publisher()
            .messages()
            .map(|m| m.fiber_id.get())
            .collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn commits_are_published_once() {
        let mut bridge = bridge(FakeHook::default());
        bridge.handle(announce(1, true)).unwrap();

        let root = mount_change(1, None, "Root");
        bridge.handle(commit(1, vec![root.clone()])).unwrap();
        bridge.handle(commit(1, vec![root])).unwrap();

        let published = &bridge.publisher().batches;
        assert_eq!(published.len(), 1);
        let first = &published[0].1[0];
        assert_eq!(first.op(), MessageOp::Mount);
        assert_eq!(first.trigger().map(|t| t.event.as_str()), Some("click"));
    }

    #[test]
    fn failing_notification_does_not_block_the_rest() {
        let mut bridge = bridge(FakeHook::default());
        bridge.handle(announce(1, true)).unwrap();

        let err = bridge
            .handle(operations(1, vec![add(5, 9, "Orphan")]))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Rejected {
                renderer_id: RendererId(1),
                source: ParseError::Operations(_),
            }
        ));
        assert!(bridge.publisher().batches.is_empty());

        bridge.handle(operations(1, vec![add(1, 0, "Root")])).unwrap();
        assert_eq!(bridge.history().len(), 1);
        assert_eq!(bridge.history()[0].id.get(), 1);
    }

    #[test]
    fn several_failures_are_collected() {
        let mut hook = FakeHook::default();
        hook.initial.insert(RendererId(1), vec![add(5, 9, "Orphan")]);
        let mut bridge = bridge(hook);
        bridge
            .handle(operations(1, vec![add(6, 9, "AlsoOrphan")]))
            .unwrap();

        match bridge.handle(announce(1, true)) {
            Err(BridgeError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two failures, got {other:?}"),
        }
        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Attached);
    }

    #[test]
    fn resync_republishes_history() {
        let mut bridge = bridge(FakeHook::default());
        bridge.handle(announce(1, true)).unwrap();
        bridge.handle(operations(1, vec![add(1, 0, "Root")])).unwrap();
        bridge.handle(operations(1, vec![add(2, 1, "App")])).unwrap();

        bridge.resync();
        let batches = &bridge.publisher().batches;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].1.len(), 2);
    }

    #[test]
    fn empty_batches_are_not_published() {
        let mut bridge = bridge(FakeHook::default());
        bridge.handle(announce(1, true)).unwrap();
        bridge
            .handle(HookEvent::Operations(OperationsBatch {
                renderer_id: RendererId(1),
                operations: OperationsPayload::Encoded(Vec::new()),
            }))
            .unwrap();
        assert!(bridge.publisher().batches.is_empty());
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut bridge = bridge(FakeHook::default());
        bridge.destroy();
        bridge.destroy();
        assert!(bridge.is_destroyed());
        assert!(bridge.hook().active.is_empty());
        assert_eq!(bridge.hook().unsubscribed.len(), HookChannel::ALL.len());

        bridge.handle(announce(1, true)).unwrap();
        assert_eq!(bridge.renderer_state(RendererId(1)), AttachState::Unattached);
        assert!(bridge.hook().signals.is_empty());
    }
}
