use fiber_trace_protocol::Message;

use crate::model::CommitStore;

/// Outbound sink for decoded batches. Fire-and-forget: delivery failures
/// are the sink's concern.
pub trait Publisher {
    fn publish(&mut self, channel: &str, messages: &[Message]);
}

/// Keeps every published batch, in order.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    pub batches: Vec<(String, Vec<Message>)>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published messages, flattened across batches.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.batches.iter().flat_map(|(_, batch)| batch)
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, channel: &str, messages: &[Message]) {
        self.batches.push((channel.to_string(), messages.to_vec()));
    }
}

/// Applies published batches straight into a [`CommitStore`].
#[derive(Debug, Default)]
pub struct StorePublisher {
    store: CommitStore,
    rejected: usize,
}

impl StorePublisher {
    pub fn new(store: CommitStore) -> Self {
        Self { store, rejected: 0 }
    }

    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    pub fn into_store(self) -> CommitStore {
        self.store
    }

    /// Batches the store refused.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

impl Publisher for StorePublisher {
    fn publish(&mut self, channel: &str, messages: &[Message]) {
        match self.store.apply_events(messages) {
            Ok(count) => tracing::trace!(channel, count, "applied batch"),
            Err(err) => {
                self.rejected += 1;
                tracing::warn!(channel, error = %err, "store rejected batch");
            }
        }
    }
}
