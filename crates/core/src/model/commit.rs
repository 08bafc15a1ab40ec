use std::collections::BTreeMap;

use fiber_trace_protocol::{CommitId, Message, MessageOp, Trigger};
use serde::{Deserialize, Serialize};

/// One end of a commit: the event at that end and its time, if reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBoundary {
    pub event: Message,
    pub timestamp: Option<f64>,
}

/// One render pass and the events that belong to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub commit_id: CommitId,
    pub events: Vec<Message>,
    /// `start.event.triggers` is the causal chain that started the pass.
    pub start: CommitBoundary,
    pub end: CommitBoundary,
}

impl Commit {
    pub(crate) fn open(commit_id: CommitId, first: &Message) -> Self {
        let timestamp = first.timing.map(|t| t.timestamp);
        Self {
            commit_id,
            events: vec![first.clone()],
            start: CommitBoundary {
                event: first.clone(),
                timestamp,
            },
            end: CommitBoundary {
                event: first.clone(),
                timestamp: first.timing.map(|t| t.end()),
            },
        }
    }

    pub(crate) fn push(&mut self, message: &Message) {
        self.events.push(message.clone());
        if let Some(timing) = message.timing {
            if self.start.timestamp.is_none() {
                self.start.timestamp = Some(timing.timestamp);
            }
            let end = timing.end();
            self.end.timestamp = Some(self.end.timestamp.map_or(end, |t| t.max(end)));
        }
        self.end.event = message.clone();
    }

    /// Primary trigger of the pass.
    pub fn trigger(&self) -> Option<&Trigger> {
        self.start.event.trigger()
    }

    /// Wall time covered by the commit's events, when timing was reported.
    pub fn duration(&self) -> Option<f64> {
        Some(self.end.timestamp? - self.start.timestamp?)
    }

    /// Per-operation counts, computed from the events on every call.
    pub fn stats(&self) -> CommitStats {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.op()).or_insert(0) += 1;
        }
        CommitStats {
            commit_id: self.commit_id,
            counts,
            trigger: self.trigger().cloned(),
        }
    }
}

/// Aggregate view of one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitStats {
    pub commit_id: CommitId,
    pub counts: BTreeMap<MessageOp, usize>,
    pub trigger: Option<Trigger>,
}

impl CommitStats {
    pub fn count(&self, op: MessageOp) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
