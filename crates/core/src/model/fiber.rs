use fiber_trace_protocol::{CommitId, FiberId, FiberInfo};
use serde::{Deserialize, Serialize};

/// Render duration samples collected for one fiber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderTimings {
    /// Actual render durations (ms), in the order they were reported.
    pub samples: Vec<f64>,
    pub total_duration: f64,
    pub total_self_duration: f64,
}

impl RenderTimings {
    pub fn record(&mut self, duration: f64, self_duration: Option<f64>) {
        self.samples.push(duration);
        self.total_duration += duration;
        self.total_self_duration += self_duration.unwrap_or(0.0);
    }

    pub fn render_count(&self) -> usize {
        self.samples.len()
    }

    pub fn last_duration(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    pub fn mean_duration(&self) -> Option<f64> {
        (!self.samples.is_empty()).then(|| self.total_duration / self.samples.len() as f64)
    }
}

/// Everything known about one fiber, live or unmounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberRecord {
    pub id: FiberId,
    /// Component that created this fiber; `None` for a render root.
    pub owner_id: Option<FiberId>,
    /// Structural container; `None` for a render root.
    pub parent_id: Option<FiberId>,
    pub display_name: String,
    pub key: Option<String>,
    pub element_type: u32,
    /// Distance from the render root (0 = root).
    pub depth: u32,
    pub is_unmounted: bool,
    pub timings: RenderTimings,
    /// Live children in reconciler order.
    pub children: Vec<FiberId>,
    pub mounted_in: Option<CommitId>,
    pub unmounted_in: Option<CommitId>,
}

impl FiberRecord {
    pub fn from_mount(id: FiberId, info: &FiberInfo, commit_id: Option<CommitId>) -> Self {
        Self {
            id,
            owner_id: info.owner_id,
            parent_id: info.parent_id,
            display_name: info.display_name.clone(),
            key: info.key.clone(),
            element_type: info.element_type,
            depth: info.depth,
            is_unmounted: false,
            timings: RenderTimings::default(),
            children: Vec::new(),
            mounted_in: commit_id,
            unmounted_in: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
