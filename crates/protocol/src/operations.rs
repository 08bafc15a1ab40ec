use serde::{Deserialize, Serialize};

use crate::ids::{FiberId, RendererId};

/// Operation codes of the reconciler's flat `i64` operations encoding.
pub mod codes {
    pub const ADD: i64 = 1;
    pub const REMOVE: i64 = 2;
    pub const REORDER_CHILDREN: i64 = 3;
    pub const UPDATE_TREE_BASE_DURATION: i64 = 4;
    pub const UPDATE_ERRORS_OR_WARNINGS: i64 = 5;
    pub const REMOVE_ROOT: i64 = 6;
    pub const SET_SUBTREE_MODE: i64 = 7;

    /// Element type tag of a render root in an `ADD` entry.
    pub const ELEMENT_TYPE_ROOT: i64 = 11;

    /// Base durations are shipped as integer microseconds.
    pub const DURATION_SCALE: f64 = 1000.0;
}

/// One record-style tree mutation, as produced by the instrumentation shim.
///
/// Parent and owner references use the wire convention where `0` means
/// "none" (a render root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RawOperation {
    Add {
        id: FiberId,
        #[serde(default)]
        parent_id: u64,
        #[serde(default)]
        owner_id: u64,
        /// Explicit depth; derived from the parent when absent.
        #[serde(default)]
        depth: Option<u32>,
        #[serde(alias = "displayName")]
        name: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        element_type: u32,
    },
    Update {
        id: FiberId,
        #[serde(default, alias = "displayName")]
        name: Option<String>,
        #[serde(default)]
        duration: Option<f64>,
        #[serde(default)]
        self_duration: Option<f64>,
    },
    Remove {
        id: FiberId,
    },
    Reorder {
        id: FiberId,
        children: Vec<FiberId>,
    },
    Reparent {
        id: FiberId,
        parent_id: u64,
    },
    SetOwner {
        id: FiberId,
        owner_id: u64,
    },
    ErrorsAndWarnings {
        id: FiberId,
        errors: u32,
        warnings: u32,
    },
    SubtreeMode {
        id: FiberId,
        mode: u32,
    },
}

impl RawOperation {
    /// The fiber this record is about.
    pub fn fiber_id(&self) -> FiberId {
        match self {
            Self::Add { id, .. }
            | Self::Update { id, .. }
            | Self::Remove { id }
            | Self::Reorder { id, .. }
            | Self::Reparent { id, .. }
            | Self::SetOwner { id, .. }
            | Self::ErrorsAndWarnings { id, .. }
            | Self::SubtreeMode { id, .. } => *id,
        }
    }
}

/// Operations as delivered by the hook: either the flat numeric encoding or
/// already-structured records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationsPayload {
    Encoded(Vec<i64>),
    Records(Vec<RawOperation>),
}

impl OperationsPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Encoded(words) => words.is_empty(),
            Self::Records(records) => records.is_empty(),
        }
    }
}

/// Payload of an `operations` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationsBatch {
    pub renderer_id: RendererId,
    pub operations: OperationsPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_record_from_json() {
        let json = r#"{"op":"add","id":1,"parentId":0,"depth":0,"name":"Root"}"#;
        let op: RawOperation = serde_json::from_str(json).unwrap();
        assert_eq!(
            op,
            RawOperation::Add {
                id: FiberId(1),
                parent_id: 0,
                owner_id: 0,
                depth: Some(0),
                name: "Root".into(),
                key: None,
                element_type: 0,
            }
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let json = r#"{"op":"teleport","id":1}"#;
        assert!(serde_json::from_str::<RawOperation>(json).is_err());
    }

    #[test]
    fn payload_accepts_both_shapes() {
        let encoded: OperationsPayload = serde_json::from_str("[1, 1, 0]").unwrap();
        assert!(matches!(encoded, OperationsPayload::Encoded(ref w) if w.len() == 3));

        let records: OperationsPayload =
            serde_json::from_str(r#"[{"op":"remove","id":3}]"#).unwrap();
        assert!(matches!(records, OperationsPayload::Records(ref r) if r.len() == 1));
    }
}
