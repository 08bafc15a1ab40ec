//! Reconstructs a commit-by-commit history of a component tree from the
//! mutation notifications its renderer emits.
//!
//! Notifications flow through the [`bridge::Bridge`], which decodes them
//! with the [`parsers`] and publishes structured messages. A
//! [`model::CommitStore`] rebuilds the fiber map and commit list from those
//! messages and answers queries over them.

pub mod bridge;
pub mod config;
pub mod model;
pub mod parsers;
pub mod recording;

pub use bridge::{AttachState, Bridge, BridgeError};
pub use config::{BridgeConfig, Config, ConfigError, StoreConfig};
pub use model::{CommitStore, Grouping, Liveness, StoreError};
pub use recording::{Recording, RecordingError};
