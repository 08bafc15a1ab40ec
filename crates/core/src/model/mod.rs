pub mod commit;
pub mod fiber;
pub mod store;
pub mod tree;

pub use commit::{Commit, CommitBoundary, CommitStats};
pub use fiber::{FiberRecord, RenderTimings};
pub use store::{CommitStore, StoreError};
pub use tree::{Grouping, Liveness, TreeNode};
