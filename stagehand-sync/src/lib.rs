//! # stagehand-sync
//!
//! Source → build tree mirroring.
//!
//! Call [`sync_tree`] to converge a build tree onto its source tree, or
//! [`mirror::plan`] + [`diff::diff_plan`] to preview the change set without
//! writing anything. [`lock::RunLock`] serializes runs against one build
//! tree and [`state`] keeps the last outcome per service.

pub mod diff;
pub mod error;
pub mod exclude;
pub mod lock;
pub mod mirror;
pub mod ops;
pub mod scan;
pub mod state;

pub use error::SyncError;
pub use exclude::{matches, ExclusionSet};
pub use mirror::{
    plan, sync_tree, sync_tree_with, ChangeReason, FailedEntry, FileOp, SyncOutcome, SyncPlan,
    SyncReport, SyncRequest,
};
pub use ops::{FileOps, LocalFs};
