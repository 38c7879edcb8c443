#![forbid(unsafe_code)]

pub mod artifacts;
pub mod conflict;
pub mod error;
pub mod gap;
pub mod inventory;
pub mod reconcile;
pub mod script;

pub use artifacts::{ArtifactOptions, ArtifactPaths, render_artifacts, write_artifacts};
pub use conflict::{Conflict, ConflictSet, detect_conflicts};
pub use error::{Result, TagSyncError};
pub use gap::{GapDecision, TagFilter, TransferPlan, TransferTag, analyze_gaps};
pub use inventory::{DuplicateTagPolicy, RegistryInventory};
pub use reconcile::{ConflictPolicy, NeedsFormat, ReconcileOptions, Reconciliation, reconcile};
pub use script::{ScriptSettings, render_transfer_script};
