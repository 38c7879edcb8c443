#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::conflict::{ConflictSet, detect_conflicts};
use crate::error::{Result, TagSyncError};
use crate::gap::{TagFilter, TransferPlan, analyze_gaps};
use crate::inventory::RegistryInventory;

/// What to do with tags whose digests disagree between the registries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Keep going; conflicting tags are pushed under a disambiguated name.
    #[default]
    Exclude,
    /// Abort before any output is produced.
    Fatal,
}

/// Shape of the `needs` output document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeedsFormat {
    /// Array of tag names in transfer plan order.
    #[default]
    List,
    /// Sorted digest -> missing tags object.
    ByDigest,
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    pub conflict_policy: ConflictPolicy,
    pub filter: TagFilter,
}

/// Result of comparing a source inventory against its mirror.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub source: RegistryInventory,
    pub destination: RegistryInventory,
    pub conflicts: ConflictSet,
    pub plan: TransferPlan,
}

/// Detect conflicts, then find the tags the destination is missing.
pub fn reconcile(
    source: RegistryInventory,
    destination: RegistryInventory,
    options: &ReconcileOptions,
) -> Result<Reconciliation> {
    let conflicts = detect_conflicts(source.by_tag(), destination.by_tag());
    info!(
        count = conflicts.len(),
        tags = ?conflicts.tags().collect::<Vec<_>>(),
        "problematic tags"
    );

    if options.conflict_policy == ConflictPolicy::Fatal && !conflicts.is_empty() {
        return Err(TagSyncError::Conflicts {
            tags: conflicts.tags().map(str::to_owned).collect(),
        });
    }

    let plan = analyze_gaps(
        source.by_digest(),
        destination.by_digest(),
        &conflicts,
        &options.filter,
    );
    info!(
        source = %source.name(),
        destination = %destination.name(),
        transfers = plan.len(),
        conflicts = conflicts.len(),
        "reconciliation complete"
    );

    Ok(Reconciliation {
        source,
        destination,
        conflicts,
        plan,
    })
}
