#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::conflict::ConflictSet;
use crate::inventory::DigestIndex;

/// Prefixes of synthetic or floating tags that are never copied mechanically.
pub const DEFAULT_RESERVED_PREFIXES: &[&str] = &["exp_", "latest_", "recommended"];

/// Decides which source tags are eligible for transfer at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagFilter {
    reserved_prefixes: Vec<String>,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVED_PREFIXES.iter().copied())
    }
}

impl TagFilter {
    pub fn new<I, S>(reserved_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved_prefixes: reserved_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reserved_prefixes(&self) -> &[String] {
        &self.reserved_prefixes
    }

    /// Return why `tag` is skipped, or `None` when it may be transferred.
    pub fn skip_reason(&self, tag: &str, conflicts: &ConflictSet) -> Option<SkipReason> {
        if tag.trim().is_empty() {
            return Some(SkipReason::Blank);
        }
        if conflicts.contains(tag) {
            return Some(SkipReason::Conflicting);
        }
        self.reserved_prefixes
            .iter()
            .find(|prefix| tag.starts_with(prefix.as_str()))
            .map(|prefix| SkipReason::ReservedPrefix(prefix.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "prefix")]
pub enum SkipReason {
    Blank,
    Conflicting,
    ReservedPrefix(String),
    /// Already planned from an earlier digest or list entry.
    Duplicate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    /// The destination does not know the digest at all.
    DigestMissing,
    /// The destination has the digest but not under this tag.
    TagMissing,
}

/// Outcome for a single source tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GapDecision {
    Skip(SkipReason),
    Transfer(TransferReason),
    InSync,
}

impl fmt::Display for GapDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapDecision::Skip(SkipReason::Blank) => f.write_str("skip: blank tag"),
            GapDecision::Skip(SkipReason::Conflicting) => f.write_str("skip: conflicting digest"),
            GapDecision::Skip(SkipReason::ReservedPrefix(prefix)) => {
                write!(f, "skip: reserved prefix `{prefix}`")
            }
            GapDecision::Skip(SkipReason::Duplicate) => f.write_str("skip: already planned"),
            GapDecision::Transfer(TransferReason::DigestMissing) => {
                f.write_str("transfer: digest missing at destination")
            }
            GapDecision::Transfer(TransferReason::TagMissing) => {
                f.write_str("transfer: tag missing for digest at destination")
            }
            GapDecision::InSync => f.write_str("in sync"),
        }
    }
}

/// A source tag that has to be copied to the destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTag {
    pub tag: String,
    pub digest: String,
    pub reason: TransferReason,
}

/// Tags to copy, in source inventory order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferPlan {
    pub tags: Vec<TransferTag>,
}

impl TransferPlan {
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|entry| entry.tag.as_str())
    }

    /// Missing tags grouped under their source digest.
    pub fn missing_by_digest(&self) -> IndexMap<String, Vec<String>> {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for entry in &self.tags {
            grouped
                .entry(entry.digest.clone())
                .or_default()
                .push(entry.tag.clone());
        }
        grouped
    }
}

/// Classify one source tag against the destination inventory.
pub fn classify_tag(
    tag: &str,
    digest: &str,
    destination: &DigestIndex,
    conflicts: &ConflictSet,
    filter: &TagFilter,
) -> GapDecision {
    if let Some(reason) = filter.skip_reason(tag, conflicts) {
        return GapDecision::Skip(reason);
    }
    match destination.get(digest) {
        None => GapDecision::Transfer(TransferReason::DigestMissing),
        Some(tags) if !tags.iter().any(|t| t == tag) => {
            GapDecision::Transfer(TransferReason::TagMissing)
        }
        Some(_) => GapDecision::InSync,
    }
}

/// Collect every source tag that is missing, or not co-located with the same
/// digest, at the destination.
pub fn analyze_gaps(
    source: &DigestIndex,
    destination: &DigestIndex,
    conflicts: &ConflictSet,
    filter: &TagFilter,
) -> TransferPlan {
    let mut plan = TransferPlan::default();
    let mut planned: HashSet<&str> = HashSet::new();

    for (digest, tags) in source {
        info!(digest = %digest, tags = ?tags, "considering digest");
        for tag in tags {
            let decision = match classify_tag(tag, digest, destination, conflicts, filter) {
                GapDecision::Transfer(_) if planned.contains(tag.as_str()) => {
                    GapDecision::Skip(SkipReason::Duplicate)
                }
                decision => decision,
            };
            info!(tag = %tag, digest = %digest, "{decision}");
            if let GapDecision::Transfer(reason) = decision {
                planned.insert(tag.as_str());
                plan.tags.push(TransferTag {
                    tag: tag.clone(),
                    digest: digest.clone(),
                    reason,
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::detect_conflicts;
    use crate::inventory::TagIndex;

    fn digests(entries: &[(&str, &[&str])]) -> DigestIndex {
        entries
            .iter()
            .map(|(digest, tags)| {
                (
                    digest.to_string(),
                    tags.iter().map(|t| t.to_string()).collect(),
                )
            })
            .collect()
    }

    fn invert(index: &DigestIndex) -> TagIndex {
        let mut tags = TagIndex::new();
        for (digest, names) in index {
            for name in names {
                tags.insert(name.clone(), digest.clone());
            }
        }
        tags
    }

    fn plan_for(source: &DigestIndex, destination: &DigestIndex) -> Vec<String> {
        let conflicts = detect_conflicts(&invert(source), &invert(destination));
        analyze_gaps(source, destination, &conflicts, &TagFilter::default())
            .tag_names()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn unknown_digest_transfers_unfiltered_tags_only() {
        let source = digests(&[("sha1", &["v1", "latest_v1"])]);
        let destination = digests(&[]);
        assert_eq!(plan_for(&source, &destination), ["v1"]);
    }

    #[test]
    fn matching_tag_and_digest_is_in_sync() {
        let source = digests(&[("sha1", &["v2"])]);
        let destination = digests(&[("sha1", &["v2"])]);
        assert!(plan_for(&source, &destination).is_empty());
    }

    #[test]
    fn conflicting_tag_is_excluded() {
        let source = digests(&[("sha1", &["v3"])]);
        let destination = digests(&[("sha2", &["v3"])]);
        let conflicts = detect_conflicts(&invert(&source), &invert(&destination));
        assert!(conflicts.contains("v3"));
        let plan = analyze_gaps(&source, &destination, &conflicts, &TagFilter::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn tag_missing_under_known_digest_transfers() {
        let source = digests(&[("sha1", &["v1", "v1_alias"])]);
        let destination = digests(&[("sha1", &["v1"])]);
        let conflicts = ConflictSet::default();
        let plan = analyze_gaps(&source, &destination, &conflicts, &TagFilter::default());
        assert_eq!(plan.tags.len(), 1);
        assert_eq!(plan.tags[0].tag, "v1_alias");
        assert_eq!(plan.tags[0].reason, TransferReason::TagMissing);
    }

    #[test]
    fn reserved_and_blank_tags_are_skipped() {
        let filter = TagFilter::default();
        let none = ConflictSet::default();
        assert_eq!(filter.skip_reason("", &none), Some(SkipReason::Blank));
        assert_eq!(filter.skip_reason("  ", &none), Some(SkipReason::Blank));
        assert_eq!(
            filter.skip_reason("exp_w_2023_01", &none),
            Some(SkipReason::ReservedPrefix("exp_".into()))
        );
        assert_eq!(
            filter.skip_reason("recommended", &none),
            Some(SkipReason::ReservedPrefix("recommended".into()))
        );
        assert_eq!(
            filter.skip_reason("recommended_old", &none),
            Some(SkipReason::ReservedPrefix("recommended".into()))
        );
        assert_eq!(filter.skip_reason("latest", &none), None);
        assert_eq!(filter.skip_reason("w_2023_exp_1", &none), None);
    }

    #[test]
    fn plan_follows_source_order() {
        let source = digests(&[
            ("sha9", &["z_last", "a_first"]),
            ("sha1", &["m_middle"]),
        ]);
        let destination = digests(&[("sha1", &["other"])]);
        assert_eq!(
            plan_for(&source, &destination),
            ["z_last", "a_first", "m_middle"]
        );
    }

    #[test]
    fn grouping_by_digest_keeps_order() {
        let source = digests(&[("sha2", &["b", "a"]), ("sha1", &["c"])]);
        let plan = analyze_gaps(
            &source,
            &DigestIndex::new(),
            &ConflictSet::default(),
            &TagFilter::default(),
        );
        let grouped = plan.missing_by_digest();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["sha2"], ["b", "a"]);
        assert_eq!(grouped["sha1"], ["c"]);
    }

    #[test]
    fn repeated_tag_is_planned_once() {
        let source = digests(&[("sha1", &["v1", "v1"]), ("sha2", &["v1"])]);
        let plan = analyze_gaps(
            &source,
            &DigestIndex::new(),
            &ConflictSet::default(),
            &TagFilter::default(),
        );
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tags[0].digest, "sha1");
    }

    #[test]
    fn custom_prefixes_replace_defaults() {
        let filter = TagFilter::new(["nightly_"]);
        let none = ConflictSet::default();
        assert_eq!(filter.skip_reason("exp_1", &none), None);
        assert_eq!(
            filter.skip_reason("nightly_7", &none),
            Some(SkipReason::ReservedPrefix("nightly_".into()))
        );
    }
}
