#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TagSyncError};

/// Ordered digest -> tags mapping, in inventory document order.
pub type DigestIndex = IndexMap<String, Vec<String>>;

/// Ordered tag -> digest mapping, inverted from a [`DigestIndex`].
pub type TagIndex = IndexMap<String, String>;

/// How the loader treats one inventory listing the same tag under two digests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateTagPolicy {
    /// Fail the load with [`TagSyncError::DuplicateTag`].
    #[default]
    Reject,
    /// Keep the digest seen last and log a warning.
    LastWins,
}

/// Raw `{"data": {<digest>: {"tags": [...]}}}` document.
#[derive(Debug, Deserialize)]
struct InventoryDocument {
    data: IndexMap<String, DigestEntry>,
}

#[derive(Debug, Deserialize)]
struct DigestEntry {
    tags: Vec<String>,
}

/// Tag inventory of one registry, indexed both ways.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryInventory {
    name: String,
    by_digest: DigestIndex,
    by_tag: TagIndex,
}

impl RegistryInventory {
    /// Build an inventory from an ordered digest -> tags mapping.
    pub fn from_digests(
        name: impl Into<String>,
        by_digest: DigestIndex,
        policy: DuplicateTagPolicy,
    ) -> Result<Self> {
        let name = name.into();
        let mut by_tag = TagIndex::new();
        for (digest, tags) in &by_digest {
            for tag in tags {
                match by_tag.insert(tag.clone(), digest.clone()) {
                    Some(previous) if previous != *digest => match policy {
                        DuplicateTagPolicy::Reject => {
                            return Err(TagSyncError::DuplicateTag {
                                registry: name,
                                tag: tag.clone(),
                                first: previous,
                                second: digest.clone(),
                            });
                        }
                        DuplicateTagPolicy::LastWins => {
                            warn!(
                                registry = %name,
                                tag = %tag,
                                dropped = %previous,
                                kept = %digest,
                                "tag listed under two digests; keeping the later one"
                            );
                        }
                    },
                    _ => {}
                }
            }
        }
        debug!(
            registry = %name,
            digests = by_digest.len(),
            tags = by_tag.len(),
            "indexed inventory"
        );
        Ok(Self {
            name,
            by_digest,
            by_tag,
        })
    }

    /// Parse an inventory document held in memory.
    pub fn from_json_str(
        name: impl Into<String>,
        raw: &str,
        policy: DuplicateTagPolicy,
    ) -> Result<Self> {
        let doc: InventoryDocument = serde_json::from_str(raw)?;
        Self::from_document(name, doc, policy)
    }

    /// Read and parse an inventory document from disk.
    pub fn load(name: impl Into<String>, path: &Path, policy: DuplicateTagPolicy) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| TagSyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: InventoryDocument =
            serde_json::from_str(&raw).map_err(|source| TagSyncError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_document(name, doc, policy)
    }

    fn from_document(
        name: impl Into<String>,
        doc: InventoryDocument,
        policy: DuplicateTagPolicy,
    ) -> Result<Self> {
        let by_digest = doc
            .data
            .into_iter()
            .map(|(digest, entry)| (digest, entry.tags))
            .collect();
        Self::from_digests(name, by_digest, policy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn by_digest(&self) -> &DigestIndex {
        &self.by_digest
    }

    pub fn by_tag(&self) -> &TagIndex {
        &self.by_tag
    }

    pub fn digest_of(&self, tag: &str) -> Option<&str> {
        self.by_tag.get(tag).map(String::as_str)
    }

    pub fn tags_of(&self, digest: &str) -> Option<&[String]> {
        self.by_digest.get(digest).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "data": {
            "sha256:bbb": {"tags": ["w_2024_01", "latest_weekly"], "size": 12},
            "sha256:aaa": {"tags": ["r27_0_0"], "created": "yesterday"},
            "sha256:ccc": {"tags": []}
        }
    }"#;

    #[test]
    fn keeps_document_order_and_inverts_tags() {
        let inv = RegistryInventory::from_json_str("docker.io", DOC, DuplicateTagPolicy::Reject)
            .expect("inventory");
        let digests: Vec<_> = inv.by_digest().keys().cloned().collect();
        assert_eq!(digests, ["sha256:bbb", "sha256:aaa", "sha256:ccc"]);
        assert_eq!(inv.digest_of("latest_weekly"), Some("sha256:bbb"));
        assert_eq!(inv.digest_of("r27_0_0"), Some("sha256:aaa"));
        assert_eq!(inv.tags_of("sha256:ccc"), Some(&[][..]));
        assert_eq!(inv.by_tag().len(), 3);
    }

    #[test]
    fn missing_data_key_is_rejected() {
        let raw = r#"{"items": {}}"#;
        let err = RegistryInventory::from_json_str("ghcr.io", raw, Default::default()).unwrap_err();
        assert!(matches!(err, TagSyncError::Serde(_)));
    }

    #[test]
    fn missing_tags_key_is_rejected() {
        let raw = r#"{"data": {"sha256:aaa": {"labels": []}}}"#;
        assert!(RegistryInventory::from_json_str("ghcr.io", raw, Default::default()).is_err());
    }

    #[test]
    fn self_conflict_rejected_by_default() {
        let raw = r#"{"data": {"sha256:a": {"tags": ["v1"]}, "sha256:b": {"tags": ["v1"]}}}"#;
        let err = RegistryInventory::from_json_str("ghcr.io", raw, DuplicateTagPolicy::Reject)
            .unwrap_err();
        match err {
            TagSyncError::DuplicateTag {
                registry,
                tag,
                first,
                second,
            } => {
                assert_eq!(registry, "ghcr.io");
                assert_eq!(tag, "v1");
                assert_eq!(first, "sha256:a");
                assert_eq!(second, "sha256:b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_conflict_last_wins_when_allowed() {
        let raw = r#"{"data": {"sha256:a": {"tags": ["v1", "v2"]}, "sha256:b": {"tags": ["v1"]}}}"#;
        let inv = RegistryInventory::from_json_str("ghcr.io", raw, DuplicateTagPolicy::LastWins)
            .expect("inventory");
        assert_eq!(inv.digest_of("v1"), Some("sha256:b"));
        // overwritten keys keep their first position
        let tags: Vec<_> = inv.by_tag().keys().cloned().collect();
        assert_eq!(tags, ["v1", "v2"]);
    }

    #[test]
    fn repeated_tag_under_same_digest_is_not_a_conflict() {
        let raw = r#"{"data": {"sha256:a": {"tags": ["v1", "v1"]}}}"#;
        let inv = RegistryInventory::from_json_str("ghcr.io", raw, DuplicateTagPolicy::Reject)
            .expect("inventory");
        assert_eq!(inv.by_tag().len(), 1);
    }
}
