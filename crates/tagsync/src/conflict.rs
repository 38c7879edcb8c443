#![forbid(unsafe_code)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::inventory::TagIndex;

/// A tag that both registries carry, each under a different digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub tag: String,
    pub source_digest: String,
    pub destination_digest: String,
}

/// Ordered, deduplicated set of conflicting tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictSet {
    entries: IndexMap<String, Conflict>,
}

impl ConflictSet {
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Option<&Conflict> {
        self.entries.get(tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.entries.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn record(&mut self, conflict: Conflict) {
        if !self.entries.contains_key(&conflict.tag) {
            self.entries.insert(conflict.tag.clone(), conflict);
        }
    }
}

impl<'a> IntoIterator for &'a ConflictSet {
    type Item = &'a Conflict;
    type IntoIter = indexmap::map::Values<'a, String, Conflict>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

/// Find every tag present in both indexes whose digests differ.
///
/// Both directions are walked so the result does not depend on which side
/// happens to hold more tags; tags seen from the source side come first.
pub fn detect_conflicts(source: &TagIndex, destination: &TagIndex) -> ConflictSet {
    let mut conflicts = ConflictSet::default();

    for (tag, source_digest) in source {
        if let Some(destination_digest) = destination.get(tag)
            && destination_digest != source_digest
        {
            warn!(
                tag = %tag,
                source_digest = %source_digest,
                destination_digest = %destination_digest,
                "tag points to different digests"
            );
            conflicts.record(Conflict {
                tag: tag.clone(),
                source_digest: source_digest.clone(),
                destination_digest: destination_digest.clone(),
            });
        }
    }

    for (tag, destination_digest) in destination {
        if conflicts.contains(tag) {
            continue;
        }
        if let Some(source_digest) = source.get(tag)
            && source_digest != destination_digest
        {
            warn!(
                tag = %tag,
                source_digest = %source_digest,
                destination_digest = %destination_digest,
                "tag points to different digests"
            );
            conflicts.record(Conflict {
                tag: tag.clone(),
                source_digest: source_digest.clone(),
                destination_digest: destination_digest.clone(),
            });
        }
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(pairs: &[(&str, &str)]) -> TagIndex {
        pairs
            .iter()
            .map(|(tag, digest)| (tag.to_string(), digest.to_string()))
            .collect()
    }

    #[test]
    fn differing_digest_is_a_conflict() {
        let source = index(&[("v3", "sha1"), ("v4", "sha4")]);
        let destination = index(&[("v3", "sha2"), ("v4", "sha4")]);
        let conflicts = detect_conflicts(&source, &destination);
        assert_eq!(conflicts.len(), 1);
        let conflict = conflicts.get("v3").expect("v3 conflict");
        assert_eq!(conflict.source_digest, "sha1");
        assert_eq!(conflict.destination_digest, "sha2");
    }

    #[test]
    fn one_sided_tags_never_conflict() {
        let source = index(&[("only_source", "sha1")]);
        let destination = index(&[("only_destination", "sha2")]);
        assert!(detect_conflicts(&source, &destination).is_empty());
    }

    #[test]
    fn detection_is_symmetric() {
        let source = index(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let destination = index(&[("d", "40"), ("c", "3"), ("a", "10"), ("e", "5")]);
        let forward = detect_conflicts(&source, &destination);
        let backward = detect_conflicts(&destination, &source);

        let mut forward_tags: Vec<_> = forward.tags().collect();
        let mut backward_tags: Vec<_> = backward.tags().collect();
        forward_tags.sort();
        backward_tags.sort();
        assert_eq!(forward_tags, ["a", "d"]);
        assert_eq!(forward_tags, backward_tags);
    }

    #[test]
    fn order_follows_source_index() {
        let source = index(&[("z", "1"), ("m", "2"), ("a", "3")]);
        let destination = index(&[("a", "x"), ("m", "y"), ("z", "w")]);
        let conflicts = detect_conflicts(&source, &destination);
        let tags: Vec<_> = conflicts.tags().collect::<Vec<_>>();
        assert_eq!(tags, ["z", "m", "a"]);
    }
}
