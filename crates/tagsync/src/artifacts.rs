#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TagSyncError};
use crate::reconcile::{NeedsFormat, Reconciliation};
use crate::script::{ScriptSettings, render_transfer_script};

/// File names of every document a run produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub source_by_tag: PathBuf,
    pub source_by_sha: PathBuf,
    pub destination_by_tag: PathBuf,
    pub destination_by_sha: PathBuf,
    pub needs: PathBuf,
    pub script: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            source_by_tag: PathBuf::from("dockerhub-by-tag.json"),
            source_by_sha: PathBuf::from("dockerhub-by-sha.json"),
            destination_by_tag: PathBuf::from("ghcr-by-tag.json"),
            destination_by_sha: PathBuf::from("ghcr-by-sha.json"),
            needs: PathBuf::from("ghcr-needs.json"),
            script: PathBuf::from("transfer-tags.sh"),
        }
    }
}

impl ArtifactPaths {
    /// Resolve relative paths against `dir`.
    pub fn under(&self, dir: &Path) -> Self {
        Self {
            source_by_tag: dir.join(&self.source_by_tag),
            source_by_sha: dir.join(&self.source_by_sha),
            destination_by_tag: dir.join(&self.destination_by_tag),
            destination_by_sha: dir.join(&self.destination_by_sha),
            needs: dir.join(&self.needs),
            script: dir.join(&self.script),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ArtifactOptions {
    pub paths: ArtifactPaths,
    pub needs_format: NeedsFormat,
    pub script: ScriptSettings,
}

/// A fully rendered output document, not yet on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

/// Pretty JSON with two-space indentation and alphabetically sorted keys.
fn sorted_json<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<String>
where
    K: Ord + Serialize,
    V: Serialize,
{
    let sorted: BTreeMap<K, V> = entries.into_iter().collect();
    Ok(serde_json::to_string_pretty(&sorted)?)
}

/// Render every output document in the order they are written.
pub fn render_artifacts(
    outcome: &Reconciliation,
    options: &ArtifactOptions,
) -> Result<Vec<Artifact>> {
    let paths = &options.paths;
    let needs = match options.needs_format {
        NeedsFormat::List => {
            let tags: Vec<&str> = outcome.plan.tag_names().collect();
            serde_json::to_string_pretty(&tags)?
        }
        NeedsFormat::ByDigest => sorted_json(outcome.plan.missing_by_digest())?,
    };

    Ok(vec![
        Artifact {
            path: paths.source_by_tag.clone(),
            contents: sorted_json(outcome.source.by_tag())?,
        },
        Artifact {
            path: paths.source_by_sha.clone(),
            contents: sorted_json(outcome.source.by_digest())?,
        },
        Artifact {
            path: paths.destination_by_tag.clone(),
            contents: sorted_json(outcome.destination.by_tag())?,
        },
        Artifact {
            path: paths.destination_by_sha.clone(),
            contents: sorted_json(outcome.destination.by_digest())?,
        },
        Artifact {
            path: paths.needs.clone(),
            contents: needs,
        },
        Artifact {
            path: paths.script.clone(),
            contents: render_transfer_script(&outcome.plan, &outcome.conflicts, &options.script)?,
        },
    ])
}

/// Render and write all outputs, replacing any previous run's files.
///
/// Nothing is written unless every document renders.
pub fn write_artifacts(
    outcome: &Reconciliation,
    options: &ArtifactOptions,
) -> Result<Vec<PathBuf>> {
    let artifacts = render_artifacts(outcome, options)?;
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        fs::write(&artifact.path, artifact.contents.as_bytes()).map_err(|source| {
            TagSyncError::Io {
                path: artifact.path.clone(),
                source,
            }
        })?;
        info!(path = %artifact.path.display(), "wrote artifact");
        written.push(artifact.path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_json_orders_keys_and_indents_two_spaces() {
        let rendered = sorted_json([("b", "2"), ("a", "1")]).expect("json");
        assert_eq!(rendered, "{\n  \"a\": \"1\",\n  \"b\": \"2\"\n}");
    }

    #[test]
    fn empty_map_renders_as_braces() {
        let rendered = sorted_json(Vec::<(String, String)>::new()).expect("json");
        assert_eq!(rendered, "{}");
    }

    #[test]
    fn paths_resolve_under_directory() {
        let paths = ArtifactPaths::default().under(Path::new("/work"));
        assert_eq!(paths.script, PathBuf::from("/work/transfer-tags.sh"));
        assert_eq!(paths.needs, PathBuf::from("/work/ghcr-needs.json"));
    }
}
