#![forbid(unsafe_code)]

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tagsync::{
    ArtifactOptions, ArtifactPaths, ConflictPolicy, DuplicateTagPolicy, NeedsFormat,
    ReconcileOptions, ScriptSettings, TagFilter, gap::DEFAULT_RESERVED_PREFIXES,
};

/// Default config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "tagsync.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagSyncConfig {
    pub source: RegistryConfig,
    pub destination: RegistryConfig,
    pub plan: PlanConfig,
}

/// One side of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Short registry name used in logs and errors.
    pub name: String,
    /// Inventory document to read.
    pub inventory: PathBuf,
    /// Image repository used in the transfer script.
    pub repository: String,
    /// Human label used in the script header.
    pub label: String,
    pub by_tag: PathBuf,
    pub by_sha: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanConfig {
    pub needs: PathBuf,
    pub script: PathBuf,
    pub conflict_policy: ConflictPolicy,
    pub needs_format: NeedsFormat,
    pub duplicate_tags: DuplicateTagPolicy,
    pub reserved_prefixes: Vec<String>,
    pub conflict_prefix: String,
    pub conflict_suffix: String,
}

impl Default for TagSyncConfig {
    fn default() -> Self {
        let paths = ArtifactPaths::default();
        let script = ScriptSettings::default();
        Self {
            source: RegistryConfig {
                name: "docker.io".to_string(),
                inventory: PathBuf::from("docker.io.contents.json"),
                repository: script.source_repository,
                label: script.source_label,
                by_tag: paths.source_by_tag,
                by_sha: paths.source_by_sha,
            },
            destination: RegistryConfig {
                name: "ghcr.io".to_string(),
                inventory: PathBuf::from("ghcr.io.contents.json"),
                repository: script.destination_repository,
                label: script.destination_label,
                by_tag: paths.destination_by_tag,
                by_sha: paths.destination_by_sha,
            },
            plan: PlanConfig {
                needs: paths.needs,
                script: paths.script,
                conflict_policy: ConflictPolicy::default(),
                needs_format: NeedsFormat::default(),
                duplicate_tags: DuplicateTagPolicy::default(),
                reserved_prefixes: DEFAULT_RESERVED_PREFIXES
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
                conflict_prefix: script.conflict_prefix,
                conflict_suffix: script.conflict_suffix,
            },
        }
    }
}

impl TagSyncConfig {
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            conflict_policy: self.plan.conflict_policy,
            filter: TagFilter::new(self.plan.reserved_prefixes.iter().cloned()),
        }
    }

    /// Output locations and script settings, with relative paths under `root`.
    pub fn artifact_options(&self, root: &Path) -> ArtifactOptions {
        let paths = ArtifactPaths {
            source_by_tag: self.source.by_tag.clone(),
            source_by_sha: self.source.by_sha.clone(),
            destination_by_tag: self.destination.by_tag.clone(),
            destination_by_sha: self.destination.by_sha.clone(),
            needs: self.plan.needs.clone(),
            script: self.plan.script.clone(),
        };
        ArtifactOptions {
            paths: paths.under(root),
            needs_format: self.plan.needs_format,
            script: ScriptSettings {
                source_repository: self.source.repository.clone(),
                destination_repository: self.destination.repository.clone(),
                source_label: self.source.label.clone(),
                destination_label: self.destination.label.clone(),
                conflict_prefix: self.plan.conflict_prefix.clone(),
                conflict_suffix: self.plan.conflict_suffix.clone(),
            },
        }
    }
}

/// Values supplied on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub conflict_policy: Option<ConflictPolicy>,
    pub needs_format: Option<NeedsFormat>,
    pub duplicate_tags: Option<DuplicateTagPolicy>,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Provenance {
    pub file: Option<PathBuf>,
    pub file_keys: Vec<String>,
    pub cli_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: TagSyncConfig,
    pub provenance: Provenance,
}

impl ResolvedConfig {
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "config": self.config,
            "provenance": self.provenance,
        })
    }
}

impl fmt::Display for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provenance.file {
            Some(path) => writeln!(f, "# config file: {}", path.display())?,
            None => writeln!(f, "# config file: none (built-in defaults)")?,
        }
        for key in &self.provenance.file_keys {
            writeln!(f, "# from file: {key}")?;
        }
        for key in &self.provenance.cli_keys {
            writeln!(f, "# from command line: {key}")?;
        }
        let body = toml::to_string_pretty(&self.config).map_err(|_| fmt::Error)?;
        write!(f, "{body}")
    }
}

/// Layer built-in defaults, the optional config file, then CLI overrides.
///
/// An explicit `config_path` must exist; the implicit `tagsync.toml` under
/// `root` is optional.
pub fn resolve_config(
    root: &Path,
    config_path: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<ResolvedConfig> {
    let mut provenance = Provenance::default();
    let mut table = toml::Table::try_from(TagSyncConfig::default())
        .context("failed to encode default configuration")?;

    let file = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let implicit = root.join(CONFIG_FILE_NAME);
            implicit.is_file().then_some(implicit)
        }
    };

    if let Some(path) = file {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let overlay: toml::Table = raw
            .parse()
            .with_context(|| format!("{} is not valid TOML", path.display()))?;
        merge_tables(&mut table, overlay, "", &mut provenance.file_keys);
        provenance.file = Some(path);
    }

    let mut config: TagSyncConfig = table
        .try_into()
        .context("configuration does not match the expected schema")?;

    if let Some(policy) = overrides.conflict_policy {
        config.plan.conflict_policy = policy;
        provenance.cli_keys.push("plan.conflict_policy".to_string());
    }
    if let Some(format) = overrides.needs_format {
        config.plan.needs_format = format;
        provenance.cli_keys.push("plan.needs_format".to_string());
    }
    if let Some(policy) = overrides.duplicate_tags {
        config.plan.duplicate_tags = policy;
        provenance.cli_keys.push("plan.duplicate_tags".to_string());
    }

    Ok(ResolvedConfig { config, provenance })
}

fn merge_tables(
    base: &mut toml::Table,
    overlay: toml::Table,
    prefix: &str,
    keys: &mut Vec<String>,
) {
    for (key, value) in overlay {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested, &path, keys);
            }
            (_, value) => {
                base.insert(key, value);
                keys.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file() {
        let temp = TempDir::new().expect("temp dir");
        let resolved =
            resolve_config(temp.path(), None, &CliOverrides::default()).expect("resolve");
        assert_eq!(resolved.config, TagSyncConfig::default());
        assert!(resolved.provenance.file.is_none());
        assert_eq!(resolved.config.plan.conflict_policy, ConflictPolicy::Exclude);
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[source]\nrepository = \"quay.io/example/lab\"\n\n\
             [plan]\nneeds_format = \"by-digest\"\n",
        )
        .expect("write config");

        let resolved =
            resolve_config(temp.path(), None, &CliOverrides::default()).expect("resolve");
        assert_eq!(resolved.config.source.repository, "quay.io/example/lab");
        assert_eq!(resolved.config.source.name, "docker.io");
        assert_eq!(resolved.config.plan.needs_format, NeedsFormat::ByDigest);
        assert_eq!(
            resolved.provenance.file_keys,
            ["plan.needs_format", "source.repository"]
        );
    }

    #[test]
    fn cli_overrides_win() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[plan]\nconflict_policy = \"exclude\"\n",
        )
        .expect("write config");
        let overrides = CliOverrides {
            conflict_policy: Some(ConflictPolicy::Fatal),
            ..Default::default()
        };
        let resolved = resolve_config(temp.path(), None, &overrides).expect("resolve");
        assert_eq!(resolved.config.plan.conflict_policy, ConflictPolicy::Fatal);
        assert_eq!(resolved.provenance.cli_keys, ["plan.conflict_policy"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp = TempDir::new().expect("temp dir");
        fs::write(temp.path().join(CONFIG_FILE_NAME), "[plan]\nneed = \"x.json\"\n")
            .expect("write config");
        assert!(resolve_config(temp.path(), None, &CliOverrides::default()).is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = TempDir::new().expect("temp dir");
        let missing = temp.path().join("nope.toml");
        assert!(resolve_config(temp.path(), Some(&missing), &CliOverrides::default()).is_err());
    }

    #[test]
    fn artifact_paths_resolve_under_root() {
        let config = TagSyncConfig::default();
        let options = config.artifact_options(Path::new("/srv/mirror"));
        assert_eq!(
            options.paths.script,
            PathBuf::from("/srv/mirror/transfer-tags.sh")
        );
        assert_eq!(options.script.conflict_suffix, "docker_io");
    }
}
