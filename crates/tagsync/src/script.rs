#![forbid(unsafe_code)]

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::conflict::ConflictSet;
use crate::error::{Result, TagSyncError};
use crate::gap::TransferPlan;

/// Registry coordinates used when rendering the transfer script.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// Repository pulled from, e.g. `docker.io/lsstsqre/sciplat-lab`.
    pub source_repository: String,
    /// Repository pushed to, e.g. `ghcr.io/lsst-sqre/sciplat-lab`.
    pub destination_repository: String,
    pub source_label: String,
    pub destination_label: String,
    /// Conflicting tags are pushed as `<prefix><tag>_<suffix>`.
    pub conflict_prefix: String,
    pub conflict_suffix: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            source_repository: "docker.io/lsstsqre/sciplat-lab".to_string(),
            destination_repository: "ghcr.io/lsst-sqre/sciplat-lab".to_string(),
            source_label: "Docker Hub".to_string(),
            destination_label: "ghcr.io".to_string(),
            conflict_prefix: "exp_".to_string(),
            conflict_suffix: "docker_io".to_string(),
        }
    }
}

impl ScriptSettings {
    /// Name a conflicting tag is pushed under so the destination's own tag
    /// stays untouched.
    pub fn disambiguated(&self, tag: &str) -> String {
        format!("{}{}_{}", self.conflict_prefix, tag, self.conflict_suffix)
    }
}

/// Docker reference tag grammar: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`.
pub fn is_safe_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    tag.len() <= 128
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn ensure_safe(tag: &str) -> Result<()> {
    if is_safe_tag(tag) {
        Ok(())
    } else {
        Err(TagSyncError::UnsafeTag {
            tag: tag.to_string(),
        })
    }
}

fn push_block(
    out: &mut String,
    number: usize,
    settings: &ScriptSettings,
    tag: &str,
    target: &str,
) -> fmt::Result {
    let src = &settings.source_repository;
    let dst = &settings.destination_repository;
    writeln!(out, "# {number}")?;
    writeln!(out, "docker pull {src}:{tag}")?;
    writeln!(out, "docker tag {src}:{tag} {dst}:{target}")?;
    writeln!(out, "docker push {dst}:{target}")?;
    writeln!(out, "docker rmi -f {src}:{tag}")?;
    writeln!(out, "docker rmi -f {dst}:{target}")?;
    writeln!(out, "docker image prune -f")?;
    writeln!(out, "docker builder prune -f\n")
}

/// Render the POSIX shell script that performs the transfer plan.
///
/// Blocks are numbered from 1: plan tags first, in plan order, then the
/// conflicting tags pushed under their disambiguated names. Blank
/// conflicting tags are never pulled.
pub fn render_transfer_script(
    plan: &TransferPlan,
    conflicts: &ConflictSet,
    settings: &ScriptSettings,
) -> Result<String> {
    let mut out = String::from("#!/bin/sh\n\n");
    writeln!(
        out,
        "# Copy docker tags from {} to {}\n",
        settings.source_label, settings.destination_label
    )?;

    let mut number = 1;
    for tag in plan.tag_names() {
        ensure_safe(tag)?;
        push_block(&mut out, number, settings, tag, tag)?;
        number += 1;
    }
    for tag in conflicts.tags() {
        if tag.trim().is_empty() {
            warn!(tag = ?tag, "skipping blank conflicting tag");
            continue;
        }
        ensure_safe(tag)?;
        let target = settings.disambiguated(tag);
        push_block(&mut out, number, settings, tag, &target)?;
        number += 1;
    }

    out.push_str("# That's all, folks.\n");
    Ok(out)
}
