#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tagsync::detect_conflicts;

use crate::config::ResolvedConfig;

#[derive(Debug, Clone, Default, Parser)]
pub struct ConflictsArgs {}

pub fn handle(
    _args: ConflictsArgs,
    json: bool,
    root: &Path,
    resolved: &ResolvedConfig,
) -> Result<()> {
    let (source, destination) = super::load_inventories(root, &resolved.config)?;
    let conflicts = detect_conflicts(source.by_tag(), destination.by_tag());

    if json {
        let entries: Vec<_> = conflicts.iter().collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("no conflicting tags");
    }
    for conflict in &conflicts {
        println!(
            "tag {} is {} at {} but {} at {}",
            conflict.tag,
            conflict.destination_digest,
            destination.name(),
            conflict.source_digest,
            source.name()
        );
    }
    Ok(())
}
