#![forbid(unsafe_code)]

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tagsync::{reconcile, render_artifacts, write_artifacts};
use tracing::info;

use crate::config::ResolvedConfig;

#[derive(Debug, Clone, Default, Parser)]
pub struct PlanArgs {
    /// Reconcile and render every output without writing any file
    #[arg(long)]
    pub dry_run: bool,
}

pub fn handle(args: PlanArgs, json: bool, root: &Path, resolved: &ResolvedConfig) -> Result<()> {
    let config = &resolved.config;
    info!(
        dir = %root.display(),
        source = %config.source.name,
        destination = %config.destination.name,
        dry_run = args.dry_run,
        "planning tag transfer"
    );

    let (source, destination) = super::load_inventories(root, config)?;
    let outcome = reconcile(source, destination, &config.reconcile_options())?;
    let options = config.artifact_options(root);

    let outputs: Vec<String> = if args.dry_run {
        let rendered = render_artifacts(&outcome, &options)?;
        info!(artifacts = rendered.len(), "dry-run complete; no files written");
        Vec::new()
    } else {
        write_artifacts(&outcome, &options)?
            .iter()
            .map(|path| path.display().to_string())
            .collect()
    };

    let transfers: Vec<&str> = outcome.plan.tag_names().collect();
    let conflicts: Vec<&str> = outcome.conflicts.tags().collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "status": "ok",
                "source": outcome.source.name(),
                "destination": outcome.destination.name(),
                "transfers": transfers,
                "conflicts": conflicts,
                "written": outputs,
                "dry_run": args.dry_run,
            }))?
        );
    } else {
        println!(
            "{} tag(s) to transfer, {} conflicting tag(s) from {} to {}",
            transfers.len(),
            conflicts.len(),
            outcome.source.name(),
            outcome.destination.name()
        );
        if !args.dry_run {
            println!("wrote {}", options.paths.script.display());
        }
    }

    Ok(())
}
