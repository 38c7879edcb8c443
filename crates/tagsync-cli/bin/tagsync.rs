use clap::Parser;
use tagsync_cli::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env_filter = cli::resolve_env_filter(&cli);
    tagsync_cli::telemetry::install(&env_filter, cli.json)?;
    cli::run_with_cli(cli)
}
