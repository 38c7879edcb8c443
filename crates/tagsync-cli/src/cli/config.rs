#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;

use crate::config::ResolvedConfig;

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {}

pub fn handle(_args: ConfigArgs, json: bool, resolved: &ResolvedConfig) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&resolved.as_json())?);
    } else {
        print!("{resolved}");
    }
    Ok(())
}
