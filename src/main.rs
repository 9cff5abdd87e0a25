//! # inrepo-triggers CLI
//!
//! Binary entry point for the `inrepo-triggers` command-line tool. It parses
//! arguments with `clap`, runs the selected command and reports top-level
//! errors. All trigger handling lives in the `inrepo_triggers` library.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
