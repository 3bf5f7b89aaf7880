//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{GenerateCommand, UniqueTagsCommand};
use std::ffi::OsString;

/// Generate Argo workflows for gordo projects
#[derive(Debug, Parser, Clone)]
#[command(name = "gordo-workflow")]
#[command(version)]
#[command(about = "Compile gordo machine configs into Argo workflows", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Generate the workflow document for a machine config
    Generate(GenerateCommand),

    /// List the distinct sensor tags of a machine config
    UniqueTags(UniqueTagsCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
