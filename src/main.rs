use anyhow::{Context, Result};
use gordo_workflow::cli::commands::{GenerateCommand, UniqueTagsCommand};
use gordo_workflow::cli::output::*;
use gordo_workflow::cli::{Cli, Command};
use gordo_workflow::core::{NormalizedConfig, RawConfig};
use gordo_workflow::workflow::{compile, render};
use std::path::Path;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::from_args();

    // Logs go to stderr; stdout is reserved for the generated document
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Command::Generate(cmd) => generate(cmd),
        Command::UniqueTags(cmd) => unique_tags(cmd),
    };

    if let Err(e) = result {
        eprintln!("{}", format_error(&e));
        std::process::exit(1);
    }
}

fn generate(cmd: &GenerateCommand) -> Result<()> {
    let mut raw = RawConfig::from_file(&cmd.machine_config).with_context(|| {
        format!("Failed to load machine config {}", cmd.machine_config.display())
    })?;
    if let Some(owner_references) = &cmd.owner_references {
        raw.override_owner_references(owner_references)
            .context("Invalid --owner-references")?;
    }

    let config = NormalizedConfig::from_raw(raw, &cmd.project_name, &cmd.assets.resolver())
        .context("Invalid machine config")?;
    eprintln!("{}", format_config_summary(&config));
    if config.machines.is_empty() {
        eprintln!("{} No machines configured; only the cleanup task is generated", WARN);
    }

    let graph = compile(&config).context("Failed to compile workflow")?;
    let document = render(&graph).context("Failed to render workflow")?;
    eprintln!("{}", format_graph_summary(&graph));

    emit(&document, cmd.output_file.as_deref())
}

fn unique_tags(cmd: &UniqueTagsCommand) -> Result<()> {
    let raw = RawConfig::from_file(&cmd.machine_config).with_context(|| {
        format!("Failed to load machine config {}", cmd.machine_config.display())
    })?;

    // Tag listing does not depend on the project; any valid name will do
    let config = NormalizedConfig::from_raw(raw, "unique-tags", &cmd.assets.resolver())
        .context("Invalid machine config")?;

    let tags = config.unique_tags();
    eprintln!(
        "{} Found {} unique tag(s) across {} machine(s)",
        INFO,
        style(tags.len()).cyan(),
        config.machines.len()
    );

    emit(&format_tag_list(&tags, cmd.with_assets), cmd.output_file_tag_list.as_deref())
}

/// Write fully rendered output to a file, or stdout if none was given
fn emit(content: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", CHECK, style(path.display()).bold());
        }
        None => print!("{}", content),
    }
    Ok(())
}
