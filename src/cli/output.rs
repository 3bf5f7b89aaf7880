//! CLI output formatting
//!
//! Status lines go to stderr; stdout only ever carries the generated document.

use crate::core::config::NormalizedConfig;
use crate::core::tags::SensorTag;
use crate::workflow::{TaskKind, WorkflowGraph};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");

/// One-line summary of a normalized config
pub fn format_config_summary(config: &NormalizedConfig) -> String {
    format!(
        "{} Loaded project {} with {} machine(s)",
        INFO,
        style(&config.project_name).bold(),
        style(config.machines.len()).cyan()
    )
}

/// One-line summary of a compiled workflow
pub fn format_graph_summary(graph: &WorkflowGraph) -> String {
    let clients = graph.task_names(TaskKind::Client).len();
    let sidecars = graph.task_names(TaskKind::MetricsSidecar).len();
    format!(
        "{} Generated {} task(s): {} model builder(s), {} metrics sidecar(s), {} client(s)",
        CHECK,
        style(graph.tasks.len()).cyan(),
        graph.task_names(TaskKind::ModelBuilder).len(),
        sidecars,
        clients
    )
}

/// Tag list as printed by `unique-tags`, one tag per line
pub fn format_tag_list(tags: &[SensorTag], with_assets: bool) -> String {
    tags.iter()
        .map(|tag| {
            if with_assets {
                format!("{}\t{}\n", tag.name, tag.asset.as_deref().unwrap_or(""))
            } else {
                format!("{}\n", tag.name)
            }
        })
        .collect()
}

/// Error chain for a failed run
pub fn format_error(error: &anyhow::Error) -> String {
    let mut out = format!("{} {}", CROSS, style(error).red());
    for cause in error.chain().skip(1) {
        out.push_str(&format!("\n  caused by: {}", cause));
    }
    out
}
