//! Workflow compilation and rendering

pub mod compiler;
pub mod dag;
pub mod render;

pub use compiler::compile;
pub use dag::{DagTask, NamedValue, Payload, TaskKind, Template, TemplateBody, WorkflowGraph};
pub use render::render;

use thiserror::Error;

/// Contract violations between the normalizer and the compiler
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Incomplete machine specification: {0}")]
    IncompleteSpecification(String),
}

/// Errors while serializing the workflow document
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
