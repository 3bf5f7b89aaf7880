//! gordo-workflow - generates Argo workflows from gordo machine configs

pub mod cli;
pub mod core;
pub mod workflow;

// Re-export commonly used types
pub use crate::core::{ConfigError, MachineSpec, NormalizedConfig, PrefixTagResolver, TagResolver};
pub use crate::workflow::{compile, render, CompileError, RenderError, WorkflowGraph};
