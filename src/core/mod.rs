//! Core domain models for gordo machine configs
//!
//! Everything needed to turn a config document into fully resolved
//! [`MachineSpec`]s: defaults, layered overrides, resource quantities,
//! timestamps, tags and owner references.

pub mod config;
pub mod error;
pub mod globals;
pub mod machine;
pub mod merge;
pub mod owner;
pub mod resources;
pub mod tags;
pub mod timestamp;

pub use config::{NormalizedConfig, RawConfig};
pub use error::ConfigError;
pub use globals::{GlobalOptions, LogLevel};
pub use machine::MachineSpec;
pub use owner::OwnerReference;
pub use tags::{PrefixTagResolver, SensorTag, TagResolver};
