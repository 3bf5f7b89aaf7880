//! Machine configuration from YAML
//!
//! Two document shapes are accepted and converge on [`RawConfig`]:
//!
//! - legacy: `{machines: [...], globals: {...}}`
//! - CRD: `{apiVersion, kind: Gordo, metadata, spec: {config: {machines, globals}}}`

use crate::core::error::ConfigError;
use crate::core::globals::{GlobalOptions, RawGlobals};
use crate::core::machine::{is_dns_label, MachineSpec, RawMachine};
use crate::core::owner::OwnerReference;
use crate::core::tags::{unique_tags, SensorTag, TagResolver};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Machines and globals as written, before any resolution
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    pub machines: Vec<RawMachine>,
    #[serde(default)]
    pub globals: RawGlobals,
}

/// Adapter turning one document shape into a [`RawConfig`]
pub trait ConfigSource {
    fn name(&self) -> &'static str;

    /// Whether this adapter understands the document
    fn accepts(&self, document: &Value) -> bool;

    fn extract(&self, document: Value) -> Result<RawConfig, ConfigError>;
}

/// `{machines, globals}` at the top level
pub struct LegacyConfig;

impl ConfigSource for LegacyConfig {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn accepts(&self, document: &Value) -> bool {
        document.get("machines").is_some()
    }

    fn extract(&self, document: Value) -> Result<RawConfig, ConfigError> {
        Ok(serde_yaml::from_value(document)?)
    }
}

/// Custom resource with the config nested under `spec.config`
pub struct CrdConfig;

#[derive(Deserialize)]
struct CrdDocument {
    spec: CrdSpec,
}

#[derive(Deserialize)]
struct CrdSpec {
    config: RawConfig,
}

impl ConfigSource for CrdConfig {
    fn name(&self) -> &'static str {
        "crd"
    }

    fn accepts(&self, document: &Value) -> bool {
        document
            .get("spec")
            .and_then(|spec| spec.get("config"))
            .is_some_and(Value::is_mapping)
    }

    fn extract(&self, document: Value) -> Result<RawConfig, ConfigError> {
        let crd: CrdDocument = serde_yaml::from_value(document)?;
        Ok(crd.spec.config)
    }
}

impl RawConfig {
    /// Load a raw configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a raw configuration, picking the adapter by probing the document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let document: Value = serde_yaml::from_str(yaml)?;
        let sources: [&dyn ConfigSource; 2] = [&CrdConfig, &LegacyConfig];

        let source = sources
            .into_iter()
            .find(|source| source.accepts(&document))
            .ok_or_else(|| {
                ConfigError::UnknownShape(
                    "expected top-level 'machines' or 'spec.config' section".to_string(),
                )
            })?;

        debug!("Reading config with the {} adapter", source.name());
        source.extract(document)
    }

    /// Replace the globals' owner references with a YAML snippet, e.g. from the CLI.
    ///
    /// The snippet is validated together with the rest of the config.
    pub fn override_owner_references(&mut self, yaml: &str) -> Result<(), ConfigError> {
        self.globals.owner_references = Some(OwnerReference::parse_document(yaml)?);
        Ok(())
    }
}

/// Globals plus every machine, validated and fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConfig {
    pub project_name: String,
    pub globals: GlobalOptions,
    pub machines: Vec<MachineSpec>,
}

impl NormalizedConfig {
    /// Load and normalize a configuration file
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        project_name: &str,
        resolver: &dyn TagResolver,
    ) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::from_file(path)?, project_name, resolver)
    }

    /// Parse and normalize a configuration from a YAML string
    pub fn from_yaml(
        yaml: &str,
        project_name: &str,
        resolver: &dyn TagResolver,
    ) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::from_yaml(yaml)?, project_name, resolver)
    }

    /// Resolve every machine against the globals; the first invalid field fails the run
    pub fn from_raw(
        raw: RawConfig,
        project_name: &str,
        resolver: &dyn TagResolver,
    ) -> Result<Self, ConfigError> {
        if !is_dns_label(project_name) {
            return Err(ConfigError::InvalidProjectName(project_name.to_string()));
        }

        let globals = GlobalOptions::from_raw(&raw.globals)?;

        let mut seen = HashSet::new();
        let mut machines = Vec::with_capacity(raw.machines.len());
        for raw_machine in &raw.machines {
            let machine = MachineSpec::from_raw(raw_machine, &globals, project_name, resolver)?;
            if !seen.insert(machine.name.clone()) {
                return Err(ConfigError::DuplicateMachine(machine.name));
            }
            machines.push(machine);
        }

        if machines.is_empty() {
            warn!("Config for project {} declares no machines", project_name);
        }
        info!(
            "Normalized {} machine(s) for project {}",
            machines.len(),
            project_name
        );

        Ok(Self {
            project_name: project_name.to_string(),
            globals,
            machines,
        })
    }

    /// Machine names in config order
    pub fn machine_names(&self) -> Vec<&str> {
        self.machines.iter().map(|m| m.name.as_str()).collect()
    }

    /// Distinct sensor tags across all machines, in order of first appearance
    pub fn unique_tags(&self) -> Vec<SensorTag> {
        unique_tags(self.machines.iter().map(|m| m.dataset.tags.as_slice()))
    }
}
