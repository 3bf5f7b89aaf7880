//! Global options: built-in defaults layered with the config's `globals` section

use crate::core::error::ConfigError;
use crate::core::merge;
use crate::core::owner::OwnerReference;
use crate::core::resources::{QuantityPair, RawResources, ResourceBlock, ResourceOverrides};
use crate::core::timestamp::parse_timestamp;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

/// Default number of concurrently running clients
pub const DEFAULT_MAX_CLIENTS: u32 = 30;

/// Log level handed to every task through `GORDO_LOG_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Warning,
    Error,
    Critical,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Container image coordinates shared by all generated tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Images {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            registry: "docker.io".to_string(),
            repository: "equinor".to_string(),
            tag: "latest".to_string(),
        }
    }
}

impl Images {
    /// Fully qualified reference for one of the gordo images
    pub fn image(&self, name: &str) -> String {
        format!("{}/{}/{}:{}", self.registry, self.repository, name, self.tag)
    }
}

/// Data provider as a tagged variant: `type` plus provider-specific options
#[derive(Debug, Clone, PartialEq)]
pub struct DataProvider {
    pub kind: String,
    pub options: Mapping,
}

impl Default for DataProvider {
    fn default() -> Self {
        let mut options = Mapping::new();
        options.insert("threads".into(), 1.into());
        Self {
            kind: "DataLakeProvider".to_string(),
            options,
        }
    }
}

impl DataProvider {
    /// Layer a partial provider definition on top of this one.
    ///
    /// Options only carry over while the provider type stays the same; a
    /// different `type` replaces the provider wholesale.
    pub fn with_override(&self, overlay: &Value, scope: &str) -> Result<Self, ConfigError> {
        let map = overlay
            .as_mapping()
            .ok_or_else(|| ConfigError::missing(scope, "dataset.data_provider.type"))?;

        let mut options = map.clone();
        let kind = match options.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(ConfigError::missing(scope, "dataset.data_provider.type")),
            None => self.kind.clone(),
        };

        if kind == self.kind {
            options = merge::layered(&self.options, &[&options]);
        }
        Ok(Self { kind, options })
    }

    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert("type".into(), self.kind.clone().into());
        for (k, v) in &self.options {
            map.insert(k.clone(), v.clone());
        }
        Value::Mapping(map)
    }
}

/// Resolved runtime settings for one scope (globals or a single machine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub log_level: LogLevel,
    pub builder: ResourceBlock,
    pub server: ResourceBlock,
    pub client: ResourceBlock,
    pub influx: ResourceBlock,
    pub influx_enabled: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            builder: ResourceBlock::new(
                QuantityPair::new(3900, 1001),
                QuantityPair::new(31200, 32000),
            ),
            server: ResourceBlock::new(
                QuantityPair::new(3000, 1000),
                QuantityPair::new(6000, 2000),
            ),
            client: ResourceBlock::new(QuantityPair::new(3500, 100), QuantityPair::new(4000, 2000)),
            influx: ResourceBlock::new(
                QuantityPair::new(3000, 500),
                QuantityPair::new(12000, 4000),
            ),
            influx_enabled: true,
        }
    }
}

impl RuntimeOptions {
    pub fn with_overrides(&self, overrides: &RuntimeOverrides) -> Self {
        Self {
            log_level: overrides.log_level.unwrap_or(self.log_level),
            builder: self.builder.with_overrides(&overrides.builder),
            server: self.server.with_overrides(&overrides.server),
            client: self.client.with_overrides(&overrides.client),
            influx: self.influx.with_overrides(&overrides.influx),
            influx_enabled: overrides.influx_enabled.unwrap_or(self.influx_enabled),
        }
    }
}

/// Validated partial runtime settings; `None` inherits from the layer below
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeOverrides {
    pub log_level: Option<LogLevel>,
    pub builder: ResourceOverrides,
    pub server: ResourceOverrides,
    pub client: ResourceOverrides,
    pub influx: ResourceOverrides,
    pub influx_enabled: Option<bool>,
}

impl RuntimeOverrides {
    /// Overrides from the `globals.runtime` section
    pub fn from_raw(raw: &RawRuntime, scope: &str) -> Result<Self, ConfigError> {
        Self::resolve(
            raw.log_level.as_deref(),
            [&raw.builder.resources, &raw.server.resources, &raw.client.resources],
            &raw.influx,
            scope,
        )
    }

    /// Overrides from a machine's own `runtime` section
    pub fn from_machine(raw: &RawMachineRuntime, scope: &str) -> Result<Self, ConfigError> {
        Self::resolve(
            raw.log_level.as_deref(),
            [&raw.builder.resources, &raw.server.resources, &raw.client.resources],
            &raw.influx,
            scope,
        )
    }

    fn resolve(
        log_level: Option<&str>,
        [builder, server, client]: [&RawResources; 3],
        influx: &RawInfluxRuntime,
        scope: &str,
    ) -> Result<Self, ConfigError> {
        let path = |kind: &str| format!("{}.runtime.{}.resources", scope, kind);
        Ok(Self {
            log_level: log_level.map(LogLevel::from_str).transpose()?,
            builder: ResourceOverrides::from_raw(builder, &path("builder"))?,
            server: ResourceOverrides::from_raw(server, &path("server"))?,
            client: ResourceOverrides::from_raw(client, &path("client"))?,
            influx: ResourceOverrides::from_raw(&influx.resources, &path("influx"))?,
            influx_enabled: influx.enable,
        })
    }
}

/// `globals.runtime` section as written
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRuntime {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub builder: RawTaskRuntime,
    #[serde(default)]
    pub server: RawTaskRuntime,
    #[serde(default)]
    pub client: RawClientRuntime,
    #[serde(default)]
    pub influx: RawInfluxRuntime,
    #[serde(default)]
    pub images: RawImages,
}

/// Machine `runtime` section: client limits and images are project-wide
/// and rejected here
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMachineRuntime {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub builder: RawTaskRuntime,
    #[serde(default)]
    pub server: RawTaskRuntime,
    #[serde(default)]
    pub client: RawTaskRuntime,
    #[serde(default)]
    pub influx: RawInfluxRuntime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTaskRuntime {
    #[serde(default)]
    pub resources: RawResources,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClientRuntime {
    #[serde(default)]
    pub resources: RawResources,
    #[serde(default)]
    pub max_instances: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawInfluxRuntime {
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub resources: RawResources,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawImages {
    #[serde(default)]
    pub registry: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// `globals` section as written
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGlobals {
    #[serde(default)]
    pub runtime: RawRuntime,
    #[serde(default)]
    pub dataset: Mapping,
    #[serde(default)]
    pub model: Option<Value>,
    #[serde(default)]
    pub evaluation: Mapping,
    #[serde(default)]
    pub metadata: Mapping,
    #[serde(default)]
    pub owner_references: Option<Value>,
}

/// Defaults applied to every machine unless the machine overrides them
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalOptions {
    pub runtime: RuntimeOptions,
    pub max_clients: u32,
    pub images: Images,
    pub data_provider: DataProvider,
    /// Remaining dataset keys, deep-merged under each machine's dataset
    pub dataset: Mapping,
    pub train_start_date: Option<DateTime<FixedOffset>>,
    pub train_end_date: Option<DateTime<FixedOffset>>,
    pub model: Option<Value>,
    pub evaluation: Mapping,
    pub metadata: Mapping,
    pub owner_references: Option<Vec<OwnerReference>>,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        let mut dataset = Mapping::new();
        dataset.insert("resolution".into(), "10T".into());
        let mut evaluation = Mapping::new();
        evaluation.insert("cv_mode".into(), "full_build".into());

        Self {
            runtime: RuntimeOptions::default(),
            max_clients: DEFAULT_MAX_CLIENTS,
            images: Images::default(),
            data_provider: DataProvider::default(),
            dataset,
            train_start_date: None,
            train_end_date: None,
            model: None,
            evaluation,
            metadata: Mapping::new(),
            owner_references: None,
        }
    }
}

impl GlobalOptions {
    /// Resolve the `globals` section on top of the built-in defaults
    pub fn from_raw(raw: &RawGlobals) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let scope = "globals";

        let runtime = defaults
            .runtime
            .with_overrides(&RuntimeOverrides::from_raw(&raw.runtime, scope)?);

        let max_clients = match &raw.runtime.client.max_instances {
            Some(value) => parse_max_clients(value)?,
            None => defaults.max_clients,
        };

        let images = Images {
            registry: raw.runtime.images.registry.clone().unwrap_or(defaults.images.registry),
            repository: raw.runtime.images.repository.clone().unwrap_or(defaults.images.repository),
            tag: raw.runtime.images.tag.clone().unwrap_or(defaults.images.tag),
        };

        let mut dataset = raw.dataset.clone();
        let data_provider = match dataset.remove("data_provider") {
            Some(overlay) => defaults.data_provider.with_override(&overlay, scope)?,
            None => defaults.data_provider,
        };
        let train_start_date = take_timestamp(&mut dataset, "globals.dataset.train_start_date")?;
        let train_end_date = take_timestamp(&mut dataset, "globals.dataset.train_end_date")?;

        let owner_references = raw
            .owner_references
            .as_ref()
            .map(OwnerReference::from_value)
            .transpose()?;

        Ok(Self {
            runtime,
            max_clients,
            images,
            data_provider,
            dataset: merge::layered(&defaults.dataset, &[&dataset]),
            train_start_date,
            train_end_date,
            model: raw.model.clone(),
            evaluation: merge::layered(&defaults.evaluation, &[&raw.evaluation]),
            metadata: raw.metadata.clone(),
            owner_references,
        })
    }
}

/// Remove a date field from a dataset mapping and parse it
pub(crate) fn take_timestamp(
    dataset: &mut Mapping,
    field: &str,
) -> Result<Option<DateTime<FixedOffset>>, ConfigError> {
    let key = field.rsplit('.').next().unwrap_or(field);
    dataset
        .remove(key)
        .map(|value| parse_timestamp(&value, field))
        .transpose()
}

fn parse_max_clients(value: &Value) -> Result<u32, ConfigError> {
    value
        .as_u64()
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            ConfigError::InvalidMaxClients(
                serde_yaml::to_string(value)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
            )
        })
}
