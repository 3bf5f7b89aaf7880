//! Machine specification: one fully resolved, immutable unit to build and serve

use crate::core::error::ConfigError;
use crate::core::globals::{
    take_timestamp, DataProvider, GlobalOptions, RawMachineRuntime, RuntimeOptions,
    RuntimeOverrides,
};
use crate::core::merge;
use crate::core::tags::{RawTag, SensorTag, TagResolver};
use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Longest name a Kubernetes label value may carry
const MAX_NAME_LEN: usize = 63;

/// Names whose per-machine tasks would take the name of a shared task
/// (`gordo-client-waiter`)
pub const RESERVED_MACHINE_NAMES: &[&str] = &["waiter"];

/// Machine entry as written in the config
#[derive(Debug, Clone, Deserialize)]
pub struct RawMachine {
    pub name: String,
    #[serde(default)]
    pub dataset: Mapping,
    #[serde(default)]
    pub model: Option<Value>,
    #[serde(default)]
    pub runtime: RawMachineRuntime,
    #[serde(default)]
    pub evaluation: Mapping,
    #[serde(default)]
    pub metadata: Mapping,
}

/// Resolved dataset of a machine
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub tags: Vec<SensorTag>,
    pub train_start_date: DateTime<FixedOffset>,
    pub train_end_date: DateTime<FixedOffset>,
    pub data_provider: DataProvider,
    /// Any other dataset keys, passed through untouched
    pub extra: Mapping,
}

/// User-defined metadata from both the globals and the machine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub global: Mapping,
    pub machine: Mapping,
}

/// A validated machine with every override already applied
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSpec {
    pub name: String,
    pub project_name: String,
    pub dataset: Dataset,
    pub model: Value,
    pub runtime: RuntimeOptions,
    pub evaluation: Mapping,
    pub metadata: Metadata,
}

impl MachineSpec {
    /// Resolve a raw machine against the global options.
    ///
    /// Precedence is machine > globals > built-in defaults.
    pub fn from_raw(
        raw: &RawMachine,
        globals: &GlobalOptions,
        project_name: &str,
        resolver: &dyn TagResolver,
    ) -> Result<Self, ConfigError> {
        let name = normalize_name(&raw.name)?;
        if RESERVED_MACHINE_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::ReservedMachineName(raw.name.clone()));
        }

        let runtime = globals
            .runtime
            .with_overrides(&RuntimeOverrides::from_machine(&raw.runtime, &name)?);

        let dataset = Self::resolve_dataset(&name, &raw.dataset, globals, resolver)?;

        let model = raw
            .model
            .clone()
            .or_else(|| globals.model.clone())
            .ok_or_else(|| ConfigError::missing(&name, "model"))?;

        Ok(Self {
            project_name: project_name.to_string(),
            dataset,
            model,
            runtime,
            evaluation: merge::layered(&globals.evaluation, &[&raw.evaluation]),
            metadata: Metadata {
                global: globals.metadata.clone(),
                machine: raw.metadata.clone(),
            },
            name,
        })
    }

    fn resolve_dataset(
        name: &str,
        raw: &Mapping,
        globals: &GlobalOptions,
        resolver: &dyn TagResolver,
    ) -> Result<Dataset, ConfigError> {
        let mut dataset = raw.clone();

        let data_provider = match dataset.remove("data_provider") {
            Some(overlay) => globals.data_provider.with_override(&overlay, name)?,
            None => globals.data_provider.clone(),
        };

        let tags_value = match (dataset.remove("tags"), dataset.remove("tag_list")) {
            (Some(tags), _) | (None, Some(tags)) => tags,
            (None, None) => return Err(ConfigError::missing(name, "dataset.tags")),
        };
        let raw_tags = Self::parse_tags(name, tags_value)?;
        if raw_tags.is_empty() {
            return Err(ConfigError::missing(name, "dataset.tags"));
        }
        let tags = raw_tags
            .iter()
            .map(|tag| SensorTag::resolve(tag, resolver))
            .collect();

        let start = take_timestamp(&mut dataset, &format!("{}.dataset.train_start_date", name))?
            .or(globals.train_start_date)
            .ok_or_else(|| ConfigError::missing(name, "dataset.train_start_date"))?;
        let end = take_timestamp(&mut dataset, &format!("{}.dataset.train_end_date", name))?
            .or(globals.train_end_date)
            .ok_or_else(|| ConfigError::missing(name, "dataset.train_end_date"))?;
        if start >= end {
            return Err(ConfigError::InvalidDateRange {
                machine: name.to_string(),
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        Ok(Dataset {
            tags,
            train_start_date: start,
            train_end_date: end,
            data_provider,
            extra: merge::layered(&globals.dataset, &[&dataset]),
        })
    }

    fn parse_tags(name: &str, value: Value) -> Result<Vec<RawTag>, ConfigError> {
        let invalid = |value: &Value| ConfigError::InvalidTag {
            machine: name.to_string(),
            value: serde_yaml::to_string(value)
                .map(|s| s.trim_end().to_string())
                .unwrap_or_default(),
        };

        match value {
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| serde_yaml::from_value(item.clone()).map_err(|_| invalid(&item)))
                .collect(),
            other => Err(invalid(&other)),
        }
    }

    /// The machine as a nested document, as handed to the model builder
    pub fn to_value(&self) -> Value {
        let mut dataset = Mapping::new();
        dataset.insert(
            "tag_list".into(),
            Value::Sequence(self.dataset.tags.iter().map(SensorTag::to_value).collect()),
        );
        let dates = [
            ("train_start_date", &self.dataset.train_start_date),
            ("train_end_date", &self.dataset.train_end_date),
        ];
        for (key, date) in dates {
            dataset.insert(key.into(), date.to_rfc3339().into());
        }
        dataset.insert("data_provider".into(), self.dataset.data_provider.to_value());
        for (k, v) in &self.dataset.extra {
            dataset.insert(k.clone(), v.clone());
        }

        let mut user_defined = Mapping::new();
        let metadata_layers = [
            ("global-metadata", &self.metadata.global),
            ("machine-metadata", &self.metadata.machine),
        ];
        for (key, layer) in metadata_layers {
            user_defined.insert(key.into(), Value::Mapping(layer.clone()));
        }
        let mut metadata = Mapping::new();
        metadata.insert("user_defined".into(), Value::Mapping(user_defined));

        let mut machine = Mapping::new();
        machine.insert("name".into(), self.name.clone().into());
        machine.insert("project_name".into(), self.project_name.clone().into());
        machine.insert("dataset".into(), Value::Mapping(dataset));
        machine.insert("model".into(), self.model.clone());
        machine.insert("evaluation".into(), Value::Mapping(self.evaluation.clone()));
        machine.insert("metadata".into(), Value::Mapping(metadata));
        machine.insert("runtime".into(), self.runtime_value());
        Value::Mapping(machine)
    }

    fn runtime_value(&self) -> Value {
        let task = |block: &crate::core::resources::ResourceBlock| {
            let mut map = Mapping::new();
            map.insert("resources".into(), block.to_value());
            map
        };

        let mut influx = task(&self.runtime.influx);
        influx.insert("enable".into(), self.runtime.influx_enabled.into());

        let mut runtime = Mapping::new();
        runtime.insert("log_level".into(), self.runtime.log_level.to_string().into());
        runtime.insert("builder".into(), Value::Mapping(task(&self.runtime.builder)));
        runtime.insert("server".into(), Value::Mapping(task(&self.runtime.server)));
        runtime.insert("client".into(), Value::Mapping(task(&self.runtime.client)));
        runtime.insert("influx".into(), Value::Mapping(influx));
        Value::Mapping(runtime)
    }

    /// Serialized machine document embedded in the workflow
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_value())
    }
}

/// Lowercase a name and turn `_`, `.` and whitespace into `-`, then check it
/// is usable as a DNS label.
pub fn normalize_name(raw: &str) -> Result<String, ConfigError> {
    let name: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '_' | '.' => '-',
            c if c.is_whitespace() => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect();

    if name.len() > MAX_NAME_LEN || !DNS_LABEL.is_match(&name) {
        return Err(ConfigError::InvalidMachineName(raw.to_string()));
    }
    Ok(name)
}

/// Whether a name can be used unchanged as a DNS label
pub fn is_dns_label(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && DNS_LABEL.is_match(name)
}
