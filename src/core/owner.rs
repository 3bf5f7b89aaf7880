//! Owner references attached to the generated workflow and its manifests

use crate::core::error::ConfigError;
use serde_yaml::{Mapping, Value};

const REQUIRED_KEYS: [&str; 4] = ["uid", "name", "kind", "apiVersion"];

/// Back-reference to the Kubernetes resource owning the generated workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl OwnerReference {
    /// Parse owner references from a YAML string, e.g. a CLI argument
    pub fn parse_list(yaml: &str) -> Result<Vec<Self>, ConfigError> {
        Self::from_value(&Self::parse_document(yaml)?)
    }

    /// Parse the YAML text of an owner reference list without validating its shape
    pub(crate) fn parse_document(yaml: &str) -> Result<Value, ConfigError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::InvalidOwnerReference(format!("not valid YAML: {}", e)))
    }

    /// Validate an owner reference sequence.
    ///
    /// The value must be a non-empty sequence of mappings, each carrying
    /// `uid`, `name`, `kind` and `apiVersion` as scalars.
    pub fn from_value(value: &Value) -> Result<Vec<Self>, ConfigError> {
        let items = value.as_sequence().ok_or_else(|| {
            let found = type_name(value);
            ConfigError::InvalidOwnerReference(format!("expected a sequence, got {}", found))
        })?;
        if items.is_empty() {
            return Err(ConfigError::InvalidOwnerReference(
                "sequence must not be empty".to_string(),
            ));
        }

        items
            .iter()
            .enumerate()
            .map(|(i, item)| Self::from_item(i, item))
            .collect()
    }

    /// Kubernetes `ownerReferences` entry
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert("apiVersion".into(), self.api_version.clone().into());
        map.insert("kind".into(), self.kind.clone().into());
        map.insert("name".into(), self.name.clone().into());
        map.insert("uid".into(), self.uid.clone().into());
        Value::Mapping(map)
    }

    fn from_item(index: usize, item: &Value) -> Result<Self, ConfigError> {
        let map = item.as_mapping().ok_or_else(|| {
            ConfigError::InvalidOwnerReference(format!(
                "entry {} must be a mapping, got {}",
                index,
                type_name(item)
            ))
        })?;

        let mut fields = Vec::with_capacity(REQUIRED_KEYS.len());
        for key in REQUIRED_KEYS {
            let field = map.get(key).and_then(scalar_to_string).ok_or_else(|| {
                ConfigError::InvalidOwnerReference(format!(
                    "entry {} is missing '{}' (requires {})",
                    index,
                    key,
                    REQUIRED_KEYS.join(", ")
                ))
            })?;
            fields.push(field);
        }

        let [uid, name, kind, api_version]: [String; 4] = fields
            .try_into()
            .map_err(|_| {
                ConfigError::InvalidOwnerReference(format!("entry {} is incomplete", index))
            })?;
        Ok(Self {
            api_version,
            kind,
            name,
            uid,
        })
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
