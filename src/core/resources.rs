//! Resource quantities and request/limit blocks

use crate::core::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::fmt;
use tracing::debug;

static QUANTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)([A-Za-z]*)$").unwrap());

/// What a quantity measures; decides the default unit and the allowed suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    Memory,
    Cpu,
}

impl QuantityKind {
    fn default_suffix(self) -> &'static str {
        match self {
            QuantityKind::Memory => "M",
            QuantityKind::Cpu => "m",
        }
    }

    /// Multiplier to the base unit (bytes or millicores)
    fn multiplier(self, suffix: &str) -> Option<u128> {
        match self {
            QuantityKind::Cpu => match suffix {
                "m" => Some(1),
                _ => None,
            },
            QuantityKind::Memory => match suffix {
                "k" => Some(1_000),
                "M" => Some(1_000_000),
                "G" => Some(1_000_000_000),
                "T" => Some(1_000_000_000_000),
                "P" => Some(1_000_000_000_000_000),
                "E" => Some(1_000_000_000_000_000_000),
                "Ki" => Some(1 << 10),
                "Mi" => Some(1 << 20),
                "Gi" => Some(1 << 30),
                "Ti" => Some(1 << 40),
                "Pi" => Some(1 << 50),
                "Ei" => Some(1 << 60),
                _ => None,
            },
        }
    }
}

/// An integer amount with a unit suffix, e.g. `121M` or `1001m`.
///
/// Bare integers are read in the default unit of their kind (`M` for memory,
/// `m` for cpu), so `121` and `"121"` both mean `121M` for memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    amount: u64,
    suffix: String,
    kind: QuantityKind,
}

impl Quantity {
    pub fn memory(amount: u64) -> Self {
        Self::new(amount, QuantityKind::Memory)
    }

    pub fn cpu(millicores: u64) -> Self {
        Self::new(millicores, QuantityKind::Cpu)
    }

    fn new(amount: u64, kind: QuantityKind) -> Self {
        Self {
            amount,
            suffix: kind.default_suffix().to_string(),
            kind,
        }
    }

    /// Parse a quantity from a YAML scalar
    pub fn parse(value: &Value, kind: QuantityKind, path: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidResourceFormat {
            path: path.to_string(),
            value: describe(value),
        };

        match value {
            Value::Number(n) => n
                .as_u64()
                .map(|amount| Self::new(amount, kind))
                .ok_or_else(invalid),
            Value::String(s) => Self::parse_str(s.trim(), kind).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    fn parse_str(s: &str, kind: QuantityKind) -> Option<Self> {
        let caps = QUANTITY.captures(s)?;
        let amount: u64 = caps[1].parse().ok()?;
        let suffix = match &caps[2] {
            "" => kind.default_suffix(),
            other => other,
        };
        kind.multiplier(suffix)?;
        Some(Self {
            amount,
            suffix: suffix.to_string(),
            kind,
        })
    }

    /// Value in bytes (memory) or millicores (cpu)
    pub fn base_value(&self) -> u128 {
        self.kind.multiplier(&self.suffix).unwrap_or(1) * u128::from(self.amount)
    }

    pub fn kind(&self) -> QuantityKind {
        self.kind
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.suffix)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| format!("{:?}", other)),
    }
}

/// Memory and cpu pair used for both requests and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityPair {
    pub memory: Quantity,
    pub cpu: Quantity,
}

impl QuantityPair {
    pub fn new(memory_mb: u64, cpu_millis: u64) -> Self {
        Self {
            memory: Quantity::memory(memory_mb),
            cpu: Quantity::cpu(cpu_millis),
        }
    }
}

/// Fully resolved `requests`/`limits` block for one task kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBlock {
    pub requests: QuantityPair,
    pub limits: QuantityPair,
}

impl ResourceBlock {
    pub fn new(requests: QuantityPair, limits: QuantityPair) -> Self {
        Self { requests, limits }
    }

    /// Nested `requests`/`limits` mapping as it appears in manifests
    pub fn to_value(&self) -> Value {
        let pair = |p: &QuantityPair| {
            let mut map = Mapping::new();
            map.insert("memory".into(), p.memory.to_string().into());
            map.insert("cpu".into(), p.cpu.to_string().into());
            Value::Mapping(map)
        };

        let mut map = Mapping::new();
        map.insert("requests".into(), pair(&self.requests));
        map.insert("limits".into(), pair(&self.limits));
        Value::Mapping(map)
    }

    /// Apply a layer of overrides on top of this block, then bump limits.
    pub fn with_overrides(&self, overrides: &ResourceOverrides) -> Self {
        let pick = |over: &Option<Quantity>, base: &Quantity| {
            over.clone().unwrap_or_else(|| base.clone())
        };

        let block = Self {
            requests: QuantityPair {
                memory: pick(&overrides.requests.memory, &self.requests.memory),
                cpu: pick(&overrides.requests.cpu, &self.requests.cpu),
            },
            limits: QuantityPair {
                memory: pick(&overrides.limits.memory, &self.limits.memory),
                cpu: pick(&overrides.limits.cpu, &self.limits.cpu),
            },
        };
        block.bumped()
    }

    /// Raise any limit that is below its request up to the request.
    pub fn bumped(mut self) -> Self {
        if self.limits.memory.base_value() < self.requests.memory.base_value() {
            debug!(
                "Raising memory limit {} to match request {}",
                self.limits.memory, self.requests.memory
            );
            self.limits.memory = self.requests.memory.clone();
        }
        if self.limits.cpu.base_value() < self.requests.cpu.base_value() {
            debug!(
                "Raising cpu limit {} to match request {}",
                self.limits.cpu, self.requests.cpu
            );
            self.limits.cpu = self.requests.cpu.clone();
        }
        self
    }
}

/// Resource section as written in the config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawResources {
    #[serde(default)]
    pub requests: RawQuantityPair,
    #[serde(default)]
    pub limits: RawQuantityPair,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuantityPair {
    #[serde(default)]
    pub memory: Option<Value>,
    #[serde(default)]
    pub cpu: Option<Value>,
}

/// Validated partial override; unset fields inherit from the layer below
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOverrides {
    pub requests: PairOverride,
    pub limits: PairOverride,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairOverride {
    pub memory: Option<Quantity>,
    pub cpu: Option<Quantity>,
}

impl ResourceOverrides {
    /// Validate a raw resources section; `path` prefixes error locations
    pub fn from_raw(raw: &RawResources, path: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            requests: PairOverride::from_raw(&raw.requests, &format!("{}.requests", path))?,
            limits: PairOverride::from_raw(&raw.limits, &format!("{}.limits", path))?,
        })
    }
}

impl PairOverride {
    fn from_raw(raw: &RawQuantityPair, path: &str) -> Result<Self, ConfigError> {
        let parse = |value: &Option<Value>, kind, field: &str| {
            value
                .as_ref()
                .map(|v| Quantity::parse(v, kind, &format!("{}.{}", path, field)))
                .transpose()
        };

        Ok(Self {
            memory: parse(&raw.memory, QuantityKind::Memory, "memory")?,
            cpu: parse(&raw.cpu, QuantityKind::Cpu, "cpu")?,
        })
    }
}
