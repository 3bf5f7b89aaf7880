//! Sensor tags and asset resolution

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// Looks up the asset a sensor tag belongs to.
///
/// Injected into normalization so callers and tests decide how tags are resolved.
pub trait TagResolver {
    fn asset_for(&self, tag_name: &str) -> Option<String>;
}

/// Resolves assets by tag-name prefix, falling back to a default asset.
///
/// Rules are tried in insertion order; the first matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct PrefixTagResolver {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
}

impl PrefixTagResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, prefix: impl Into<String>, asset: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), asset.into()));
        self
    }

    pub fn with_fallback(mut self, asset: impl Into<String>) -> Self {
        self.fallback = Some(asset.into());
        self
    }
}

impl TagResolver for PrefixTagResolver {
    fn asset_for(&self, tag_name: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|(prefix, _)| tag_name.starts_with(prefix.as_str()))
            .map(|(_, asset)| asset.clone())
            .or_else(|| self.fallback.clone())
    }
}

/// Tag as written in the config: a bare name or `{name, asset}`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawTag {
    Name(String),
    WithAsset { name: String, asset: String },
}

/// A sensor tag with its resolved asset, remembering how it was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorTag {
    pub name: String,
    pub asset: Option<String>,
    explicit_asset: bool,
}

impl SensorTag {
    pub fn resolve(raw: &RawTag, resolver: &dyn TagResolver) -> Self {
        match raw {
            RawTag::Name(name) => Self {
                name: name.clone(),
                asset: resolver.asset_for(name),
                explicit_asset: false,
            },
            RawTag::WithAsset { name, asset } => Self {
                name: name.clone(),
                asset: Some(asset.clone()),
                explicit_asset: true,
            },
        }
    }

    /// Value for the serialized tag list, in the form the tag was written
    pub fn to_value(&self) -> Value {
        match (&self.asset, self.explicit_asset) {
            (Some(asset), true) => {
                let mut map = Mapping::new();
                map.insert("name".into(), self.name.clone().into());
                map.insert("asset".into(), asset.clone().into());
                Value::Mapping(map)
            }
            _ => Value::String(self.name.clone()),
        }
    }
}

/// Distinct tags across machines, in order of first appearance
pub fn unique_tags<'a, I>(tag_lists: I) -> Vec<SensorTag>
where
    I: IntoIterator<Item = &'a [SensorTag]>,
{
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for tags in tag_lists {
        for tag in tags {
            if seen.insert(tag.name.clone()) {
                result.push(tag.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_resolver_first_match_wins() {
        let resolver = PrefixTagResolver::new()
            .with_rule("CT", "asset-ct")
            .with_rule("C", "asset-c")
            .with_fallback("default");

        assert_eq!(resolver.asset_for("CT/1"), Some("asset-ct".to_string()));
        assert_eq!(resolver.asset_for("CX"), Some("asset-c".to_string()));
        assert_eq!(resolver.asset_for("Tag 1"), Some("default".to_string()));
        assert_eq!(PrefixTagResolver::new().asset_for("Tag 1"), None);
    }

    #[test]
    fn test_raw_tag_forms() {
        let tags: Vec<RawTag> = serde_yaml::from_str(
            r#"
- "CT'3"
- name: TAG-2
  asset: asset-a
"#,
        )
        .unwrap();
        assert_eq!(tags[0], RawTag::Name("CT'3".to_string()));
        assert_eq!(
            tags[1],
            RawTag::WithAsset {
                name: "TAG-2".to_string(),
                asset: "asset-a".to_string()
            }
        );
    }

    #[test]
    fn test_tag_value_keeps_written_form() {
        let resolver = PrefixTagResolver::new().with_fallback("default");
        let bare = SensorTag::resolve(&RawTag::Name("CT\"2".to_string()), &resolver);
        assert_eq!(bare.asset.as_deref(), Some("default"));
        assert_eq!(bare.to_value(), Value::String("CT\"2".to_string()));

        let explicit = SensorTag::resolve(
            &RawTag::WithAsset {
                name: "T".to_string(),
                asset: "a".to_string(),
            },
            &resolver,
        );
        assert!(explicit.to_value().is_mapping());
    }

    #[test]
    fn test_unique_tags_keeps_first_appearance() {
        let resolver = PrefixTagResolver::new();
        let mk = |names: &[&str]| -> Vec<SensorTag> {
            names
                .iter()
                .map(|n| SensorTag::resolve(&RawTag::Name(n.to_string()), &resolver))
                .collect()
        };
        let a = mk(&["Tag 1", "Tag 2"]);
        let b = mk(&["Tag 2", "Tag 3", "Tag 1"]);

        let names: Vec<_> = unique_tags([a.as_slice(), b.as_slice()])
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Tag 1", "Tag 2", "Tag 3"]);
    }
}
