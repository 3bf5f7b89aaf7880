//! Layered merging of YAML mappings

use serde_yaml::{Mapping, Value};

/// Merge `overlay` into `base`; nested mappings merge key by key,
/// anything else in `overlay` replaces the value in `base`.
pub fn deep_merge(base: &mut Mapping, overlay: &Mapping) {
    for (key, value) in overlay {
        if let (Some(Value::Mapping(existing)), Value::Mapping(incoming)) =
            (base.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Return `base` with each layer merged on top, lowest precedence first
pub fn layered(base: &Mapping, layers: &[&Mapping]) -> Mapping {
    let mut merged = base.clone();
    for layer in layers {
        deep_merge(&mut merged, layer);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_nested_mappings_merge() {
        let base = mapping("a: {x: 1, y: 2}\nb: keep");
        let overlay = mapping("a: {y: 3, z: 4}");

        let merged = layered(&base, &[&overlay]);
        assert_eq!(merged, mapping("a: {x: 1, y: 3, z: 4}\nb: keep"));
    }

    #[test]
    fn test_sequences_are_replaced() {
        let base = mapping("tags: [a, b]");
        let overlay = mapping("tags: [c]");
        assert_eq!(layered(&base, &[&overlay]), mapping("tags: [c]"));
    }

    #[test]
    fn test_later_layers_win() {
        let base = mapping("v: 1");
        let global = mapping("v: 2");
        let machine = mapping("v: 3");
        assert_eq!(layered(&base, &[&global, &machine]), mapping("v: 3"));
    }
}
