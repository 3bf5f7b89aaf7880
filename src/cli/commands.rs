//! CLI command definitions

use crate::core::tags::PrefixTagResolver;
use clap::Args;
use std::path::PathBuf;

/// Generate the workflow document
#[derive(Debug, Args, Clone)]
pub struct GenerateCommand {
    /// Machine configuration file (legacy or custom resource shape)
    #[arg(long)]
    pub machine_config: PathBuf,

    /// Project name, used for the workflow name and labels
    #[arg(long)]
    pub project_name: String,

    /// Write the workflow here instead of stdout
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Owner references as a YAML list, replacing the config's own
    #[arg(long)]
    pub owner_references: Option<String>,

    #[command(flatten)]
    pub assets: AssetArgs,
}

/// List distinct sensor tags
#[derive(Debug, Args, Clone)]
pub struct UniqueTagsCommand {
    /// Machine configuration file (legacy or custom resource shape)
    #[arg(long)]
    pub machine_config: PathBuf,

    /// Write the tag list here instead of stdout
    #[arg(long)]
    pub output_file_tag_list: Option<PathBuf>,

    /// Print `tag<TAB>asset` instead of bare tag names
    #[arg(long)]
    pub with_assets: bool,

    #[command(flatten)]
    pub assets: AssetArgs,
}

/// Rules for resolving the asset of a sensor tag
#[derive(Debug, Args, Clone, Default)]
pub struct AssetArgs {
    /// Map a tag prefix to an asset (prefix=asset)
    #[arg(long, value_parser = parse_key_value)]
    pub tag_asset: Vec<(String, String)>,

    /// Asset for tags no prefix rule matches
    #[arg(long)]
    pub default_asset: Option<String>,
}

impl AssetArgs {
    pub fn resolver(&self) -> PrefixTagResolver {
        let resolver = self
            .tag_asset
            .iter()
            .fold(PrefixTagResolver::new(), |r, (prefix, asset)| {
                r.with_rule(prefix.clone(), asset.clone())
            });
        match &self.default_asset {
            Some(asset) => resolver.with_fallback(asset.clone()),
            None => resolver,
        }
    }
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tags::TagResolver;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
        assert!(parse_key_value("missing").is_err());
    }

    #[test]
    fn test_resolver_from_args() {
        let args = AssetArgs {
            tag_asset: vec![("GRA".to_string(), "1755-gra".to_string())],
            default_asset: Some("unknown".to_string()),
        };
        let resolver = args.resolver();
        assert_eq!(resolver.asset_for("GRA-TE-23"), Some("1755-gra".to_string()));
        assert_eq!(resolver.asset_for("ASGB-1"), Some("unknown".to_string()));
    }
}
