//! Compose request and depsolved package spec files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::blueprint::Blueprint;
use crate::distro::ImageOptions;
use crate::rpmmd::{PackageSpec, RepoConfig};

/// Everything a manifest needs besides the catalog and the resolved packages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeRequest {
    /// Seed for every generated identifier in the manifest.
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub options: ImageOptions,
    #[serde(default)]
    pub repositories: Vec<RepoConfig>,
    #[serde(default)]
    pub blueprint: Blueprint,
}

pub type PackageSpecSets = BTreeMap<String, Vec<PackageSpec>>;

pub fn parse_request(text: &str) -> Result<ComposeRequest> {
    toml::from_str(text).context("parsing compose request")
}

pub fn load_request(path: &Path) -> Result<ComposeRequest> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading compose request '{}'", path.display()))?;
    toml::from_str(&text)
        .with_context(|| format!("parsing compose request '{}'", path.display()))
}

/// Load `{ "<set>": [PackageSpec, ...] }` as written by the depsolver.
pub fn load_package_specs(path: &Path) -> Result<PackageSpecSets> {
    let bytes = fs::read(path)
        .with_context(|| format!("reading package specs '{}'", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing package specs '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_uses_defaults() {
        let request = parse_request("").expect("empty request");
        assert_eq!(request.seed, 0);
        assert_eq!(request.options.size, 0);
        assert!(request.repositories.is_empty());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        assert!(parse_request("sed = 1\n").is_err());
    }

    #[test]
    fn ostree_ref_is_read_from_options() {
        let request = parse_request(
            r#"
seed = 42

[options]
size = 4294967296

[options.ostree]
ref = "test/edge"
url = "http://example.com/repo"
"#,
        )
        .expect("request");
        assert_eq!(request.seed, 42);
        assert_eq!(request.options.size, 4 * 1024 * 1024 * 1024);
        assert_eq!(request.options.ostree.reference, "test/edge");
    }
}
