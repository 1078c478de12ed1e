//! Package metadata types exchanged with the depsolver.
//!
//! Resolution itself happens elsewhere; this crate only produces
//! [`PackageSet`] requests and consumes the resolved [`PackageSpec`]s.

use serde::{Deserialize, Serialize};

/// Secret provider name that maps to subscription-manager entitlements.
pub const RHSM_SECRETS: &str = "org.osbuild.rhsm";

/// Named include/exclude request handed to the depsolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl PackageSet {
    pub fn new<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Concatenate both lists of `other` onto `self`.
    pub fn append(mut self, other: PackageSet) -> Self {
        self.include.extend(other.include);
        self.exclude.extend(other.exclude);
        self
    }
}

/// A fully resolved package, as returned by the depsolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub epoch: u32,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub arch: String,
    pub remote_location: String,
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    #[serde(default)]
    pub check_gpg: bool,
}

impl PackageSpec {
    /// `version-release.arch`, the form used for kernel directories.
    pub fn kernel_release(&self) -> String {
        format!("{}-{}.{}", self.version, self.release, self.arch)
    }
}

/// Repository configuration. Only the GPG key matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub name: String,
    #[serde(default, rename = "baseurl")]
    pub base_url: Option<String>,
    #[serde(default, rename = "metalink")]
    pub metalink: Option<String>,
    #[serde(default, rename = "gpgkey")]
    pub gpg_key: Option<String>,
    #[serde(default)]
    pub check_gpg: bool,
}

/// Find the spec for `name` in a resolved package list.
pub fn find_package<'a>(specs: &'a [PackageSpec], name: &str) -> Option<&'a PackageSpec> {
    specs.iter().find(|spec| spec.name == name)
}
