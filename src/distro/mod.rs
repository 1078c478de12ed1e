//! Distribution catalog and the image compiler built on it.
//!
//! ```text
//! Catalog
//!   └─ Distribution (rhel-86, rhel-87, centos-8)
//!        └─ Architecture (x86_64, aarch64, ppc64le, s390x)
//!             └─ ImageType (qcow2, ami, edge-commit, ...)
//! ```
//!
//! Lookups hand out [`ArchRef`] and [`ImageTypeRef`] views that carry their
//! parents, so catalog entries never point back up the tree.

pub mod catalog;
pub mod image_config;
pub mod image_type;
pub mod package_sets;
pub mod partition_tables;
pub mod pipelines;
pub mod rhel8;
pub mod stage_options;
pub mod validate;

pub use catalog::{ArchRef, Architecture, Catalog, Distribution};
pub use image_config::ImageConfig;
pub use image_type::{DiskFormat, DiskImage, ImageKind, ImageType, ImageTypeRef, OSTreeImage};

use serde::{Deserialize, Serialize};

pub const X86_64: &str = "x86_64";
pub const AARCH64: &str = "aarch64";
pub const PPC64LE: &str = "ppc64le";
pub const S390X: &str = "s390x";

/// Package set names.
pub mod sets {
    pub const BUILD: &str = "build";
    pub const PACKAGES: &str = "packages";
    pub const CONTAINER: &str = "container";
    pub const INSTALLER: &str = "installer";
    pub const BLUEPRINT: &str = "blueprint";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootType {
    Legacy,
    Uefi,
    Hybrid,
}

impl BootType {
    pub fn supports_uefi(&self) -> bool {
        matches!(self, BootType::Uefi | BootType::Hybrid)
    }

    pub fn supports_legacy(&self) -> bool {
        matches!(self, BootType::Legacy | BootType::Hybrid)
    }
}

/// Per-request options that are not part of the blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageOptions {
    /// Requested image size in bytes; 0 selects the image type default.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub ostree: OSTreeImageOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OSTreeImageOptions {
    /// Checksum of the commit to build on top of or to deploy.
    #[serde(default)]
    pub parent: String,
    /// Repository the parent commit is fetched from.
    #[serde(default)]
    pub url: String,
    /// Ref overriding the distribution default.
    #[serde(default, rename = "ref")]
    pub reference: String,
}
