//! Image composition for RHEL 8 family distributions.
//!
//! A [`distro::Catalog`] describes every distribution, architecture and
//! image type that can be composed. Given a blueprint, image options,
//! repositories and depsolved package specs, an image type compiles the
//! request into an osbuild [`osbuild::Manifest`]:
//!
//! ```text
//! Catalog ── Distribution ── Architecture ── ImageType
//!                                               │
//!     blueprint + options + package specs ──────┤
//!                                               ├── package_sets()
//!                                               ├── partition_table()
//!                                               └── manifest()
//! ```
//!
//! Manifests are deterministic: the same inputs and seed give byte-identical
//! JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use distro_compose::distro::Catalog;
//!
//! let catalog = Catalog::new()?;
//! let arch = catalog.get_distro("rhel-86")?.get_arch("x86_64")?;
//! let qcow2 = arch.get_image_type("qcow2")?;
//! let sets = qcow2.package_sets(&blueprint)?;
//! // depsolve `sets`, then:
//! let manifest = qcow2.manifest(None, &options, &repos, &specs, 0)?;
//! ```

pub mod blueprint;
pub mod disk;
pub mod distro;
pub mod error;
pub mod osbuild;
pub mod request;
pub mod rpmmd;

pub use distro::{Catalog, ImageOptions};
pub use error::{Error, Result};
