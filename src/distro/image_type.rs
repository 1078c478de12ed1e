//! Image types and the per-request operations on them.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use super::catalog::{Architecture, Distribution};
use super::package_sets::{self, PackageSetSource};
use super::pipelines::{ImageFamily, InstallerImage, PipelineContext, TarImage};
use super::{sets, validate, BootType, ImageConfig, ImageOptions};
use crate::blueprint::{
    filesystems_of, kernel_of, Blueprint, Customizations, FilesystemCustomization,
};
use crate::disk::{self, PartitionTable, MIB};
use crate::error::{Error, Result};
use crate::osbuild::{Manifest, Sources};
use crate::rpmmd::{PackageSet, PackageSpec, RepoConfig};

/// Base partition tables keyed by architecture name.
pub type BasePartitionTables = BTreeMap<String, PartitionTable>;

/// Output format of a partitioned disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Qcow2 { compat: String },
    /// Virtual PC (vhd); sizes must be whole MiB.
    Vpc,
    Vmdk,
}

impl DiskFormat {
    /// Name of the conversion pipeline; `None` for raw images.
    pub fn pipeline_name(&self) -> Option<&'static str> {
        match self {
            DiskFormat::Raw => None,
            DiskFormat::Qcow2 { .. } => Some("qcow2"),
            DiskFormat::Vpc => Some("vpc"),
            DiskFormat::Vmdk => Some("vmdk"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskImage {
    pub format: DiskFormat,
    /// Compress the raw image with xz into an `archive` pipeline.
    pub xz: bool,
    pub tables: BasePartitionTables,
}

#[derive(Debug, Clone)]
pub enum OSTreeImage {
    /// Tarball of an OSTree repository holding one commit.
    Commit,
    /// OCI container serving the commit over HTTP.
    Container,
    /// Disk with the parent commit deployed.
    RawImage { tables: BasePartitionTables },
    /// Anaconda ISO that installs the parent commit.
    Installer,
    /// coreos-installer ISO that writes a raw image to a fixed device.
    SimplifiedInstaller { tables: BasePartitionTables },
}

/// Image family. Decides which pipelines get built and which flags hold.
#[derive(Debug, Clone)]
pub enum ImageKind {
    Disk(DiskImage),
    Tar,
    Installer,
    OSTree(OSTreeImage),
}

impl ImageKind {
    pub fn boot_iso(&self) -> bool {
        matches!(
            self,
            ImageKind::Installer
                | ImageKind::OSTree(OSTreeImage::Installer)
                | ImageKind::OSTree(OSTreeImage::SimplifiedInstaller { .. })
        )
    }

    pub fn rpm_ostree(&self) -> bool {
        matches!(self, ImageKind::OSTree(_))
    }

    pub fn bootable(&self) -> bool {
        matches!(
            self,
            ImageKind::Disk(_)
                | ImageKind::Installer
                | ImageKind::OSTree(OSTreeImage::RawImage { .. })
                | ImageKind::OSTree(OSTreeImage::SimplifiedInstaller { .. })
        )
    }

    pub fn requires_mib_alignment(&self) -> bool {
        matches!(
            self,
            ImageKind::Disk(DiskImage {
                format: DiskFormat::Vpc,
                ..
            })
        )
    }

    pub(crate) fn family(&self) -> &dyn ImageFamily {
        match self {
            ImageKind::Disk(disk) => disk,
            ImageKind::Tar => &TarImage,
            ImageKind::Installer => &InstallerImage,
            ImageKind::OSTree(ostree) => ostree,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageType {
    pub name: String,
    pub aliases: Vec<String>,
    pub filename: String,
    pub mime_type: String,
    pub package_sets: BTreeMap<String, PackageSetSource>,
    pub default_config: ImageConfig,
    pub kernel_options: String,
    pub default_size: u64,
    pub build_pipelines: Vec<String>,
    pub payload_pipelines: Vec<String>,
    pub exports: Vec<String>,
    /// Overrides the architecture boot type.
    pub boot_type: Option<BootType>,
    pub kind: ImageKind,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ImageType {
    pub fn new(name: &str, filename: &str, mime_type: &str, kind: ImageKind) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            package_sets: BTreeMap::new(),
            default_config: ImageConfig::default(),
            kernel_options: String::new(),
            default_size: 0,
            build_pipelines: Vec::new(),
            payload_pipelines: Vec::new(),
            exports: Vec::new(),
            boot_type: None,
            kind,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn renamed(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.aliases.clear();
        self
    }

    pub fn package_set(mut self, name: &str, source: PackageSetSource) -> Self {
        self.package_sets.insert(name.to_string(), source);
        self
    }

    pub fn config(mut self, config: ImageConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn kernel_options(mut self, options: &str) -> Self {
        self.kernel_options = options.to_string();
        self
    }

    pub fn default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    pub fn pipelines(mut self, build: &[&str], payload: &[&str]) -> Self {
        self.build_pipelines = strings(build);
        self.payload_pipelines = strings(payload);
        self
    }

    pub fn exports(mut self, exports: &[&str]) -> Self {
        self.exports = strings(exports);
        self
    }

    pub fn boot_type(mut self, boot_type: BootType) -> Self {
        self.boot_type = Some(boot_type);
        self
    }
}

/// An image type together with the architecture and distribution it was
/// looked up through.
#[derive(Debug, Clone, Copy)]
pub struct ImageTypeRef<'a> {
    pub distro: &'a Distribution,
    pub arch: &'a Architecture,
    pub image_type: &'a ImageType,
}

impl<'a> ImageTypeRef<'a> {
    pub fn new(distro: &'a Distribution, arch: &'a Architecture, image_type: &'a ImageType) -> Self {
        Self {
            distro,
            arch,
            image_type,
        }
    }

    pub fn name(&self) -> &'a str {
        &self.image_type.name
    }

    pub fn arch_name(&self) -> &'a str {
        &self.arch.name
    }

    pub fn filename(&self) -> &'a str {
        &self.image_type.filename
    }

    pub fn mime_type(&self) -> &'a str {
        &self.image_type.mime_type
    }

    pub fn kind(&self) -> &'a ImageKind {
        &self.image_type.kind
    }

    /// OSTree ref for rpm-ostree image types, empty otherwise.
    pub fn ostree_ref(&self) -> String {
        if self.image_type.kind.rpm_ostree() {
            self.distro.ostree_ref(&self.arch.name)
        } else {
            String::new()
        }
    }

    /// Effective image size for a requested size (0 selects the default).
    pub fn size(&self, requested: u64) -> Result<u64> {
        let mut size = requested;
        if self.image_type.kind.requires_mib_alignment() && size % MIB != 0 {
            size = disk::layout::align_up(size, MIB)?;
        }
        if size == 0 {
            size = self.image_type.default_size;
        }
        Ok(size)
    }

    pub fn base_partition_table(&self) -> Option<&'a PartitionTable> {
        self.image_type
            .kind
            .family()
            .base_partition_table(&self.arch.name)
    }

    /// `gpt`, `dos`, or empty when the image type has no partition table.
    pub fn partition_type(&self) -> &'static str {
        self.base_partition_table()
            .map(|pt| pt.pt_type.as_str())
            .unwrap_or("")
    }

    pub fn boot_type(&self) -> BootType {
        self.image_type.boot_type.unwrap_or(self.arch.boot_type)
    }

    pub fn supports_uefi(&self) -> bool {
        self.boot_type().supports_uefi()
    }

    pub fn build_pipelines(&self) -> &'a [String] {
        &self.image_type.build_pipelines
    }

    pub fn payload_pipelines(&self) -> &'a [String] {
        &self.image_type.payload_pipelines
    }

    pub fn payload_package_sets(&self) -> Vec<&'static str> {
        vec![sets::BLUEPRINT]
    }

    pub fn exports(&self) -> Vec<&'a str> {
        if self.image_type.exports.is_empty() {
            vec!["assembler"]
        } else {
            self.image_type.exports.iter().map(String::as_str).collect()
        }
    }

    /// Image type defaults layered over the distribution defaults.
    pub fn default_image_config(&self) -> ImageConfig {
        self.image_type
            .default_config
            .inherit_from(&self.distro.default_image_config)
    }

    /// Package sets to depsolve for `blueprint`.
    ///
    /// Blueprint packages land in their own `blueprint` set so distribution
    /// exclude lists never drop them; the blueprint kernel joins `packages`.
    pub fn package_sets(&self, blueprint: &Blueprint) -> Result<BTreeMap<String, PackageSet>> {
        let mut result: BTreeMap<String, PackageSet> = self
            .image_type
            .package_sets
            .iter()
            .map(|(name, source)| (name.clone(), package_sets::resolve(source, self)))
            .collect();

        result.entry(sets::PACKAGES.to_string()).or_default();

        if !result.contains_key(sets::BUILD) {
            return Err(Error::Config(format!(
                "'{}' image type has no '{}' package set defined",
                self.name(),
                sets::BUILD
            )));
        }

        let customizations = blueprint.customizations();
        let mut bp_packages = blueprint.get_packages();
        if customizations.and_then(Customizations::get_timezone).is_some() {
            bp_packages.push("chrony".to_string());
        }

        if !self.image_type.kind.rpm_ostree() && self.has_new_mountpoint(filesystems_of(customizations)) {
            bp_packages.push("lvm2".to_string());
        }

        result.insert(sets::BLUEPRINT.to_string(), PackageSet::new(bp_packages));

        let kernel = kernel_of(customizations).name;
        let packages = result.entry(sets::PACKAGES.to_string()).or_default();
        *packages = std::mem::take(packages).append(PackageSet::new([kernel]));

        debug!(image_type = self.name(), sets = result.len(), "resolved package sets");
        Ok(result)
    }

    fn has_new_mountpoint(&self, mountpoints: &[FilesystemCustomization]) -> bool {
        let base = self.base_partition_table();
        mountpoints
            .iter()
            .any(|m| !base.is_some_and(|pt| pt.contains_mountpoint(&m.mountpoint)))
    }

    /// Concrete partition table for this request.
    pub fn partition_table(
        &self,
        mountpoints: &[FilesystemCustomization],
        options: &ImageOptions,
        rng: &mut StdRng,
    ) -> Result<PartitionTable> {
        let family = self.image_type.kind.family();
        let base = family
            .base_partition_table(&self.arch.name)
            .ok_or_else(|| Error::Resource(format!("unknown arch: {}", self.arch.name)))?;
        let image_size = self.size(options.size)?;
        disk::new_partition_table(base, mountpoints, image_size, family.lvmify(), rng)
    }

    /// Compile the request into an osbuild manifest.
    ///
    /// The result depends only on the arguments: equal inputs and `seed`
    /// give byte-identical manifests.
    pub fn manifest(
        &self,
        customizations: Option<&Customizations>,
        options: &ImageOptions,
        repos: &[RepoConfig],
        package_specs: &BTreeMap<String, Vec<PackageSpec>>,
        seed: u64,
    ) -> Result<Manifest> {
        validate::check_options(self, customizations, options)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let ctx = PipelineContext {
            image_type: *self,
            customizations,
            options,
            repos,
            package_specs,
            config: self.default_image_config(),
        };
        let pipelines = self.image_type.kind.family().pipelines(&ctx, &mut rng)?;

        let mut sources = Sources::default();
        for spec in package_specs.values().flatten() {
            sources.add_package(spec);
        }
        if !options.ostree.parent.is_empty() && !options.ostree.url.is_empty() {
            sources.add_ostree_commit(&options.ostree.parent, &options.ostree.url);
        }
        if let Some(fdo) = customizations.and_then(Customizations::get_fdo) {
            if !fdo.diun_pub_key_root_certs.is_empty() {
                sources.add_inline(&fdo.diun_pub_key_root_certs);
            }
        }

        info!(
            distro = %self.distro.name,
            arch = self.arch_name(),
            image_type = self.name(),
            pipelines = pipelines.len(),
            "assembled manifest"
        );
        Ok(Manifest::new(pipelines, sources))
    }
}
