//! Pipeline construction, one [`ImageFamily`] per image kind.
//!
//! Every family starts from the shared `build` pipeline and an OS tree;
//! the helpers here are the pieces the families have in common.

mod disk;
mod installer;
mod ostree;

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::catalog::Distribution;
use super::image_type::ImageTypeRef;
use super::stage_options;
use super::{sets, ImageConfig, ImageOptions, S390X};
use crate::blueprint::{kernel_of, Customizations};
use crate::disk::PartitionTable;
use crate::error::{Error, Result};
use crate::osbuild::disk as disk_stages;
use crate::osbuild::stages::{
    self, FstabOptions, Grub2Options, Grub2Uefi, KeymapOptions, SysconfigKernel,
    SysconfigNetwork, SysconfigOptions, X11Keymap,
};
use crate::osbuild::{Input, Pipeline, Stage};
use crate::rpmmd::{find_package, PackageSpec, RepoConfig};

pub use installer::InstallerImage;

/// One family of image types: how its disks are laid out and which
/// pipelines its manifests contain.
pub trait ImageFamily {
    /// Base partition table for `arch`; `None` for unpartitioned images.
    fn base_partition_table(&self, _arch: &str) -> Option<&PartitionTable> {
        None
    }

    /// Whether new mountpoints may turn the root partition into LVM.
    fn lvmify(&self) -> bool;

    fn pipelines(&self, ctx: &PipelineContext<'_>, rng: &mut StdRng) -> Result<Vec<Pipeline>>;
}

/// Everything one manifest call passes to its family.
pub struct PipelineContext<'a> {
    pub image_type: ImageTypeRef<'a>,
    pub customizations: Option<&'a Customizations>,
    pub options: &'a ImageOptions,
    pub repos: &'a [RepoConfig],
    pub package_specs: &'a BTreeMap<String, Vec<PackageSpec>>,
    /// Image type defaults over distribution defaults.
    pub config: ImageConfig,
}

impl<'a> PipelineContext<'a> {
    pub fn distro(&self) -> &'a Distribution {
        self.image_type.distro
    }

    pub fn arch(&self) -> &'a str {
        self.image_type.arch_name()
    }

    /// Resolved specs of package set `set`, empty if it was not depsolved.
    pub fn specs(&self, set: &str) -> &'a [PackageSpec] {
        self.package_specs
            .get(set)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Packages installed into the OS tree: image packages, then blueprint.
    pub fn os_specs(&self) -> Vec<PackageSpec> {
        let mut specs = self.specs(sets::PACKAGES).to_vec();
        specs.extend_from_slice(self.specs(sets::BLUEPRINT));
        specs
    }

    pub fn kernel_name(&self) -> String {
        kernel_of(self.customizations).name
    }

    /// `version-release.arch` of package `name`, searched in `package_sets`.
    pub fn kernel_version(&self, name: &str, package_sets: &[&str]) -> Result<String> {
        package_sets
            .iter()
            .find_map(|set| find_package(self.specs(set), name))
            .map(PackageSpec::kernel_release)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "kernel package {name:?} not found in package sets {package_sets:?}"
                ))
            })
    }

    /// Ref requested in the options, else the distribution default.
    pub fn ostree_ref(&self) -> String {
        if self.options.ostree.reference.is_empty() {
            self.image_type.ostree_ref()
        } else {
            self.options.ostree.reference.clone()
        }
    }

    /// Image type kernel options followed by the blueprint's additions.
    pub fn kernel_options(&self) -> String {
        let base = &self.image_type.image_type.kernel_options;
        let append = kernel_of(self.customizations).append;
        match (base.is_empty(), append.is_empty()) {
            (_, true) => base.clone(),
            (true, false) => append,
            (false, false) => format!("{base} {append}"),
        }
    }

    /// GRUB2 legacy platform when the image boots through BIOS or OF.
    fn legacy_platform(&self) -> Option<&'a str> {
        if self.image_type.boot_type().supports_legacy() {
            self.image_type.arch.legacy.as_deref()
        } else {
            None
        }
    }
}

/// The buildroot every other pipeline runs in.
pub(crate) fn build_pipeline(ctx: &PipelineContext<'_>) -> Pipeline {
    let mut p = Pipeline::new("build").with_runner(ctx.distro().runner.as_str());
    p.add_stage(stages::rpm(
        stage_options::rpm_options(ctx.repos),
        Input::packages(ctx.specs(sets::BUILD)),
    ));
    p.add_stage(stages::selinux(stage_options::selinux_options(true)));
    p
}

/// The configured OS tree. With a partition table the tree also gets fstab
/// and a bootloader configuration.
pub(crate) fn os_pipeline(ctx: &PipelineContext<'_>, pt: Option<&PartitionTable>) -> Result<Pipeline> {
    let mut p = Pipeline::new("os").with_build("build");
    let kernel_options = ctx.kernel_options();

    if let Some(pt) = pt {
        if ctx.arch() == S390X {
            let root = root_filesystem_uuid(pt)?;
            p.add_stage(stages::kernel_cmdline(&root, &kernel_options));
        }
    }

    let mut rpm = stage_options::rpm_options(ctx.repos);
    rpm.gpgkeys_fromtree = ctx.config.gpg_key_files.clone();
    p.add_stage(stages::rpm(rpm, Input::packages(&ctx.os_specs())));
    p.add_stage(stages::fix_bls());

    add_system_stages(&mut p, ctx, false)?;

    if let Some(pt) = pt {
        p.add_stage(stages::fstab(FstabOptions {
            ostree: None,
            filesystems: disk_stages::fstab_entries(pt),
        }));
        let kernel_version = ctx.kernel_version(&ctx.kernel_name(), &[sets::PACKAGES, sets::BLUEPRINT])?;
        p.add_stage(bootloader_stage(ctx, pt, &kernel_options, &kernel_version)?);
    }

    p.add_stage(stages::selinux(stage_options::selinux_options(false)));
    if let Some(state) = ctx.config.selinux_state {
        p.add_stage(stages::selinux_config(state.as_str()));
    }
    Ok(p)
}

/// Configuration stages shared by plain and OSTree trees, from locale up
/// to systemd units. OSTree trees install SSH keys on first boot as
/// `/var/home` is not part of a commit.
pub(crate) fn add_system_stages(p: &mut Pipeline, ctx: &PipelineContext<'_>, ostree: bool) -> Result<()> {
    let c = ctx.customizations;
    let config = &ctx.config;

    let language = c
        .and_then(|c| c.locale.as_ref())
        .and_then(|locale| locale.languages.first().cloned())
        .or_else(|| config.locale.clone());
    if let Some(language) = language {
        p.add_stage(stages::locale(&language));
    }

    let keymap = match c.and_then(|c| c.locale.as_ref()).and_then(|l| l.keyboard.clone()) {
        Some(keymap) => Some(KeymapOptions {
            keymap,
            x11_keymap: None,
        }),
        None => config.keyboard.as_ref().map(|keyboard| KeymapOptions {
            keymap: keyboard.keymap.clone(),
            x11_keymap: (!keyboard.x11_layouts.is_empty()).then(|| X11Keymap {
                layouts: keyboard.x11_layouts.clone(),
            }),
        }),
    };
    if let Some(keymap) = keymap {
        p.add_stage(stages::keymap(keymap));
    }

    if let Some(hostname) = c.and_then(|c| c.hostname.as_deref()) {
        p.add_stage(stages::hostname(hostname));
    }

    let timezone = c.and_then(|c| c.get_timezone());
    let zone = timezone
        .and_then(|tz| tz.timezone.clone())
        .or_else(|| config.timezone.clone());
    if let Some(zone) = zone {
        p.add_stage(stages::timezone(&zone));
    }

    let ntp_servers = match timezone {
        Some(tz) if !tz.ntpservers.is_empty() => tz.ntpservers.clone(),
        _ => config.ntp_servers.clone(),
    };
    if !ntp_servers.is_empty() {
        p.add_stage(stages::chrony(ntp_servers));
    }

    if let Some(sysconfig) = &config.sysconfig {
        p.add_stage(stages::sysconfig(SysconfigOptions {
            kernel: SysconfigKernel {
                update_default: true,
                default_kernel: sysconfig.default_kernel.clone(),
            },
            network: SysconfigNetwork {
                networking: sysconfig.networking,
                no_zero_conf: sysconfig.no_zero_conf,
            },
        }));
    }

    if let Some(c) = c {
        if !c.group.is_empty() {
            p.add_stage(stages::groups(stage_options::groups_options(&c.group)));
        }

        let users = c.get_users();
        if !users.is_empty() {
            let options = stage_options::users_options(&users)?;
            let first_boot = ostree.then(|| stage_options::users_first_boot_options(&options));
            p.add_stage(stages::users(options));
            if let Some(first_boot) = first_boot {
                p.add_stage(stages::first_boot(first_boot));
            }
        }

        if let Some(firewall) = &c.firewall {
            p.add_stage(stages::firewall(stage_options::firewall_options(firewall)));
        }
    }

    let default_target = config.default_target.as_deref().unwrap_or("");
    let systemd = stage_options::systemd_options(
        &config.enabled_services,
        &config.disabled_services,
        c.and_then(|c| c.services.as_ref()),
        default_target,
    );
    if !systemd.enabled_services.is_empty()
        || !systemd.disabled_services.is_empty()
        || !systemd.default_target.is_empty()
    {
        p.add_stage(stages::systemd(systemd));
    }

    Ok(())
}

fn root_filesystem_uuid(pt: &PartitionTable) -> Result<String> {
    pt.root_filesystem()
        .map(|fs| fs.uuid.clone())
        .ok_or_else(|| Error::Config("partition table has no root filesystem".to_string()))
}

fn bootloader_stage(
    ctx: &PipelineContext<'_>,
    pt: &PartitionTable,
    kernel_options: &str,
    kernel_version: &str,
) -> Result<Stage> {
    if ctx.arch() == S390X {
        return Ok(stages::zipl());
    }

    let boot_type = ctx.image_type.boot_type();
    Ok(stages::grub2(Grub2Options {
        root_fs_uuid: root_filesystem_uuid(pt)?,
        boot_fs_uuid: pt.boot_filesystem().map(|fs| fs.uuid.clone()),
        kernel_opts: kernel_options.to_string(),
        legacy: ctx.legacy_platform().map(str::to_string),
        uefi: boot_type.supports_uefi().then(|| Grub2Uefi {
            vendor: ctx.distro().vendor.clone(),
            install: false,
        }),
        saved_entry: Some(format!("ffffffffffffffffffffffffffffffff-{kernel_version}")),
        ..Default::default()
    }))
}

/// Writes `pt` into `filename` and fills it with the tree of `tree`.
pub(crate) fn image_pipeline(
    ctx: &PipelineContext<'_>,
    pt: &PartitionTable,
    filename: &str,
    tree: &str,
    kernel_version: &str,
) -> Pipeline {
    let mut p = Pipeline::new("image").with_build("build");
    p.add_stages(disk_stages::assembly_stages(pt, filename, tree));
    if ctx.arch() == S390X {
        p.add_stages(disk_stages::zipl_inst(pt, filename, kernel_version));
    } else if let Some(platform) = ctx.legacy_platform() {
        p.add_stages(disk_stages::grub2_inst(pt, filename, platform));
    }
    p.add_stages(disk_stages::lvm2_metadata(pt, filename));
    p
}

/// xz-compresses `input_file` of `input_pipeline` into `output`.
pub(crate) fn xz_archive_pipeline(input_pipeline: &str, input_file: &str, output: &str) -> Pipeline {
    let mut p = Pipeline::new("archive").with_build("build");
    p.add_stage(stages::xz(output, Input::pipeline_file(input_pipeline, input_file)));
    p
}

/// Tarball of the plain OS tree.
#[derive(Debug, Clone, Copy)]
pub struct TarImage;

impl ImageFamily for TarImage {
    fn lvmify(&self) -> bool {
        true
    }

    fn pipelines(&self, ctx: &PipelineContext<'_>, _rng: &mut StdRng) -> Result<Vec<Pipeline>> {
        let mut tar = Pipeline::new("root-tar").with_build("build");
        tar.add_stage(stages::tar(ctx.image_type.filename(), Input::tree("os")));
        Ok(vec![build_pipeline(ctx), os_pipeline(ctx, None)?, tar])
    }
}
