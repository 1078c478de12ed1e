//! rpm-ostree image types: commits, the commit server container, raw edge
//! disks and the two edge installers.

use rand::rngs::StdRng;

use super::installer::{anaconda_tree_pipeline, bootiso_pipeline, bootiso_tree_pipeline};
use super::{
    add_system_stages, build_pipeline, image_pipeline, root_filesystem_uuid, xz_archive_pipeline,
    ImageFamily, PipelineContext,
};
use crate::blueprint::{filesystems_of, Customizations, DEFAULT_KERNEL_NAME};
use crate::disk::{layout, PartitionTable, MIB};
use crate::distro::image_type::OSTreeImage;
use crate::distro::stage_options::{self, FDO_ROOT_CERTS_PATH};
use crate::distro::{sets, AARCH64, X86_64};
use crate::error::{Error, Result};
use crate::osbuild::disk as disk_stages;
use crate::osbuild::sources::inline_checksum;
use crate::osbuild::stages::{
    self, CopyPath, FstabOptions, Grub2Options, Grub2Uefi, MkdirOptions, MkdirPath,
    OSTreeCommitOptions, OSTreeDeployOptions, OSTreeDeploymentOptions, OSTreePullOptions,
    OSTreeRemoteEntry, OSTreeRemotesOptions, OSTreeRootfs, OciArchiveOptions, OciConfig,
};
use crate::osbuild::{Input, Pipeline, Stage};

const OSNAME: &str = "redhat";
const REMOTE_NAME: &str = "rhel-edge";
const SYSROOT_REPO: &str = "/ostree/repo";
const RAW_IMAGE: &str = "image.raw";
const INSTALLER_IMAGE_XZ: &str = "disk.img.xz";
const EFIBOOT_IMAGE: &str = "images/efiboot.img";
const EFIBOOT_SIZE: u64 = 20 * MIB;

const NGINX_CONFIG: &str = "/etc/nginx.conf";
const NGINX_ROOT: &str = "/usr/share/nginx/html";
const NGINX_PORT: &str = "8080";

impl ImageFamily for OSTreeImage {
    fn base_partition_table(&self, arch: &str) -> Option<&PartitionTable> {
        match self {
            OSTreeImage::RawImage { tables } | OSTreeImage::SimplifiedInstaller { tables } => {
                tables.get(arch)
            }
            _ => None,
        }
    }

    fn lvmify(&self) -> bool {
        false
    }

    fn pipelines(&self, ctx: &PipelineContext<'_>, rng: &mut StdRng) -> Result<Vec<Pipeline>> {
        let mut pipelines = vec![build_pipeline(ctx)];
        match self {
            OSTreeImage::Commit => {
                pipelines.push(ostree_tree_pipeline(ctx)?);
                pipelines.push(ostree_commit_pipeline(ctx));
                let mut archive = Pipeline::new("commit-archive").with_build("build");
                archive.add_stage(stages::tar(
                    ctx.image_type.filename(),
                    Input::tree("ostree-commit"),
                ));
                pipelines.push(archive);
            }
            OSTreeImage::Container => {
                pipelines.push(ostree_tree_pipeline(ctx)?);
                pipelines.push(ostree_commit_pipeline(ctx));
                pipelines.push(container_tree_pipeline(ctx));
                pipelines.push(container_pipeline(ctx));
            }
            OSTreeImage::RawImage { .. } => {
                let pt = partition_table(ctx, rng)?;
                pipelines.push(image_tree_pipeline(ctx, &pt)?);
                pipelines.push(image_pipeline(ctx, &pt, RAW_IMAGE, "image-tree", ""));
                pipelines.push(xz_archive_pipeline(
                    "image",
                    RAW_IMAGE,
                    ctx.image_type.filename(),
                ));
            }
            OSTreeImage::Installer => {
                let kernel_version = ctx.kernel_version(DEFAULT_KERNEL_NAME, &[sets::INSTALLER])?;
                let payload = vec![
                    stages::ostree_init(SYSROOT_REPO),
                    stages::ostree_pull(
                        OSTreePullOptions {
                            repo: SYSROOT_REPO.to_string(),
                            remote: None,
                        },
                        Input::ostree_commit(&ctx.options.ostree.parent),
                    ),
                ];
                let kickstart = stage_options::ostree_kickstart_options(
                    &format!("file://{SYSROOT_REPO}"),
                    &ctx.ostree_ref(),
                );
                pipelines.push(anaconda_tree_pipeline(ctx, &kernel_version, "edge"));
                pipelines.push(bootiso_tree_pipeline(ctx, &kernel_version, kickstart, payload)?);
                pipelines.push(bootiso_pipeline(ctx, ctx.arch() == X86_64));
            }
            OSTreeImage::SimplifiedInstaller { .. } => {
                let pt = partition_table(ctx, rng)?;
                let kernel_version = ctx.kernel_version(DEFAULT_KERNEL_NAME, &[sets::INSTALLER])?;
                pipelines.push(image_tree_pipeline(ctx, &pt)?);
                pipelines.push(image_pipeline(ctx, &pt, RAW_IMAGE, "image-tree", ""));
                pipelines.push(xz_archive_pipeline("image", RAW_IMAGE, INSTALLER_IMAGE_XZ));
                pipelines.push(coi_tree_pipeline(ctx, &kernel_version));
                pipelines.push(efiboot_tree_pipeline(ctx)?);
                pipelines.push(simplified_bootiso_tree_pipeline(ctx, &kernel_version, rng));
                pipelines.push(bootiso_pipeline(ctx, false));
            }
        }
        Ok(pipelines)
    }
}

fn partition_table(ctx: &PipelineContext<'_>, rng: &mut StdRng) -> Result<PartitionTable> {
    ctx.image_type
        .partition_table(filesystems_of(ctx.customizations), ctx.options, rng)
}

fn parent(ctx: &PipelineContext<'_>) -> Option<String> {
    let parent = &ctx.options.ostree.parent;
    (!parent.is_empty()).then(|| parent.clone())
}

/// The OS tree that becomes the commit.
fn ostree_tree_pipeline(ctx: &PipelineContext<'_>) -> Result<Pipeline> {
    let mut p = Pipeline::new("ostree-tree").with_build("build");

    let mut rpm = stage_options::rpm_options(ctx.repos);
    rpm.gpgkeys_fromtree = ctx.config.gpg_key_files.clone();
    rpm.ostree_booted = true;
    p.add_stage(stages::rpm(rpm, Input::packages(&ctx.os_specs())));
    p.add_stage(stages::fix_bls());

    add_system_stages(&mut p, ctx, true)?;

    p.add_stage(stages::selinux(stage_options::selinux_options(false)));
    p.add_stage(stages::ostree_preptree(vec![
        "wheel".to_string(),
        "docker".to_string(),
    ]));
    Ok(p)
}

fn ostree_commit_pipeline(ctx: &PipelineContext<'_>) -> Pipeline {
    let mut p = Pipeline::new("ostree-commit").with_build("build");
    p.add_stage(stages::ostree_init("/repo"));
    p.add_stage(stages::ostree_commit(
        OSTreeCommitOptions {
            reference: ctx.ostree_ref(),
            os_version: ctx.distro().os_version.clone(),
            parent: parent(ctx),
        },
        Input::tree("ostree-tree"),
    ));
    p
}

/// nginx serving the commit repository.
fn container_tree_pipeline(ctx: &PipelineContext<'_>) -> Pipeline {
    let repo = format!("{NGINX_ROOT}/repo");

    let mut p = Pipeline::new("container-tree").with_build("build");
    p.add_stage(stages::rpm(
        stage_options::rpm_options(ctx.repos),
        Input::packages(ctx.specs(sets::CONTAINER)),
    ));
    p.add_stage(stages::locale("en_US"));
    p.add_stage(stages::nginx_config(stage_options::nginx_config_options(
        NGINX_CONFIG,
        NGINX_ROOT,
        NGINX_PORT,
    )));
    p.add_stage(stages::ostree_init(&repo));
    p.add_stage(stages::ostree_pull(
        OSTreePullOptions {
            repo: repo.clone(),
            remote: None,
        },
        Input::ostree_pipeline("ostree-commit"),
    ));
    p.add_stage(stages::chmod(stage_options::chmod_options(&repo, "a+rX", true)));
    p
}

/// OCI architecture name of an RPM architecture.
fn oci_arch(arch: &str) -> &str {
    match arch {
        X86_64 => "amd64",
        AARCH64 => "arm64",
        other => other,
    }
}

fn container_pipeline(ctx: &PipelineContext<'_>) -> Pipeline {
    let mut p = Pipeline::new("container").with_build("build");
    p.add_stage(stages::oci_archive(
        OciArchiveOptions {
            architecture: oci_arch(ctx.arch()).to_string(),
            filename: ctx.image_type.filename().to_string(),
            config: OciConfig {
                cmd: ["nginx", "-c", NGINX_CONFIG].map(str::to_string).to_vec(),
                exposed_ports: vec![NGINX_PORT.to_string()],
            },
        },
        Input::tree("container-tree"),
    ));
    p
}

/// A sysroot with the parent commit deployed.
fn image_tree_pipeline(ctx: &PipelineContext<'_>, pt: &PartitionTable) -> Result<Pipeline> {
    let reference = ctx.ostree_ref();
    let url = &ctx.options.ostree.url;
    let deployment = || OSTreeDeploymentOptions::new(OSNAME, &reference);

    let mut p = Pipeline::new("image-tree").with_build("build");
    p.add_stage(stages::ostree_init_fs());
    p.add_stage(stages::ostree_pull(
        OSTreePullOptions {
            repo: SYSROOT_REPO.to_string(),
            remote: Some(REMOTE_NAME.to_string()),
        },
        Input::ostree_commit(&ctx.options.ostree.parent),
    ));
    p.add_stage(stages::ostree_os_init(OSNAME));
    p.add_stage(stages::ostree_config(stage_options::ostree_config_options(
        SYSROOT_REPO,
        false,
    )));
    if !url.is_empty() {
        p.add_stage(stages::ostree_remotes(OSTreeRemotesOptions {
            repo: SYSROOT_REPO.to_string(),
            remotes: vec![OSTreeRemoteEntry {
                name: REMOTE_NAME.to_string(),
                url: url.clone(),
            }],
        }));
    }
    p.add_stage(stages::mkdir(stage_options::efi_mkdir_options()));

    let mut kernel_opts = vec!["modprobe.blacklist=vc4".to_string(), "rw".to_string()];
    kernel_opts.extend(ctx.kernel_options().split_whitespace().map(str::to_string));
    p.add_stage(stages::ostree_deploy(OSTreeDeployOptions {
        osname: OSNAME.to_string(),
        reference: reference.clone(),
        remote: REMOTE_NAME.to_string(),
        mounts: vec!["/boot".to_string(), "/boot/efi".to_string()],
        rootfs: OSTreeRootfs {
            label: "root".to_string(),
        },
        kernel_opts,
    }));
    p.add_stage(stages::ostree_fillvar(deployment()));
    p.add_stage(stages::fstab(FstabOptions {
        ostree: Some(deployment()),
        filesystems: disk_stages::fstab_entries(pt),
    }));
    p.add_stage(stages::ostree_selinux(deployment()));

    p.add_stage(stages::grub2(Grub2Options {
        root_fs_uuid: root_filesystem_uuid(pt)?,
        boot_fs_uuid: pt.boot_filesystem().map(|fs| fs.uuid.clone()),
        legacy: ctx.legacy_platform().map(str::to_string),
        uefi: Some(Grub2Uefi {
            vendor: ctx.distro().vendor.clone(),
            install: true,
        }),
        greenboot: true,
        write_defaults: Some(false),
        ..Default::default()
    }));
    Ok(p)
}

/// Live environment running coreos-installer and the FDO client.
fn coi_tree_pipeline(ctx: &PipelineContext<'_>, kernel_version: &str) -> Pipeline {
    let arch = ctx.arch();
    let distro = ctx.distro();

    let mut p = Pipeline::new("coi-tree").with_build("build");
    p.add_stage(stages::rpm(
        stage_options::rpm_options(ctx.repos),
        Input::packages(ctx.specs(sets::INSTALLER)),
    ));
    p.add_stage(stages::buildstamp(stage_options::buildstamp_options(
        arch,
        &distro.product,
        &distro.os_version,
        "edge",
    )));
    p.add_stage(stages::locale("en_US.UTF-8"));
    p.add_stage(stages::dracut(stage_options::dracut_options(
        kernel_version,
        arch,
        &["coreos-installer", "fdo"],
    )));
    p
}

fn efiboot_tree_pipeline(ctx: &PipelineContext<'_>) -> Result<Pipeline> {
    let distro = ctx.distro();
    let c = ctx.customizations;
    let fdo = c.and_then(Customizations::get_fdo).ok_or_else(|| {
        Error::Validation(format!(
            "boot ISO image type {:?} requires specifying FDO configuration to install to",
            ctx.image_type.name()
        ))
    })?;
    let install_device = c.map(Customizations::get_installation_device).unwrap_or("");

    let mut p = Pipeline::new("efiboot-tree").with_build("build");
    p.add_stage(stages::grub_iso(stage_options::grub_iso_options(
        install_device,
        ctx.arch(),
        &distro.vendor,
        &distro.product,
        &distro.os_version,
        &distro.iso_label(ctx.arch()),
        fdo,
    )?));
    Ok(p)
}

fn copy_from(input_name: &str, input: Input, paths: Vec<CopyPath>) -> Stage {
    stages::copy(paths).with_input(input_name, input)
}

/// ISO contents: the compressed disk, the EFI boot image, the installer
/// kernel and initramfs, and the FDO root certificates when given.
fn simplified_bootiso_tree_pipeline(
    ctx: &PipelineContext<'_>,
    kernel_version: &str,
    rng: &mut StdRng,
) -> Pipeline {
    let mut p = Pipeline::new("bootiso-tree").with_build("build");

    p.add_stage(copy_from(
        "file",
        Input::pipeline_file("archive", INSTALLER_IMAGE_XZ),
        vec![CopyPath::new(
            format!("input://file/{INSTALLER_IMAGE_XZ}"),
            format!("tree:///{INSTALLER_IMAGE_XZ}"),
        )],
    ));

    p.add_stage(stages::mkdir(MkdirOptions {
        paths: ["/images", "/images/pxeboot"]
            .iter()
            .map(|path| MkdirPath {
                path: path.to_string(),
                mode: 0o755,
            })
            .collect(),
    }));

    let volid = layout::new_volid(rng);
    p.add_stages(disk_stages::vfat_image_stages(
        EFIBOOT_IMAGE,
        EFIBOOT_SIZE,
        &volid,
        "efiboot-tree",
    ));

    p.add_stage(copy_from(
        "tree",
        Input::tree("coi-tree"),
        vec![
            CopyPath::new(
                format!("input://tree/boot/vmlinuz-{kernel_version}"),
                "tree:///images/pxeboot/vmlinuz",
            ),
            CopyPath::new(
                format!("input://tree/boot/initramfs-{kernel_version}.img"),
                "tree:///images/pxeboot/initrd.img",
            ),
        ],
    ));

    p.add_stage(copy_from(
        "root",
        Input::tree("efiboot-tree"),
        vec![CopyPath::new("input://root/EFI", "tree:///")],
    ));

    let root_certs = ctx
        .customizations
        .and_then(Customizations::get_fdo)
        .map(|fdo| fdo.diun_pub_key_root_certs.as_str())
        .filter(|certs| !certs.is_empty());
    if let Some(certs) = root_certs {
        let checksum = inline_checksum(certs);
        p.add_stage(copy_from(
            "file",
            Input::source_file(&checksum),
            vec![CopyPath::new(
                format!("input://file/{checksum}"),
                format!("tree://{FDO_ROOT_CERTS_PATH}"),
            )],
        ));
    }

    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oci_arch_follows_container_naming() {
        assert_eq!(oci_arch("x86_64"), "amd64");
        assert_eq!(oci_arch("aarch64"), "arm64");
        assert_eq!(oci_arch("s390x"), "s390x");
    }

    #[test]
    fn only_disk_variants_have_tables() {
        assert!(OSTreeImage::Commit.base_partition_table("x86_64").is_none());
        let raw = OSTreeImage::RawImage {
            tables: crate::distro::partition_tables::edge_tables(),
        };
        assert!(raw.base_partition_table("x86_64").is_some());
        assert!(raw.base_partition_table("s390x").is_none());
        assert!(!raw.lvmify());
    }
}
