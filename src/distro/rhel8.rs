//! RHEL 8.6, RHEL 8.7 and CentOS Stream 8.

use tracing::debug;

use super::catalog::{Architecture, Distribution};
use super::image_config::{Keyboard, SelinuxState, Sysconfig};
use super::image_type::{BasePartitionTables, DiskFormat, DiskImage, ImageKind, ImageType, OSTreeImage};
use super::package_sets::PackageSetSource;
use super::partition_tables::{azure_rhui_tables, default_tables, ec2_tables, edge_tables};
use super::{sets, BootType, ImageConfig, AARCH64, PPC64LE, S390X, X86_64};
use crate::disk::GIB;
use crate::error::Result;
use crate::rpmmd::PackageSet;

struct Release {
    name: &'static str,
    product: &'static str,
    os_version: &'static str,
    vendor: &'static str,
    ostree_ref: &'static str,
    iso_label: &'static str,
    runner: &'static str,
}

const RELEASES: &[Release] = &[
    Release {
        name: "rhel-86",
        product: "Red Hat Enterprise Linux",
        os_version: "8.6",
        vendor: "redhat",
        ostree_ref: "rhel/8/{arch}/edge",
        iso_label: "RHEL-8-6-0-BaseOS-{arch}",
        runner: "org.osbuild.rhel86",
    },
    Release {
        name: "rhel-87",
        product: "Red Hat Enterprise Linux",
        os_version: "8.7",
        vendor: "redhat",
        ostree_ref: "rhel/8/{arch}/edge",
        iso_label: "RHEL-8-7-0-BaseOS-{arch}",
        runner: "org.osbuild.rhel87",
    },
    Release {
        name: "centos-8",
        product: "CentOS Stream",
        os_version: "8-stream",
        vendor: "centos",
        ostree_ref: "centos/8/{arch}/edge",
        iso_label: "CentOS-Stream-8-{arch}-dvd",
        runner: "org.osbuild.centos8",
    },
];

const EDGE_SERVICES: &[&str] = &[
    "NetworkManager.service",
    "firewalld.service",
    "sshd.service",
    "fdo-client-linuxapp.service",
];

const EC2_KERNEL_OPTIONS: &str = "console=ttyS0,115200n8 console=tty0 net.ifnames=0 rd.blacklist=nouveau nvme_core.io_timeout=4294967295 crashkernel=auto";
const EC2_AARCH64_KERNEL_OPTIONS: &str = "console=ttyS0,115200n8 console=tty0 net.ifnames=0 rd.blacklist=nouveau nvme_core.io_timeout=4294967295 iommu.strict=0 crashkernel=auto";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn us_keyboard() -> Keyboard {
    Keyboard {
        keymap: "us".to_string(),
        x11_layouts: vec!["us".to_string()],
    }
}

fn distro_image_config() -> ImageConfig {
    ImageConfig {
        timezone: Some("America/New_York".to_string()),
        locale: Some("en_US.UTF-8".to_string()),
        sysconfig: Some(Sysconfig {
            default_kernel: "kernel".to_string(),
            networking: true,
            no_zero_conf: true,
        }),
        ..Default::default()
    }
}

fn edge_config() -> ImageConfig {
    ImageConfig {
        enabled_services: strings(EDGE_SERVICES),
        ..Default::default()
    }
}

fn ec2_config() -> ImageConfig {
    ImageConfig {
        timezone: Some("UTC".to_string()),
        ntp_servers: vec!["169.254.169.123".to_string()],
        keyboard: Some(us_keyboard()),
        enabled_services: strings(&[
            "sshd",
            "NetworkManager",
            "nm-cloud-setup.service",
            "nm-cloud-setup.timer",
            "cloud-init",
            "cloud-init-local",
            "cloud-config",
            "cloud-final",
            "reboot.target",
        ]),
        default_target: Some("multi-user.target".to_string()),
        sysconfig: Some(Sysconfig {
            default_kernel: "kernel".to_string(),
            networking: true,
            no_zero_conf: true,
        }),
        ..Default::default()
    }
}

fn disk(format: DiskFormat, xz: bool, tables: BasePartitionTables) -> ImageKind {
    ImageKind::Disk(DiskImage { format, xz, tables })
}

fn literal(include: &[&str]) -> PackageSetSource {
    PackageSetSource::Literal(PackageSet::new(include.iter().copied()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Image types
// ─────────────────────────────────────────────────────────────────────────────

fn edge_commit() -> ImageType {
    ImageType::new(
        "edge-commit",
        "commit.tar",
        "application/x-tar",
        ImageKind::OSTree(OSTreeImage::Commit),
    )
    .alias("rhel-edge-commit")
    .package_set(sets::BUILD, PackageSetSource::EdgeBuild)
    .package_set(sets::PACKAGES, PackageSetSource::EdgeCommit)
    .config(edge_config())
    .pipelines(&["build"], &["ostree-tree", "ostree-commit", "commit-archive"])
    .exports(&["commit-archive"])
}

fn edge_container() -> ImageType {
    ImageType::new(
        "edge-container",
        "container.tar",
        "application/x-tar",
        ImageKind::OSTree(OSTreeImage::Container),
    )
    .alias("rhel-edge-container")
    .package_set(sets::BUILD, PackageSetSource::EdgeBuild)
    .package_set(sets::PACKAGES, PackageSetSource::EdgeCommit)
    .package_set(sets::CONTAINER, literal(&["nginx"]))
    .config(edge_config())
    .pipelines(
        &["build"],
        &["ostree-tree", "ostree-commit", "container-tree", "container"],
    )
    .exports(&["container"])
}

fn edge_raw_image() -> ImageType {
    ImageType::new(
        "edge-raw-image",
        "image.raw.xz",
        "application/xz",
        ImageKind::OSTree(OSTreeImage::RawImage {
            tables: edge_tables(),
        }),
    )
    .alias("rhel-edge-raw-image")
    .package_set(sets::BUILD, PackageSetSource::EdgeRawImageBuild)
    .default_size(10 * GIB)
    .pipelines(&["build"], &["image-tree", "image", "archive"])
    .exports(&["archive"])
}

fn edge_installer() -> ImageType {
    ImageType::new(
        "edge-installer",
        "installer.iso",
        "application/x-iso9660-image",
        ImageKind::OSTree(OSTreeImage::Installer),
    )
    .alias("rhel-edge-installer")
    .package_set(sets::BUILD, PackageSetSource::EdgeInstallerBuild)
    .package_set(sets::PACKAGES, PackageSetSource::EdgeCommit)
    .package_set(sets::INSTALLER, PackageSetSource::Anaconda)
    .config(edge_config())
    .pipelines(&["build"], &["anaconda-tree", "bootiso-tree", "bootiso"])
    .exports(&["bootiso"])
}

fn edge_simplified_installer() -> ImageType {
    ImageType::new(
        "edge-simplified-installer",
        "simplified-installer.iso",
        "application/x-iso9660-image",
        ImageKind::OSTree(OSTreeImage::SimplifiedInstaller {
            tables: edge_tables(),
        }),
    )
    .alias("rhel-edge-simplified-installer")
    .package_set(sets::BUILD, PackageSetSource::EdgeInstallerBuild)
    .package_set(sets::INSTALLER, PackageSetSource::EdgeSimplifiedInstaller)
    .config(edge_config())
    .default_size(10 * GIB)
    .pipelines(
        &["build"],
        &[
            "image-tree",
            "image",
            "archive",
            "coi-tree",
            "efiboot-tree",
            "bootiso-tree",
            "bootiso",
        ],
    )
    .exports(&["bootiso"])
}

fn qcow2() -> ImageType {
    ImageType::new(
        "qcow2",
        "disk.qcow2",
        "application/x-qemu-disk",
        disk(
            DiskFormat::Qcow2 {
                compat: "1.1".to_string(),
            },
            false,
            default_tables(),
        ),
    )
    .package_set(sets::BUILD, PackageSetSource::DistroBuild)
    .package_set(sets::PACKAGES, PackageSetSource::Qcow2)
    .config(ImageConfig {
        default_target: Some("multi-user.target".to_string()),
        ..Default::default()
    })
    .kernel_options("console=tty0 console=ttyS0,115200n8 no_timer_check net.ifnames=0 crashkernel=auto")
    .default_size(10 * GIB)
    .pipelines(&["build"], &["os", "image", "qcow2"])
    .exports(&["qcow2"])
}

fn vhd() -> ImageType {
    ImageType::new(
        "vhd",
        "disk.vhd",
        "application/x-vhd",
        disk(DiskFormat::Vpc, false, default_tables()),
    )
    .package_set(sets::BUILD, PackageSetSource::DistroBuild)
    .package_set(sets::PACKAGES, PackageSetSource::Vhd)
    .config(ImageConfig {
        enabled_services: strings(&["sshd", "waagent"]),
        default_target: Some("multi-user.target".to_string()),
        ..Default::default()
    })
    .kernel_options("ro biosdevname=0 rootdelay=300 console=ttyS0 earlyprintk=ttyS0 net.ifnames=0")
    .default_size(4 * GIB)
    .pipelines(&["build"], &["os", "image", "vpc"])
    .exports(&["vpc"])
}

fn azure_rhui() -> ImageType {
    ImageType::new(
        "azure-rhui",
        "disk.vhd",
        "application/x-vhd",
        disk(DiskFormat::Vpc, false, azure_rhui_tables()),
    )
    .package_set(sets::BUILD, PackageSetSource::Ec2Build)
    .package_set(sets::PACKAGES, PackageSetSource::AzureRhui)
    .config(ImageConfig {
        timezone: Some("Etc/UTC".to_string()),
        locale: Some("en_US.UTF-8".to_string()),
        gpg_key_files: strings(&[
            "/etc/pki/rpm-gpg/RPM-GPG-KEY-microsoft-azure-release",
            "/etc/pki/rpm-gpg/RPM-GPG-KEY-redhat-release",
        ]),
        keyboard: Some(us_keyboard()),
        sysconfig: Some(Sysconfig {
            default_kernel: "kernel-core".to_string(),
            networking: true,
            no_zero_conf: true,
        }),
        enabled_services: strings(&["firewalld", "sshd", "systemd-resolved", "waagent"]),
        default_target: Some("multi-user.target".to_string()),
        ..Default::default()
    })
    .kernel_options("ro crashkernel=auto console=tty1 console=ttyS0 earlyprintk=ttyS0 rootdelay=300")
    .default_size(64 * GIB)
    .pipelines(&["build"], &["os", "image", "vpc"])
    .exports(&["vpc"])
}

fn vmdk() -> ImageType {
    ImageType::new(
        "vmdk",
        "disk.vmdk",
        "application/x-vmdk",
        disk(DiskFormat::Vmdk, false, default_tables()),
    )
    .package_set(sets::BUILD, PackageSetSource::DistroBuild)
    .package_set(sets::PACKAGES, PackageSetSource::Vmdk)
    .kernel_options("ro net.ifnames=0")
    .default_size(4 * GIB)
    .pipelines(&["build"], &["os", "image", "vmdk"])
    .exports(&["vmdk"])
}

fn openstack() -> ImageType {
    ImageType::new(
        "openstack",
        "disk.qcow2",
        "application/x-qemu-disk",
        disk(
            DiskFormat::Qcow2 {
                compat: String::new(),
            },
            false,
            default_tables(),
        ),
    )
    .package_set(sets::BUILD, PackageSetSource::DistroBuild)
    .package_set(sets::PACKAGES, PackageSetSource::Openstack)
    .kernel_options("ro net.ifnames=0")
    .default_size(4 * GIB)
    .pipelines(&["build"], &["os", "image", "qcow2"])
    .exports(&["qcow2"])
}

/// EC2 images; x86_64 boots through BIOS only.
fn ec2_family(name: &str, arch: &str, xz: bool, packages: PackageSetSource) -> ImageType {
    let (filename, mime_type) = if xz {
        ("image.raw.xz", "application/xz")
    } else {
        ("image.raw", "application/octet-stream")
    };
    let kernel_options = if arch == AARCH64 {
        EC2_AARCH64_KERNEL_OPTIONS
    } else {
        EC2_KERNEL_OPTIONS
    };
    let payload: &[&str] = if xz {
        &["os", "image", "archive"]
    } else {
        &["os", "image"]
    };
    let export = if xz { "archive" } else { "image" };

    let it = ImageType::new(name, filename, mime_type, disk(DiskFormat::Raw, xz, ec2_tables()))
        .package_set(sets::BUILD, PackageSetSource::Ec2Build)
        .package_set(sets::PACKAGES, packages)
        .config(ec2_config())
        .kernel_options(kernel_options)
        .default_size(10 * GIB)
        .pipelines(&["build"], payload)
        .exports(&[export]);
    if arch == X86_64 {
        it.boot_type(BootType::Legacy)
    } else {
        it
    }
}

fn ami(arch: &str) -> ImageType {
    ec2_family("ami", arch, false, PackageSetSource::Ec2)
}

fn ec2(arch: &str) -> ImageType {
    ec2_family("ec2", arch, true, PackageSetSource::RhelEc2)
}

fn ec2_ha() -> ImageType {
    ec2_family("ec2-ha", X86_64, true, PackageSetSource::RhelEc2Ha)
}

fn ec2_sap() -> ImageType {
    let config = ImageConfig {
        selinux_state: Some(SelinuxState::Permissive),
        ..Default::default()
    };
    ec2_family("ec2-sap", X86_64, true, PackageSetSource::RhelEc2Sap)
        .config(config.inherit_from(&ec2_config()))
        .kernel_options(&format!(
            "{EC2_KERNEL_OPTIONS} processor.max_cstate=1 intel_idle.max_cstate=1"
        ))
}

fn tar() -> ImageType {
    ImageType::new("tar", "root.tar.xz", "application/x-tar", ImageKind::Tar)
        .package_set(sets::BUILD, PackageSetSource::DistroBuild)
        .package_set(
            sets::PACKAGES,
            PackageSetSource::Literal(
                PackageSet::new(["policycoreutils", "selinux-policy-targeted"])
                    .with_exclude(["rng-tools"]),
            ),
        )
        .pipelines(&["build"], &["os", "root-tar"])
        .exports(&["root-tar"])
}

fn image_installer() -> ImageType {
    ImageType::new(
        "image-installer",
        "installer.iso",
        "application/x-iso9660-image",
        ImageKind::Installer,
    )
    .package_set(sets::BUILD, PackageSetSource::InstallerBuild)
    .package_set(sets::PACKAGES, PackageSetSource::BareMetal)
    .package_set(sets::INSTALLER, PackageSetSource::Anaconda)
    .pipelines(&["build"], &["os", "anaconda-tree", "bootiso-tree", "bootiso"])
    .exports(&["bootiso"])
}

fn oci() -> ImageType {
    qcow2().renamed("oci")
}

// ─────────────────────────────────────────────────────────────────────────────
// Architectures
// ─────────────────────────────────────────────────────────────────────────────

fn add_all(arch: &mut Architecture, image_types: Vec<ImageType>) -> Result<()> {
    for image_type in image_types {
        arch.add_image_type(image_type)?;
    }
    Ok(())
}

fn edge_types() -> Vec<ImageType> {
    vec![
        edge_commit(),
        edge_installer(),
        edge_container(),
        edge_raw_image(),
        edge_simplified_installer(),
    ]
}

fn distribution(release: &Release) -> Result<Distribution> {
    let mut distro = Distribution::new(
        release.name,
        release.product,
        release.os_version,
        "8",
        "platform:el8",
        release.vendor,
        release.ostree_ref,
        release.iso_label,
        release.runner,
        distro_image_config(),
    );
    let rhel = distro.is_rhel();

    let mut x86_64 = Architecture::new(release.name, X86_64, Some("i386-pc"), BootType::Hybrid);
    add_all(
        &mut x86_64,
        vec![qcow2(), vhd(), vmdk(), openstack(), ami(X86_64), tar(), image_installer()],
    )?;
    add_all(&mut x86_64, edge_types())?;
    x86_64.add_image_type(oci())?;

    let mut aarch64 = Architecture::new(release.name, AARCH64, None, BootType::Uefi);
    add_all(
        &mut aarch64,
        vec![qcow2(), openstack(), ami(AARCH64), tar(), image_installer()],
    )?;
    add_all(&mut aarch64, edge_types())?;

    let mut ppc64le = Architecture::new(
        release.name,
        PPC64LE,
        Some("powerpc-ieee1275"),
        BootType::Legacy,
    );
    add_all(&mut ppc64le, vec![qcow2(), tar()])?;

    if rhel {
        x86_64.add_image_type(azure_rhui())?;
        add_all(&mut x86_64, vec![ec2(X86_64), ec2_ha(), ec2_sap()])?;
        aarch64.add_image_type(ec2(AARCH64))?;

        let mut s390x = Architecture::new(release.name, S390X, None, BootType::Legacy);
        add_all(&mut s390x, vec![qcow2(), tar()])?;
        distro.add_arch(s390x)?;
    }

    distro.add_arch(x86_64)?;
    distro.add_arch(aarch64)?;
    distro.add_arch(ppc64le)?;

    debug!(distro = release.name, arches = ?distro.list_arches(), "distribution defined");
    Ok(distro)
}

/// Every RHEL 8 based distribution.
pub fn distributions() -> Result<Vec<Distribution>> {
    RELEASES.iter().map(distribution).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centos_has_no_cloud_rhui_types_or_s390x() {
        let centos = distribution(&RELEASES[2]).expect("centos");
        assert_eq!(centos.list_arches(), vec!["aarch64", "ppc64le", "x86_64"]);
        let x86 = centos.get_arch(X86_64).expect("x86_64");
        assert!(x86.get_image_type("ec2").is_err());
        assert!(x86.get_image_type("azure-rhui").is_err());
    }

    #[test]
    fn edge_aliases_resolve() {
        let rhel = distribution(&RELEASES[0]).expect("rhel");
        let x86 = rhel.get_arch(X86_64).expect("x86_64");
        let it = x86.get_image_type("rhel-edge-commit").expect("alias");
        assert_eq!(it.name(), "edge-commit");
    }

    #[test]
    fn oci_is_a_renamed_qcow2() {
        let rhel = distribution(&RELEASES[0]).expect("rhel");
        let x86 = rhel.get_arch(X86_64).expect("x86_64");
        let oci = x86.get_image_type("oci").expect("oci");
        assert_eq!(oci.filename(), "disk.qcow2");
        assert_eq!(oci.exports(), vec!["qcow2"]);
    }

    #[test]
    fn x86_ec2_images_boot_legacy_only() {
        let rhel = distribution(&RELEASES[0]).expect("rhel");
        let x86 = rhel.get_arch(X86_64).expect("x86_64");
        assert_eq!(x86.get_image_type("ami").expect("ami").boot_type(), BootType::Legacy);
        assert_eq!(x86.get_image_type("qcow2").expect("qcow2").boot_type(), BootType::Hybrid);
        let aarch64 = rhel.get_arch(AARCH64).expect("aarch64");
        assert_eq!(aarch64.get_image_type("ami").expect("ami").boot_type(), BootType::Uefi);
    }

    #[test]
    fn sap_is_permissive_and_keeps_ec2_defaults() {
        let config = ec2_sap().default_config;
        assert_eq!(config.selinux_state, Some(SelinuxState::Permissive));
        assert_eq!(config.timezone.as_deref(), Some("UTC"));
    }
}
