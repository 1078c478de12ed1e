//! Distribution package sets, named by [`PackageSetSource`].

use super::image_type::ImageTypeRef;
use super::{AARCH64, PPC64LE, S390X, X86_64};
use crate::rpmmd::PackageSet;

/// Where a package set of an image type comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSetSource {
    DistroBuild,
    Ec2Build,
    EdgeBuild,
    EdgeRawImageBuild,
    InstallerBuild,
    EdgeInstallerBuild,
    Qcow2,
    Vhd,
    AzureRhui,
    Vmdk,
    Openstack,
    Ec2,
    RhelEc2,
    RhelEc2Ha,
    RhelEc2Sap,
    BareMetal,
    Anaconda,
    EdgeCommit,
    EdgeSimplifiedInstaller,
    /// A fixed list independent of architecture and distribution.
    Literal(PackageSet),
}

/// Expand `source` for the architecture and distribution of `image_type`.
pub fn resolve(source: &PackageSetSource, image_type: &ImageTypeRef<'_>) -> PackageSet {
    let arch = image_type.arch_name();
    let rhel = image_type.distro.is_rhel();
    match source {
        PackageSetSource::DistroBuild => distro_build(arch),
        PackageSetSource::Ec2Build => distro_build(arch).append(PackageSet::new(["python3-pyyaml"])),
        PackageSetSource::EdgeBuild => distro_build(arch).append(PackageSet::new(["rpm-ostree"])),
        PackageSetSource::EdgeRawImageBuild => distro_build(arch)
            .append(PackageSet::new(["rpm-ostree"]))
            .append(efi_boot_packages(arch)),
        PackageSetSource::InstallerBuild => installer_build(arch),
        PackageSetSource::EdgeInstallerBuild => {
            installer_build(arch).append(PackageSet::new(["rpm-ostree"]))
        }
        PackageSetSource::Qcow2 => qcow2(rhel).append(boot_packages(arch)),
        PackageSetSource::Vhd => vhd().append(boot_packages(arch)),
        PackageSetSource::AzureRhui => azure_rhui().append(boot_packages(arch)),
        PackageSetSource::Vmdk => vmdk().append(boot_packages(arch)),
        PackageSetSource::Openstack => openstack().append(boot_packages(arch)),
        PackageSetSource::Ec2 => ec2_common(rhel).append(boot_packages(arch)),
        PackageSetSource::RhelEc2 => ec2_common(rhel)
            .append(boot_packages(arch))
            .append(PackageSet::new(["rh-amazon-rhui-client"]).with_exclude(["alsa-lib"])),
        PackageSetSource::RhelEc2Ha => ec2_common(rhel).append(boot_packages(arch)).append(
            PackageSet::new([
                "fence-agents-all",
                "pacemaker",
                "pcs",
                "rh-amazon-rhui-client-ha",
            ])
            .with_exclude(["alsa-lib"]),
        ),
        PackageSetSource::RhelEc2Sap => ec2_common(rhel)
            .append(boot_packages(arch))
            .append(ec2_sap()),
        PackageSetSource::BareMetal => bare_metal(rhel).append(boot_packages(arch)),
        PackageSetSource::Anaconda => anaconda(arch),
        PackageSetSource::EdgeCommit => edge_commit(rhel).append(edge_boot_packages(arch)),
        PackageSetSource::EdgeSimplifiedInstaller => edge_simplified_installer(arch),
        PackageSetSource::Literal(set) => set.clone(),
    }
}

fn release_packages(rhel: bool) -> PackageSet {
    if rhel {
        PackageSet::new(["redhat-release", "redhat-release-eula"])
    } else {
        PackageSet::new(["centos-stream-release"])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Build roots
// ─────────────────────────────────────────────────────────────────────────────

fn distro_build(arch: &str) -> PackageSet {
    let common = PackageSet::new([
        "dnf",
        "dosfstools",
        "e2fsprogs",
        "glibc",
        "lorax-templates-generic",
        "lorax-templates-rhel",
        "lvm2",
        "policycoreutils",
        "python36",
        "python3-iniparse",
        "qemu-img",
        "selinux-policy-targeted",
        "systemd",
        "tar",
        "xfsprogs",
        "xz",
    ]);
    let arch_specific = match arch {
        X86_64 => PackageSet::new(["grub2-pc"]),
        PPC64LE => PackageSet::new(["grub2-ppc64le", "grub2-ppc64le-modules"]),
        _ => PackageSet::default(),
    };
    common.append(arch_specific)
}

fn installer_build(arch: &str) -> PackageSet {
    let installer = PackageSet::new([
        "efibootmgr",
        "genisoimage",
        "isomd5sum",
        "lorax",
        "rpm-ostree",
        "squashfs-tools",
        "xorriso",
    ]);
    let arch_specific = match arch {
        X86_64 => PackageSet::new([
            "grub2-efi-ia32-cdboot",
            "grub2-efi-x64",
            "grub2-efi-x64-cdboot",
            "shim-ia32",
            "shim-x64",
            "syslinux",
            "syslinux-nonlinux",
        ]),
        AARCH64 => PackageSet::new(["grub2-efi-aa64-cdboot", "shim-aa64"]),
        _ => PackageSet::default(),
    };
    distro_build(arch).append(installer).append(arch_specific)
}

// ─────────────────────────────────────────────────────────────────────────────
// Boot loaders
// ─────────────────────────────────────────────────────────────────────────────

fn boot_packages(arch: &str) -> PackageSet {
    match arch {
        X86_64 => PackageSet::new([
            "dracut-config-generic",
            "grub2-pc",
            "grub2-efi-x64",
            "shim-x64",
        ]),
        AARCH64 => PackageSet::new([
            "dracut-config-generic",
            "efibootmgr",
            "grub2-efi-aa64",
            "grub2-tools",
            "shim-aa64",
        ]),
        PPC64LE => PackageSet::new([
            "dracut-config-generic",
            "powerpc-utils",
            "grub2-ppc64le",
            "grub2-ppc64le-modules",
        ]),
        S390X => PackageSet::new(["dracut-config-generic", "s390utils-base"]),
        _ => PackageSet::default(),
    }
}

fn efi_boot_packages(arch: &str) -> PackageSet {
    match arch {
        X86_64 => PackageSet::new(["efibootmgr", "grub2-efi-x64", "grub2-pc", "shim-x64"]),
        AARCH64 => PackageSet::new(["efibootmgr", "grub2-efi-aa64", "shim-aa64"]),
        _ => PackageSet::default(),
    }
}

fn edge_boot_packages(arch: &str) -> PackageSet {
    match arch {
        X86_64 => PackageSet::new([
            "grub2",
            "grub2-efi-x64",
            "efibootmgr",
            "shim-x64",
            "microcode_ctl",
            "iwl1000-firmware",
            "iwl100-firmware",
            "iwl105-firmware",
            "iwl135-firmware",
            "iwl2000-firmware",
            "iwl2030-firmware",
            "iwl3160-firmware",
            "iwl5000-firmware",
            "iwl5150-firmware",
            "iwl6050-firmware",
            "iwl7260-firmware",
        ]),
        AARCH64 => PackageSet::new([
            "grub2-efi-aa64",
            "efibootmgr",
            "shim-aa64",
            "iwl7260-firmware",
        ]),
        _ => PackageSet::default(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operating system payloads
// ─────────────────────────────────────────────────────────────────────────────

fn qcow2(rhel: bool) -> PackageSet {
    PackageSet::new([
        "@core",
        "authselect-compat",
        "chrony",
        "cloud-init",
        "cloud-utils-growpart",
        "cockpit-system",
        "cockpit-ws",
        "dhcp-client",
        "dnf",
        "dnf-utils",
        "dosfstools",
        "dracut-norescue",
        "net-tools",
        "NetworkManager",
        "nfs-utils",
        "oddjob",
        "oddjob-mkhomedir",
        "psmisc",
        "python3-jsonschema",
        "qemu-guest-agent",
        "rsync",
        "tar",
        "tcpdump",
        "yum",
    ])
    .with_exclude([
        "aic94xx-firmware",
        "alsa-firmware",
        "alsa-lib",
        "alsa-tools-firmware",
        "biosdevname",
        "dnf-plugin-spacewalk",
        "dracut-config-rescue",
        "fedora-release",
        "fedora-repos",
        "firewalld",
        "iprutils",
        "ivtv-firmware",
        "langpacks-*",
        "langpacks-en",
        "libertas-sd8787-firmware",
        "nss",
        "plymouth",
        "rng-tools",
        "udisks2",
    ])
    .append(release_packages(rhel))
}

fn vhd() -> PackageSet {
    PackageSet::new([
        "@core",
        "chrony",
        "cloud-init",
        "cloud-utils-growpart",
        "dhcp-client",
        "dnf",
        "langpacks-en",
        "net-tools",
        "NetworkManager",
        "WALinuxAgent",
        "yum",
    ])
    .with_exclude(["dracut-config-rescue", "rng-tools"])
}

fn azure_rhui() -> PackageSet {
    PackageSet::new([
        "@Server",
        "NetworkManager",
        "NetworkManager-cloud-setup",
        "WALinuxAgent",
        "bzip2",
        "cloud-init",
        "cloud-utils-growpart",
        "cracklib-dicts",
        "dnf-plugin-subscription-manager",
        "dosfstools",
        "gdisk",
        "hyperv-daemons",
        "kernel-core",
        "kernel-modules",
        "lvm2",
        "nvme-cli",
        "rhc",
        "rhui-azure-rhel8",
        "uuid",
    ])
    .with_exclude([
        "aic94xx-firmware",
        "alsa-firmware",
        "alsa-sof-firmware",
        "biosdevname",
        "bolt",
        "dracut-config-rescue",
        "glibc-all-langpacks",
        "iprutils",
        "ivtv-firmware",
        "NetworkManager-config-server",
        "plymouth",
        "rng-tools",
    ])
}

fn vmdk() -> PackageSet {
    PackageSet::new([
        "@core",
        "chrony",
        "firewalld",
        "langpacks-en",
        "open-vm-tools",
        "selinux-policy-targeted",
    ])
    .with_exclude(["dracut-config-rescue", "rng-tools"])
}

fn openstack() -> PackageSet {
    PackageSet::new([
        "@Core",
        "langpacks-en",
        "cloud-init",
        "qemu-guest-agent",
        "spice-vdagent",
    ])
    .with_exclude(["dracut-config-rescue", "rng-tools"])
}

fn ec2_common(rhel: bool) -> PackageSet {
    PackageSet::new([
        "@core",
        "authselect-compat",
        "chrony",
        "cloud-init",
        "cloud-utils-growpart",
        "dhcp-client",
        "yum-utils",
        "dracut-config-generic",
        "dracut-norescue",
        "gdisk",
        "grub2",
        "langpacks-en",
        "NetworkManager",
        "NetworkManager-cloud-setup",
        "rsync",
        "tar",
    ])
    .with_exclude([
        "aic94xx-firmware",
        "alsa-firmware",
        "alsa-tools-firmware",
        "biosdevname",
        "iprutils",
        "ivtv-firmware",
        "libertas-sd8787-firmware",
        "plymouth",
        "rng-tools",
    ])
    .append(release_packages(rhel))
}

fn ec2_sap() -> PackageSet {
    PackageSet::new([
        "@Server",
        "bind-utils",
        "compat-sap-c++-9",
        "compat-sap-c++-10",
        "libcanberra-gtk2",
        "libnsl",
        "nfs-utils",
        "tuned-profiles-sap-hana",
        "uuidd",
        "rh-amazon-rhui-client-sap-bundle-e4s",
    ])
    .with_exclude(["alsa-lib"])
}

fn bare_metal(rhel: bool) -> PackageSet {
    PackageSet::new([
        "@core",
        "authselect-compat",
        "chrony",
        "cockpit-system",
        "cockpit-ws",
        "dhcp-client",
        "dnf",
        "dnf-utils",
        "dosfstools",
        "dracut-norescue",
        "iwl1000-firmware",
        "iwl100-firmware",
        "iwl105-firmware",
        "iwl135-firmware",
        "iwl2000-firmware",
        "iwl2030-firmware",
        "iwl3160-firmware",
        "iwl5000-firmware",
        "iwl5150-firmware",
        "iwl6050-firmware",
        "iwl7260-firmware",
        "lvm2",
        "net-tools",
        "NetworkManager",
        "nfs-utils",
        "oddjob",
        "oddjob-mkhomedir",
        "policycoreutils",
        "psmisc",
        "python3-jsonschema",
        "qemu-guest-agent",
        "rsync",
        "selinux-policy-targeted",
        "tar",
        "tcpdump",
        "yum",
    ])
    .with_exclude(["dracut-config-rescue"])
    .append(release_packages(rhel))
}

fn anaconda(arch: &str) -> PackageSet {
    let common = PackageSet::new([
        "aajohan-comfortaa-fonts",
        "abattis-cantarell-fonts",
        "alsa-firmware",
        "alsa-tools-firmware",
        "anaconda",
        "anaconda-dracut",
        "anaconda-install-env-deps",
        "anaconda-widgets",
        "audit",
        "bind-utils",
        "bzip2",
        "cryptsetup",
        "curl",
        "dbus-x11",
        "dejavu-sans-fonts",
        "dejavu-sans-mono-fonts",
        "device-mapper-persistent-data",
        "dmidecode",
        "dnf",
        "dracut-config-generic",
        "dracut-network",
        "efibootmgr",
        "ethtool",
        "fcoe-utils",
        "ftp",
        "gdb-gdbserver",
        "glibc-all-langpacks",
        "gnome-kiosk",
        "google-noto-sans-cjk-ttc-fonts",
        "grubby",
        "hdparm",
        "hostname",
        "initscripts",
        "ipmitool",
        "jomolhari-fonts",
        "kbd",
        "kbd-misc",
        "kdump-anaconda-addon",
        "kernel",
        "less",
        "libblockdev-lvm-dbus",
        "libibverbs",
        "libreport-plugin-bugzilla",
        "libreport-plugin-reportuploader",
        "librsvg2",
        "linux-firmware",
        "lklug-fonts",
        "lldpad",
        "lohit-assamese-fonts",
        "lsof",
        "lvm2",
        "mdadm",
        "mt-st",
        "mtr",
        "net-tools",
        "nfs-utils",
        "nm-connection-editor",
        "nmap-ncat",
        "nss-tools",
        "openssh-clients",
        "openssh-server",
        "oscap-anaconda-addon",
        "pciutils",
        "perl-interpreter",
        "pigz",
        "plymouth",
        "prefixdevname",
        "python3-pyatspi",
        "rdma-core",
        "redhat-release-eula",
        "rng-tools",
        "rpcbind",
        "rpm-ostree",
        "rsync",
        "rsyslog",
        "selinux-policy-targeted",
        "sg3_utils",
        "smartmontools",
        "spice-vdagent",
        "strace",
        "systemd",
        "tar",
        "tigervnc-server-minimal",
        "tigervnc-server-module",
        "udisks2",
        "udisks2-iscsi",
        "usbutils",
        "vim-minimal",
        "volume_key",
        "wget",
        "xfsdump",
        "xfsprogs",
        "xorg-x11-drivers",
        "xorg-x11-fonts-misc",
        "xorg-x11-server-Xorg",
        "xorg-x11-xauth",
        "xz",
    ]);
    let arch_specific = match arch {
        X86_64 => PackageSet::new([
            "biosdevname",
            "dmidecode",
            "grub2-efi-ia32-cdboot",
            "grub2-efi-x64-cdboot",
            "grub2-tools",
            "grub2-tools-efi",
            "grub2-tools-extra",
            "iwl1000-firmware",
            "iwl7260-firmware",
            "memtest86+",
            "shim-ia32",
            "shim-x64",
            "syslinux",
            "syslinux-nonlinux",
        ]),
        AARCH64 => PackageSet::new([
            "grub2-efi-aa64-cdboot",
            "grub2-tools",
            "grub2-tools-extra",
            "shim-aa64",
        ]),
        _ => PackageSet::default(),
    };
    common.append(arch_specific)
}

fn edge_commit(rhel: bool) -> PackageSet {
    PackageSet::new([
        "glibc",
        "glibc-minimal-langpack",
        "nss-altfiles",
        "dracut-config-generic",
        "dracut-network",
        "basesystem",
        "bash",
        "platform-python",
        "shadow-utils",
        "chrony",
        "setup",
        "sudo",
        "systemd",
        "coreutils",
        "util-linux",
        "curl",
        "vim-minimal",
        "rpm",
        "rpm-ostree",
        "polkit",
        "lvm2",
        "cryptsetup",
        "pinentry",
        "e2fsprogs",
        "dosfstools",
        "keyutils",
        "gnupg2",
        "attr",
        "xz",
        "gzip",
        "firewalld",
        "iptables",
        "NetworkManager",
        "NetworkManager-wifi",
        "NetworkManager-wwan",
        "wpa_supplicant",
        "dnsmasq",
        "traceroute",
        "hostname",
        "iproute",
        "iputils",
        "openssh-clients",
        "procps-ng",
        "rootfiles",
        "openssh-server",
        "passwd",
        "policycoreutils",
        "policycoreutils-python-utils",
        "selinux-policy-targeted",
        "setools-console",
        "less",
        "tar",
        "rsync",
        "fwupd",
        "usbguard",
        "bash-completion",
        "tmux",
        "ima-evm-utils",
        "audit",
        "podman",
        "container-selinux",
        "skopeo",
        "criu",
        "slirp4netns",
        "fuse-overlayfs",
        "clevis",
        "clevis-dracut",
        "clevis-luks",
        "greenboot",
        "greenboot-grub2",
        "greenboot-rpm-ostree-grub2",
        "greenboot-reboot",
        "greenboot-status",
        "fdo-client",
        "fdo-owner-cli",
    ])
    .with_exclude(["rng-tools"])
    .append(release_packages(rhel))
}

fn edge_simplified_installer(arch: &str) -> PackageSet {
    let common = PackageSet::new([
        "attr",
        "basesystem",
        "binutils",
        "bsdtar",
        "clevis-dracut",
        "clevis-luks",
        "cloud-utils-growpart",
        "coreos-installer",
        "coreos-installer-dracut",
        "coreutils",
        "device-mapper-multipath",
        "dnsmasq",
        "dosfstools",
        "dracut-live",
        "e2fsprogs",
        "fcoe-utils",
        "fdo-init",
        "gzip",
        "ima-evm-utils",
        "iproute",
        "iptables",
        "iputils",
        "iscsi-initiator-utils",
        "keyutils",
        "lldpad",
        "lvm2",
        "passwd",
        "policycoreutils",
        "policycoreutils-python-utils",
        "procps-ng",
        "rootfiles",
        "setools-console",
        "sudo",
        "traceroute",
        "util-linux",
    ]);
    let arch_specific = match arch {
        X86_64 => PackageSet::new(["grub2-efi-x64-cdboot", "shim-x64", "syslinux"]),
        AARCH64 => PackageSet::new(["grub2-efi-aa64-cdboot", "shim-aa64"]),
        _ => PackageSet::default(),
    };
    common.append(arch_specific)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distro::Catalog;

    fn resolved(distro: &str, arch: &str, image_type: &str, source: PackageSetSource) -> PackageSet {
        let catalog = Catalog::new().expect("catalog");
        let it = catalog
            .get_distro(distro)
            .and_then(|d| d.get_arch(arch))
            .and_then(|a| a.get_image_type(image_type))
            .expect("image type");
        resolve(&source, &it)
    }

    #[test]
    fn release_package_follows_vendor() {
        let rhel = resolved("rhel-86", X86_64, "edge-commit", PackageSetSource::EdgeCommit);
        assert!(rhel.include.contains(&"redhat-release".to_string()));

        let centos = resolved("centos-8", X86_64, "edge-commit", PackageSetSource::EdgeCommit);
        assert!(centos.include.contains(&"centos-stream-release".to_string()));
        assert!(!centos.include.contains(&"redhat-release".to_string()));
        assert_eq!(centos.exclude, vec!["rng-tools"]);
    }

    #[test]
    fn build_roots_carry_arch_bootloaders() {
        let x86 = resolved("rhel-86", X86_64, "qcow2", PackageSetSource::DistroBuild);
        assert!(x86.include.contains(&"grub2-pc".to_string()));

        let aarch64 = resolved("rhel-86", AARCH64, "qcow2", PackageSetSource::DistroBuild);
        assert!(!aarch64.include.contains(&"grub2-pc".to_string()));

        let edge = resolved("rhel-86", AARCH64, "edge-commit", PackageSetSource::EdgeBuild);
        assert!(edge.include.contains(&"rpm-ostree".to_string()));
    }
}
