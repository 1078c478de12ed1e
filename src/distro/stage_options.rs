//! Stage options derived from requests, customizations and distribution data.

use std::collections::BTreeMap;

use super::image_type::DiskFormat;
use super::{AARCH64, PPC64LE, X86_64};
use crate::blueprint::{
    FdoCustomization, FirewallCustomization, GroupCustomization, ServicesCustomization,
    UserCustomization,
};
use crate::error::{Error, Result};
use crate::osbuild::stages::{
    AnacondaOptions, BootIsoCompression, BootIsoCompressionOptions, BootIsoEfi, BootIsoIsolinux,
    BootIsoMonoOptions, BootIsoRootfs, BuildstampOptions, ChmodItem, ChmodOptions,
    DiscinfoOptions, DracutOptions, FirewallOptions, FirstBootOptions, GroupEntry, GroupsOptions,
    GrubIsoKernel, GrubIsoOptions, KickstartLiveImg, KickstartOSTree, KickstartOptions,
    LoraxScriptOptions, MkdirOptions, MkdirPath, NginxConfig, NginxConfigOptions,
    OSTreeConfigOptions, OSTreeRepoConfig, OSTreeSysroot, Product, QemuFormat, RpmOptions,
    SelinuxOptions, SystemdOptions, UserEntry, UsersOptions, XorrisofsBoot, XorrisofsOptions,
};
use crate::rpmmd::RepoConfig;

/// Kickstart file written into installer trees.
pub const KICKSTART_PATH: &str = "/osbuild.ks";

/// Path of the FDO root certificates on the simplified installer ISO.
pub const FDO_ROOT_CERTS_PATH: &str = "/fdo_diun_root_certs.pem";

const INSTALL_EXEC_CONTEXT: &str = "system_u:object_r:install_exec_t:s0";

const CRYPT_PREFIXES: &[&str] = &["$6$", "$5$", "$2b$", "$y$"];

/// `true` if `password` is already in crypt(3) form.
pub fn is_crypted(password: &str) -> bool {
    CRYPT_PREFIXES.iter().any(|prefix| password.starts_with(prefix))
}

pub fn rpm_options(repos: &[RepoConfig]) -> RpmOptions {
    RpmOptions {
        gpgkeys: repos
            .iter()
            .filter_map(|repo| repo.gpg_key.clone())
            .filter(|key| !key.is_empty())
            .collect(),
        ..Default::default()
    }
}

/// SELinux labelling; `label_copy` marks `cp` and `tar` as installers so a
/// build root can write files with foreign contexts.
pub fn selinux_options(label_copy: bool) -> SelinuxOptions {
    let mut labels = BTreeMap::new();
    if label_copy {
        for binary in ["/usr/bin/cp", "/usr/bin/tar"] {
            labels.insert(binary.to_string(), INSTALL_EXEC_CONTEXT.to_string());
        }
    }
    SelinuxOptions {
        file_contexts: "etc/selinux/targeted/contexts/files/file_contexts".to_string(),
        labels,
    }
}

/// Users stage options. Plaintext passwords are rejected since hashing
/// happens before requests reach the compiler.
pub fn users_options(users: &[UserCustomization]) -> Result<UsersOptions> {
    let mut options = UsersOptions::default();
    for user in users {
        if let Some(password) = &user.password {
            if !is_crypted(password) {
                return Err(Error::Validation(format!(
                    "password for user {:?} must be crypt(3) hashed",
                    user.name
                )));
            }
        }
        options.users.insert(
            user.name.clone(),
            UserEntry {
                uid: user.uid,
                gid: user.gid,
                groups: user.groups.clone(),
                description: user.description.clone(),
                home: user.home.clone(),
                shell: user.shell.clone(),
                password: user.password.clone(),
                key: user.key.clone(),
            },
        );
    }
    Ok(options)
}

/// First-boot commands installing SSH keys for users of an OSTree system,
/// where home directories live below `/var`.
pub fn users_first_boot_options(users: &UsersOptions) -> FirstBootOptions {
    const VAR_HOME: &str = "/var/home";
    const ROOT_HOME: &str = "/var/roothome";

    let mut commands = Vec::new();
    for (name, user) in &users.users {
        let Some(key) = &user.key else { continue };
        let home = if name == "root" {
            ROOT_HOME.to_string()
        } else {
            format!("{VAR_HOME}/{name}")
        };
        let ssh_dir = format!("{home}/.ssh");
        commands.push(format!("mkdir -p {ssh_dir}"));
        commands.push(format!(
            "sh -c 'echo {key:?} >> {:?}'",
            format!("{ssh_dir}/authorized_keys")
        ));
        commands.push(format!("chown {name}:{name} -Rc {ssh_dir}"));
    }
    commands.push(format!("restorecon -rvF {VAR_HOME}"));
    commands.push(format!("restorecon -rvF {ROOT_HOME}"));

    FirstBootOptions {
        commands,
        wait_for_network: false,
    }
}

pub fn groups_options(groups: &[GroupCustomization]) -> GroupsOptions {
    GroupsOptions {
        groups: groups
            .iter()
            .map(|group| {
                (
                    group.name.clone(),
                    GroupEntry {
                        name: group.name.clone(),
                        gid: group.gid,
                    },
                )
            })
            .collect(),
    }
}

pub fn firewall_options(firewall: &FirewallCustomization) -> FirewallOptions {
    let (enabled_services, disabled_services) = match &firewall.services {
        Some(services) => (services.enabled.clone(), services.disabled.clone()),
        None => (Vec::new(), Vec::new()),
    };
    FirewallOptions {
        ports: firewall.ports.clone(),
        enabled_services,
        disabled_services,
    }
}

/// Image defaults followed by the blueprint's services.
pub fn systemd_options(
    enabled: &[String],
    disabled: &[String],
    services: Option<&ServicesCustomization>,
    default_target: &str,
) -> SystemdOptions {
    let mut enabled_services = enabled.to_vec();
    let mut disabled_services = disabled.to_vec();
    if let Some(services) = services {
        enabled_services.extend(services.enabled.iter().cloned());
        disabled_services.extend(services.disabled.iter().cloned());
    }
    SystemdOptions {
        enabled_services,
        disabled_services,
        default_target: default_target.to_string(),
    }
}

pub fn buildstamp_options(arch: &str, product: &str, os_version: &str, variant: &str) -> BuildstampOptions {
    BuildstampOptions {
        arch: arch.to_string(),
        product: product.to_string(),
        version: os_version.to_string(),
        variant: variant.to_string(),
        is_final: true,
    }
}

pub fn anaconda_options() -> AnacondaOptions {
    AnacondaOptions {
        kickstart_modules: [
            "org.fedoraproject.Anaconda.Modules.Network",
            "org.fedoraproject.Anaconda.Modules.Payloads",
            "org.fedoraproject.Anaconda.Modules.Storage",
        ]
        .map(str::to_string)
        .to_vec(),
    }
}

pub fn lorax_script_options(arch: &str) -> LoraxScriptOptions {
    LoraxScriptOptions {
        path: "99-generic/runtime-postinstall.tmpl".to_string(),
        basearch: arch.to_string(),
    }
}

const DRACUT_MODULES: &[&str] = &[
    "bash",
    "systemd",
    "fips",
    "systemd-initrd",
    "modsign",
    "nss-softokn",
    "i18n",
    "convertfs",
    "network-manager",
    "network",
    "ifcfg",
    "url-lib",
    "drm",
    "plymouth",
    "prefixdevname",
    "prefixdevname-tools",
    "crypt",
    "dm",
    "dmsquash-live",
    "kernel-modules",
    "kernel-modules-extra",
    "kernel-network-modules",
    "livenet",
    "lvm",
    "mdraid",
    "qemu",
    "qemu-net",
    "resume",
    "rootfs-block",
    "terminfo",
    "udev-rules",
    "dracut-systemd",
    "pollcdrom",
    "usrmount",
    "base",
    "fs-lib",
    "img-lib",
    "shutdown",
    "uefi-lib",
];

/// Initramfs for a live installer environment.
pub fn dracut_options(kernel_version: &str, arch: &str, extra_modules: &[&str]) -> DracutOptions {
    let mut modules: Vec<String> = DRACUT_MODULES.iter().map(|m| m.to_string()).collect();
    if arch == X86_64 {
        modules.push("biosdevname".to_string());
    }
    modules.extend(extra_modules.iter().map(|m| m.to_string()));
    DracutOptions {
        kernel: vec![kernel_version.to_string()],
        modules,
        install: vec!["/.buildstamp".to_string()],
    }
}

/// Kickstart installing a live image tarball.
pub fn tar_kickstart_options(tar_url: &str) -> KickstartOptions {
    KickstartOptions {
        path: KICKSTART_PATH.to_string(),
        liveimg: Some(KickstartLiveImg {
            url: tar_url.to_string(),
        }),
        ostree: None,
    }
}

/// Kickstart deploying `reference` from an OSTree repository.
pub fn ostree_kickstart_options(url: &str, reference: &str) -> KickstartOptions {
    KickstartOptions {
        path: KICKSTART_PATH.to_string(),
        liveimg: None,
        ostree: Some(KickstartOSTree {
            osname: "rhel".to_string(),
            url: url.to_string(),
            reference: reference.to_string(),
            gpg: false,
        }),
    }
}

fn efi_architectures(arch: &str) -> Result<Vec<String>> {
    let names: &[&str] = match arch {
        X86_64 => &["IA32", "X64"],
        AARCH64 => &["AA64"],
        other => {
            return Err(Error::Config(format!(
                "unsupported architecture for boot ISO: {other}"
            )))
        }
    };
    Ok(names.iter().map(|n| n.to_string()).collect())
}

/// Branch/call/jump filter for squashfs compression, when xz has one.
fn bcj_filter(arch: &str) -> Option<&'static str> {
    match arch {
        X86_64 => Some("x86"),
        AARCH64 => Some("arm"),
        PPC64LE => Some("powerpc"),
        _ => None,
    }
}

pub fn bootiso_mono_options(
    kernel_version: &str,
    arch: &str,
    vendor: &str,
    product: &str,
    os_version: &str,
    isolabel: &str,
) -> Result<BootIsoMonoOptions> {
    Ok(BootIsoMonoOptions {
        product: Product {
            name: product.to_string(),
            version: os_version.to_string(),
        },
        isolabel: isolabel.to_string(),
        kernel: kernel_version.to_string(),
        kernel_opts: format!("inst.ks=hd:LABEL={isolabel}:{KICKSTART_PATH}"),
        efi: BootIsoEfi {
            architectures: efi_architectures(arch)?,
            vendor: vendor.to_string(),
        },
        isolinux: BootIsoIsolinux {
            enabled: arch == X86_64,
            debug: false,
        },
        templates: "80-rhel".to_string(),
        rootfs: BootIsoRootfs {
            size: 9216,
            compression: BootIsoCompression {
                method: "xz".to_string(),
                options: bcj_filter(arch).map(|bcj| BootIsoCompressionOptions {
                    bcj: bcj.to_string(),
                }),
            },
        },
    })
}

/// GRUB2 ISO for coreos-installer, writing the image to `install_device`
/// and onboarding through FDO.
#[allow(clippy::too_many_arguments)]
pub fn grub_iso_options(
    install_device: &str,
    arch: &str,
    vendor: &str,
    product: &str,
    os_version: &str,
    isolabel: &str,
    fdo: &FdoCustomization,
) -> Result<GrubIsoOptions> {
    let mut opts: Vec<String> = vec![
        "rd.neednet=1".to_string(),
        "coreos.inst.crypt_root=1".to_string(),
        format!("coreos.inst.isoroot={isolabel}"),
        format!("coreos.inst.install_dev={install_device}"),
        "coreos.inst.image_file=/run/media/iso/disk.img.xz".to_string(),
        "coreos.inst.insecure".to_string(),
    ];
    opts.extend(fdo_kernel_options(fdo));

    Ok(GrubIsoOptions {
        product: Product {
            name: product.to_string(),
            version: os_version.to_string(),
        },
        isolabel: isolabel.to_string(),
        kernel: GrubIsoKernel {
            dir: "/images/pxeboot".to_string(),
            opts,
        },
        architectures: efi_architectures(arch)?,
        vendor: vendor.to_string(),
    })
}

/// Kernel arguments pointing the FDO client at its manufacturing server.
pub fn fdo_kernel_options(fdo: &FdoCustomization) -> Vec<String> {
    let mut opts = vec![format!(
        "fdo.manufacturing_server_url={}",
        fdo.manufacturing_server_url
    )];
    if !fdo.diun_pub_key_insecure.is_empty() {
        opts.push(format!(
            "fdo.diun_pub_key_insecure={}",
            fdo.diun_pub_key_insecure
        ));
    }
    if !fdo.diun_pub_key_hash.is_empty() {
        opts.push(format!("fdo.diun_pub_key_hash={}", fdo.diun_pub_key_hash));
    }
    if !fdo.diun_pub_key_root_certs.is_empty() {
        opts.push(format!("fdo.diun_pub_key_root_certs={FDO_ROOT_CERTS_PATH}"));
    }
    opts
}

pub fn discinfo_options(arch: &str) -> DiscinfoOptions {
    DiscinfoOptions {
        basearch: arch.to_string(),
        release: "202010217.n.0".to_string(),
    }
}

/// ISO9660 image options; `isolinux` adds the BIOS boot catalog.
pub fn xorrisofs_options(filename: &str, volid: &str, isolinux: bool) -> XorrisofsOptions {
    XorrisofsOptions {
        filename: filename.to_string(),
        volid: volid.to_string(),
        sysid: "LINUX".to_string(),
        boot: isolinux.then(|| XorrisofsBoot {
            image: "isolinux/isolinux.bin".to_string(),
            catalog: "isolinux/boot.cat".to_string(),
        }),
        efi: "images/efiboot.img".to_string(),
        isohybridmbr: isolinux.then(|| "/usr/share/syslinux/isohdpfx.bin".to_string()),
        isolevel: 3,
    }
}

/// qemu-img target format, `None` for raw images.
pub fn qemu_format(format: &DiskFormat) -> Option<QemuFormat> {
    match format {
        DiskFormat::Raw => None,
        DiskFormat::Qcow2 { compat } => Some(QemuFormat::Qcow2 {
            compat: compat.clone(),
        }),
        DiskFormat::Vpc => Some(QemuFormat::Vpc),
        DiskFormat::Vmdk => Some(QemuFormat::Vmdk {
            subformat: "streamOptimized".to_string(),
        }),
    }
}

/// nginx set up to run unprivileged in a container.
pub fn nginx_config_options(path: &str, html_root: &str, listen: &str) -> NginxConfigOptions {
    NginxConfigOptions {
        path: path.to_string(),
        config: NginxConfig {
            listen: listen.to_string(),
            root: html_root.to_string(),
            daemon: false,
            pid: "/tmp/nginx.pid".to_string(),
        },
    }
}

pub fn chmod_options(path: &str, mode: &str, recursive: bool) -> ChmodOptions {
    let mut items = BTreeMap::new();
    items.insert(
        path.to_string(),
        ChmodItem {
            mode: mode.to_string(),
            recursive,
        },
    );
    ChmodOptions { items }
}

pub fn ostree_config_options(repo: &str, readonly: bool) -> OSTreeConfigOptions {
    OSTreeConfigOptions {
        repo: repo.to_string(),
        config: OSTreeRepoConfig {
            sysroot: OSTreeSysroot {
                readonly,
                bootloader: "none".to_string(),
            },
        },
    }
}

pub fn efi_mkdir_options() -> MkdirOptions {
    MkdirOptions {
        paths: vec![MkdirPath {
            path: "/boot/efi".to_string(),
            mode: 0o700,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, password: Option<&str>, key: Option<&str>) -> UserCustomization {
        UserCustomization {
            name: name.into(),
            password: password.map(str::to_string),
            key: key.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn crypted_passwords_pass_through() {
        let options = users_options(&[user("admin", Some("$6$salt$hash"), None)]).expect("users");
        assert_eq!(
            options.users["admin"].password.as_deref(),
            Some("$6$salt$hash")
        );
    }

    #[test]
    fn plaintext_passwords_are_rejected() {
        let err = users_options(&[user("admin", Some("hunter2"), None)]).expect_err("plaintext");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn first_boot_installs_keys_under_var() {
        let options = users_options(&[
            user("root", None, Some("ssh-ed25519 AAAA root")),
            user("core", None, Some("ssh-ed25519 AAAA core")),
            user("nokey", None, None),
        ])
        .expect("users");
        let first_boot = users_first_boot_options(&options);
        let commands = first_boot.commands.join("\n");
        assert!(commands.contains("mkdir -p /var/home/core/.ssh"));
        assert!(commands.contains("mkdir -p /var/roothome/.ssh"));
        assert!(!commands.contains("nokey"));
        assert_eq!(
            first_boot.commands.last().map(String::as_str),
            Some("restorecon -rvF /var/roothome")
        );
    }

    #[test]
    fn rpm_options_skip_repos_without_keys() {
        let repos = vec![
            RepoConfig {
                name: "baseos".into(),
                gpg_key: Some("KEY1".into()),
                ..Default::default()
            },
            RepoConfig {
                name: "extras".into(),
                ..Default::default()
            },
        ];
        assert_eq!(rpm_options(&repos).gpgkeys, vec!["KEY1"]);
    }

    #[test]
    fn systemd_appends_blueprint_services() {
        let services = ServicesCustomization {
            enabled: vec!["cockpit.socket".into()],
            disabled: vec!["bluetooth".into()],
        };
        let options = systemd_options(
            &["sshd".to_string()],
            &[],
            Some(&services),
            "multi-user.target",
        );
        assert_eq!(options.enabled_services, vec!["sshd", "cockpit.socket"]);
        assert_eq!(options.disabled_services, vec!["bluetooth"]);
    }

    #[test]
    fn fdo_root_certs_become_a_file_reference() {
        let fdo = FdoCustomization {
            manufacturing_server_url: "http://fdo.example.com:8080".into(),
            diun_pub_key_root_certs: "-----BEGIN CERTIFICATE-----".into(),
            ..Default::default()
        };
        assert_eq!(
            fdo_kernel_options(&fdo),
            vec![
                "fdo.manufacturing_server_url=http://fdo.example.com:8080".to_string(),
                format!("fdo.diun_pub_key_root_certs={FDO_ROOT_CERTS_PATH}"),
            ]
        );
    }

    #[test]
    fn boot_iso_needs_an_efi_architecture() {
        let options =
            bootiso_mono_options("5.14", X86_64, "redhat", "RHEL", "8.6", "RHEL-8-6-0-BaseOS-x86_64")
                .expect("x86_64");
        assert_eq!(options.efi.architectures, vec!["IA32", "X64"]);
        assert!(options.isolinux.enabled);
        assert_eq!(
            options.kernel_opts,
            "inst.ks=hd:LABEL=RHEL-8-6-0-BaseOS-x86_64:/osbuild.ks"
        );
        assert!(bootiso_mono_options("5.14", "s390x", "redhat", "RHEL", "8.6", "X").is_err());
    }

    #[test]
    fn xorrisofs_without_isolinux_has_no_boot_catalog() {
        let options = xorrisofs_options("installer.iso", "LABEL", false);
        assert!(options.boot.is_none());
        assert!(options.isohybridmbr.is_none());
    }
}
