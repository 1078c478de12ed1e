//! Stage option types and constructors.
//!
//! Each stage type has an options struct shaped like the JSON the engine
//! expects and a constructor that returns a ready [`Stage`].

use std::collections::BTreeMap;

use serde::Serialize;

use super::{Input, Stage};

macro_rules! stage_options {
    ($($variant:ident),* $(,)?) => {
        /// Options of any stage this crate can emit.
        #[derive(Debug, Clone, Serialize)]
        #[serde(untagged)]
        pub enum StageOptions {
            $($variant($variant),)*
        }

        $(
            impl From<$variant> for StageOptions {
                fn from(options: $variant) -> Self {
                    StageOptions::$variant(options)
                }
            }
        )*
    };
}

stage_options!(
    RpmOptions,
    SelinuxOptions,
    SelinuxConfigOptions,
    KernelCmdlineOptions,
    LocaleOptions,
    KeymapOptions,
    HostnameOptions,
    TimezoneOptions,
    ChronyOptions,
    SysconfigOptions,
    GroupsOptions,
    UsersOptions,
    FirstBootOptions,
    FirewallOptions,
    SystemdOptions,
    FstabOptions,
    Grub2Options,
    TruncateOptions,
    SfdiskOptions,
    Lvm2CreateOptions,
    Lvm2MetadataOptions,
    MkfsOptions,
    CopyOptions,
    Grub2InstOptions,
    ZiplInstOptions,
    QemuOptions,
    FilenameOptions,
    OciArchiveOptions,
    OSTreeInitOptions,
    OSTreePreptreeOptions,
    OSTreeCommitOptions,
    OSTreePullOptions,
    OSTreeOsInitOptions,
    OSTreeConfigOptions,
    OSTreeRemotesOptions,
    OSTreeDeployOptions,
    OSTreeDeploymentOptions,
    MkdirOptions,
    NginxConfigOptions,
    ChmodOptions,
    BuildstampOptions,
    AnacondaOptions,
    LoraxScriptOptions,
    DracutOptions,
    KickstartOptions,
    BootIsoMonoOptions,
    GrubIsoOptions,
    DiscinfoOptions,
    XorrisofsOptions,
);

fn is_false(value: &bool) -> bool {
    !*value
}

// ─────────────────────────────────────────────────────────────────────────────
// Packages and system configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct RpmOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gpgkeys: Vec<String>,
    #[serde(rename = "gpgkeys.fromtree", skip_serializing_if = "Vec::is_empty")]
    pub gpgkeys_fromtree: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub ostree_booted: bool,
}

pub fn rpm(options: RpmOptions, packages: Input) -> Stage {
    Stage::new("org.osbuild.rpm", options).with_input("packages", packages)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SelinuxOptions {
    pub file_contexts: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

pub fn selinux(options: SelinuxOptions) -> Stage {
    Stage::new("org.osbuild.selinux", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct SelinuxConfigOptions {
    pub state: String,
}

pub fn selinux_config(state: &str) -> Stage {
    Stage::new(
        "org.osbuild.selinux.config",
        SelinuxConfigOptions {
            state: state.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct KernelCmdlineOptions {
    pub root_fs_uuid: String,
    pub kernel_opts: String,
}

pub fn kernel_cmdline(root_fs_uuid: &str, kernel_opts: &str) -> Stage {
    Stage::new(
        "org.osbuild.kernel-cmdline",
        KernelCmdlineOptions {
            root_fs_uuid: root_fs_uuid.to_string(),
            kernel_opts: kernel_opts.to_string(),
        },
    )
}

pub fn fix_bls() -> Stage {
    Stage::bare("org.osbuild.fix-bls")
}

#[derive(Debug, Clone, Serialize)]
pub struct LocaleOptions {
    pub language: String,
}

pub fn locale(language: &str) -> Stage {
    Stage::new(
        "org.osbuild.locale",
        LocaleOptions {
            language: language.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct KeymapOptions {
    pub keymap: String,
    #[serde(rename = "x11-keymap", skip_serializing_if = "Option::is_none")]
    pub x11_keymap: Option<X11Keymap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct X11Keymap {
    pub layouts: Vec<String>,
}

pub fn keymap(options: KeymapOptions) -> Stage {
    Stage::new("org.osbuild.keymap", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct HostnameOptions {
    pub hostname: String,
}

pub fn hostname(name: &str) -> Stage {
    Stage::new(
        "org.osbuild.hostname",
        HostnameOptions {
            hostname: name.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct TimezoneOptions {
    pub zone: String,
}

pub fn timezone(zone: &str) -> Stage {
    Stage::new(
        "org.osbuild.timezone",
        TimezoneOptions {
            zone: zone.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ChronyOptions {
    pub timeservers: Vec<String>,
}

pub fn chrony(timeservers: Vec<String>) -> Stage {
    Stage::new("org.osbuild.chrony", ChronyOptions { timeservers })
}

#[derive(Debug, Clone, Serialize)]
pub struct SysconfigOptions {
    pub kernel: SysconfigKernel,
    pub network: SysconfigNetwork,
}

#[derive(Debug, Clone, Serialize)]
pub struct SysconfigKernel {
    pub update_default: bool,
    pub default_kernel: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SysconfigNetwork {
    pub networking: bool,
    pub no_zero_conf: bool,
}

pub fn sysconfig(options: SysconfigOptions) -> Stage {
    Stage::new("org.osbuild.sysconfig", options)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupsOptions {
    pub groups: BTreeMap<String, GroupEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

pub fn groups(options: GroupsOptions) -> Stage {
    Stage::new("org.osbuild.groups", options)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UsersOptions {
    pub users: BTreeMap<String, UserEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

pub fn users(options: UsersOptions) -> Stage {
    Stage::new("org.osbuild.users", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct FirstBootOptions {
    pub commands: Vec<String>,
    pub wait_for_network: bool,
}

pub fn first_boot(options: FirstBootOptions) -> Stage {
    Stage::new("org.osbuild.first-boot", options)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FirewallOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_services: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disabled_services: Vec<String>,
}

pub fn firewall(options: FirewallOptions) -> Stage {
    Stage::new("org.osbuild.firewall", options)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemdOptions {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enabled_services: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disabled_services: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default_target: String,
}

pub fn systemd(options: SystemdOptions) -> Stage {
    Stage::new("org.osbuild.systemd", options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Boot and filesystem layout inside the tree
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct FstabOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostree: Option<OSTreeDeploymentOptions>,
    pub filesystems: Vec<FstabEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FstabEntry {
    pub uuid: String,
    pub vfs_type: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub options: String,
    pub freq: u64,
    pub passno: u64,
}

pub fn fstab(options: FstabOptions) -> Stage {
    Stage::new("org.osbuild.fstab", options)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Grub2Options {
    pub root_fs_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_fs_uuid: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kernel_opts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uefi: Option<Grub2Uefi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_entry: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub greenboot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_defaults: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Grub2Uefi {
    pub vendor: String,
    #[serde(skip_serializing_if = "is_false")]
    pub install: bool,
}

pub fn grub2(options: Grub2Options) -> Stage {
    Stage::new("org.osbuild.grub2", options)
}

pub fn zipl() -> Stage {
    Stage::bare("org.osbuild.zipl")
}

#[derive(Debug, Clone, Serialize)]
pub struct MkdirOptions {
    pub paths: Vec<MkdirPath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MkdirPath {
    pub path: String,
    pub mode: u32,
}

pub fn mkdir(options: MkdirOptions) -> Stage {
    Stage::new("org.osbuild.mkdir", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChmodOptions {
    pub items: BTreeMap<String, ChmodItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChmodItem {
    pub mode: String,
    pub recursive: bool,
}

pub fn chmod(options: ChmodOptions) -> Stage {
    Stage::new("org.osbuild.chmod", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct NginxConfigOptions {
    pub path: String,
    pub config: NginxConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct NginxConfig {
    pub listen: String,
    pub root: String,
    pub daemon: bool,
    pub pid: String,
}

pub fn nginx_config(options: NginxConfigOptions) -> Stage {
    Stage::new("org.osbuild.nginx.conf", options)
}

// ─────────────────────────────────────────────────────────────────────────────
// Disk assembly
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TruncateOptions {
    pub filename: String,
    pub size: String,
}

pub fn truncate(filename: &str, size: u64) -> Stage {
    Stage::new(
        "org.osbuild.truncate",
        TruncateOptions {
            filename: filename.to_string(),
            size: size.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct SfdiskOptions {
    pub label: String,
    pub uuid: String,
    pub partitions: Vec<SfdiskPartition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SfdiskPartition {
    #[serde(skip_serializing_if = "is_false")]
    pub bootable: bool,
    pub start: u64,
    pub size: u64,
    #[serde(rename = "type")]
    pub part_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lvm2CreateOptions {
    pub volumes: Vec<Lvm2Volume>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lvm2Volume {
    pub name: String,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lvm2MetadataOptions {
    pub creation_host: String,
    pub creation_time: String,
    pub description: String,
    pub vg_name: String,
}

/// Options shared by the mkfs stages; only the fields a filesystem
/// understands are set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MkfsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volid: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyOptions {
    pub paths: Vec<CopyPath>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyPath {
    pub from: String,
    pub to: String,
}

impl CopyPath {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

pub fn copy(paths: Vec<CopyPath>) -> Stage {
    Stage::new("org.osbuild.copy", CopyOptions { paths })
}

#[derive(Debug, Clone, Serialize)]
pub struct Grub2InstOptions {
    pub filename: String,
    pub platform: String,
    pub location: u64,
    pub core: Grub2InstCore,
    pub prefix: Grub2InstPrefix,
}

#[derive(Debug, Clone, Serialize)]
pub struct Grub2InstCore {
    #[serde(rename = "type")]
    pub core_type: String,
    pub partlabel: String,
    pub filesystem: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Grub2InstPrefix {
    #[serde(rename = "type")]
    pub prefix_type: String,
    pub partlabel: String,
    pub number: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ZiplInstOptions {
    pub kernel: String,
    pub location: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Output formats
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct QemuOptions {
    pub filename: String,
    pub format: QemuFormat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QemuFormat {
    Qcow2 {
        #[serde(skip_serializing_if = "String::is_empty")]
        compat: String,
    },
    Vpc,
    Vmdk {
        subformat: String,
    },
}

pub fn qemu(filename: &str, format: QemuFormat, image: Input) -> Stage {
    Stage::new(
        "org.osbuild.qemu",
        QemuOptions {
            filename: filename.to_string(),
            format,
        },
    )
    .with_input("image", image)
}

/// Options of stages that only name their output file.
#[derive(Debug, Clone, Serialize)]
pub struct FilenameOptions {
    pub filename: String,
}

pub fn xz(filename: &str, file: Input) -> Stage {
    Stage::new(
        "org.osbuild.xz",
        FilenameOptions {
            filename: filename.to_string(),
        },
    )
    .with_input("file", file)
}

pub fn tar(filename: &str, tree: Input) -> Stage {
    Stage::new(
        "org.osbuild.tar",
        FilenameOptions {
            filename: filename.to_string(),
        },
    )
    .with_input("tree", tree)
}

pub fn implantisomd5(filename: &str) -> Stage {
    Stage::new(
        "org.osbuild.implantisomd5",
        FilenameOptions {
            filename: filename.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OciArchiveOptions {
    pub architecture: String,
    pub filename: String,
    pub config: OciConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct OciConfig {
    #[serde(rename = "Cmd")]
    pub cmd: Vec<String>,
    #[serde(rename = "ExposedPorts")]
    pub exposed_ports: Vec<String>,
}

pub fn oci_archive(options: OciArchiveOptions, base: Input) -> Stage {
    Stage::new("org.osbuild.oci-archive", options).with_input("base", base)
}

// ─────────────────────────────────────────────────────────────────────────────
// OSTree
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeInitOptions {
    pub path: String,
}

pub fn ostree_init(path: &str) -> Stage {
    Stage::new(
        "org.osbuild.ostree.init",
        OSTreeInitOptions {
            path: path.to_string(),
        },
    )
}

pub fn ostree_init_fs() -> Stage {
    Stage::bare("org.osbuild.ostree.init-fs")
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreePreptreeOptions {
    pub etc_group_members: Vec<String>,
}

pub fn ostree_preptree(etc_group_members: Vec<String>) -> Stage {
    Stage::new(
        "org.osbuild.ostree.preptree",
        OSTreePreptreeOptions { etc_group_members },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeCommitOptions {
    #[serde(rename = "ref")]
    pub reference: String,
    pub os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

pub fn ostree_commit(options: OSTreeCommitOptions, tree: Input) -> Stage {
    Stage::new("org.osbuild.ostree.commit", options).with_input("tree", tree)
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreePullOptions {
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

pub fn ostree_pull(options: OSTreePullOptions, commits: Input) -> Stage {
    Stage::new("org.osbuild.ostree.pull", options).with_input("commits", commits)
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeOsInitOptions {
    pub osname: String,
}

pub fn ostree_os_init(osname: &str) -> Stage {
    Stage::new(
        "org.osbuild.ostree.os-init",
        OSTreeOsInitOptions {
            osname: osname.to_string(),
        },
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeConfigOptions {
    pub repo: String,
    pub config: OSTreeRepoConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeRepoConfig {
    pub sysroot: OSTreeSysroot,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeSysroot {
    pub readonly: bool,
    pub bootloader: String,
}

pub fn ostree_config(options: OSTreeConfigOptions) -> Stage {
    Stage::new("org.osbuild.ostree.config", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeRemotesOptions {
    pub repo: String,
    pub remotes: Vec<OSTreeRemoteEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeRemoteEntry {
    pub name: String,
    pub url: String,
}

pub fn ostree_remotes(options: OSTreeRemotesOptions) -> Stage {
    Stage::new("org.osbuild.ostree.remotes", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeDeployOptions {
    pub osname: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub remote: String,
    pub mounts: Vec<String>,
    pub rootfs: OSTreeRootfs,
    pub kernel_opts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeRootfs {
    pub label: String,
}

pub fn ostree_deploy(options: OSTreeDeployOptions) -> Stage {
    Stage::new("org.osbuild.ostree.deploy", options)
}

/// Identifies a deployment for stages that write into it.
#[derive(Debug, Clone, Serialize)]
pub struct OSTreeDeploymentOptions {
    pub deployment: OSTreeDeployment,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeDeployment {
    pub osname: String,
    #[serde(rename = "ref")]
    pub reference: String,
}

impl OSTreeDeploymentOptions {
    pub fn new(osname: &str, reference: &str) -> Self {
        Self {
            deployment: OSTreeDeployment {
                osname: osname.to_string(),
                reference: reference.to_string(),
            },
        }
    }
}

pub fn ostree_fillvar(deployment: OSTreeDeploymentOptions) -> Stage {
    Stage::new("org.osbuild.ostree.fillvar", deployment)
}

pub fn ostree_selinux(deployment: OSTreeDeploymentOptions) -> Stage {
    Stage::new("org.osbuild.ostree.selinux", deployment)
}

// ─────────────────────────────────────────────────────────────────────────────
// Installer media
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BuildstampOptions {
    pub arch: String,
    pub product: String,
    pub version: String,
    pub variant: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}

pub fn buildstamp(options: BuildstampOptions) -> Stage {
    Stage::new("org.osbuild.buildstamp", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct AnacondaOptions {
    #[serde(rename = "kickstart-modules")]
    pub kickstart_modules: Vec<String>,
}

pub fn anaconda(options: AnacondaOptions) -> Stage {
    Stage::new("org.osbuild.anaconda", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct LoraxScriptOptions {
    pub path: String,
    pub basearch: String,
}

pub fn lorax_script(options: LoraxScriptOptions) -> Stage {
    Stage::new("org.osbuild.lorax-script", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct DracutOptions {
    pub kernel: Vec<String>,
    pub modules: Vec<String>,
    pub install: Vec<String>,
}

pub fn dracut(options: DracutOptions) -> Stage {
    Stage::new("org.osbuild.dracut", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct KickstartOptions {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveimg: Option<KickstartLiveImg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ostree: Option<KickstartOSTree>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KickstartLiveImg {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KickstartOSTree {
    pub osname: String,
    pub url: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub gpg: bool,
}

pub fn kickstart(options: KickstartOptions) -> Stage {
    Stage::new("org.osbuild.kickstart", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoMonoOptions {
    pub product: Product,
    pub isolabel: String,
    pub kernel: String,
    pub kernel_opts: String,
    pub efi: BootIsoEfi,
    pub isolinux: BootIsoIsolinux,
    pub templates: String,
    pub rootfs: BootIsoRootfs,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoEfi {
    pub architectures: Vec<String>,
    pub vendor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoIsolinux {
    pub enabled: bool,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoRootfs {
    pub size: u64,
    pub compression: BootIsoCompression,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoCompression {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<BootIsoCompressionOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootIsoCompressionOptions {
    pub bcj: String,
}

pub fn bootiso_mono(options: BootIsoMonoOptions, rootfs: Input, kernel: Input) -> Stage {
    Stage::new("org.osbuild.bootiso.mono", options)
        .with_input("rootfs", rootfs)
        .with_input("kernel", kernel)
}

#[derive(Debug, Clone, Serialize)]
pub struct GrubIsoOptions {
    pub product: Product,
    pub isolabel: String,
    pub kernel: GrubIsoKernel,
    pub architectures: Vec<String>,
    pub vendor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrubIsoKernel {
    pub dir: String,
    pub opts: Vec<String>,
}

pub fn grub_iso(options: GrubIsoOptions) -> Stage {
    Stage::new("org.osbuild.grub2.iso", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscinfoOptions {
    pub basearch: String,
    pub release: String,
}

pub fn discinfo(options: DiscinfoOptions) -> Stage {
    Stage::new("org.osbuild.discinfo", options)
}

#[derive(Debug, Clone, Serialize)]
pub struct XorrisofsOptions {
    pub filename: String,
    pub volid: String,
    pub sysid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot: Option<XorrisofsBoot>,
    pub efi: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isohybridmbr: Option<String>,
    pub isolevel: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct XorrisofsBoot {
    pub image: String,
    pub catalog: String,
}

pub fn xorrisofs(options: XorrisofsOptions, tree: Input) -> Stage {
    Stage::new("org.osbuild.xorrisofs", options).with_input("tree", tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qemu_format_is_tagged_by_type() {
        let stage = qemu(
            "disk.qcow2",
            QemuFormat::Qcow2 {
                compat: "1.1".into(),
            },
            Input::pipeline_file("image", "disk.img"),
        );
        let json = serde_json::to_value(&stage).expect("serialize");
        assert_eq!(json["options"]["format"]["type"], "qcow2");
        assert_eq!(json["options"]["format"]["compat"], "1.1");

        let vpc = serde_json::to_value(QemuFormat::Vpc).expect("serialize");
        assert_eq!(vpc, serde_json::json!({"type": "vpc"}));
    }

    #[test]
    fn rpm_stage_lists_package_checksums() {
        let specs = vec![crate::rpmmd::PackageSpec {
            name: "bash".into(),
            checksum: "sha256:01".into(),
            ..Default::default()
        }];
        let stage = rpm(
            RpmOptions {
                gpgkeys: vec!["KEY".into()],
                ..Default::default()
            },
            Input::packages(&specs),
        );
        let json = serde_json::to_value(&stage).expect("serialize");
        assert_eq!(json["inputs"]["packages"]["references"][0], "sha256:01");
        assert_eq!(json["options"]["gpgkeys"][0], "KEY");
        assert!(json["options"].get("ostree_booted").is_none());
    }

    #[test]
    fn renamed_fields_use_wire_names() {
        let stage = buildstamp(BuildstampOptions {
            arch: "x86_64".into(),
            product: "Red Hat Enterprise Linux".into(),
            version: "8.6".into(),
            variant: "edge".into(),
            is_final: true,
        });
        let json = serde_json::to_value(&stage).expect("serialize");
        assert_eq!(json["options"]["final"], true);
    }
}
