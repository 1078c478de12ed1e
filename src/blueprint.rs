//! User-facing blueprint: extra packages plus customizations.
//!
//! Blueprints are written in TOML:
//!
//! ```toml
//! name = "web"
//!
//! [[packages]]
//! name = "nginx"
//!
//! [customizations.timezone]
//! timezone = "Europe/Prague"
//!
//! [[customizations.filesystem]]
//! mountpoint = "/srv"
//! minsize = "2 GiB"
//! ```
//!
//! The compiler treats all of this as read-only input.

use serde::{Deserialize, Serialize};

/// Kernel package installed when the blueprint does not name one.
pub const DEFAULT_KERNEL_NAME: &str = "kernel";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub modules: Vec<Package>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub customizations: Option<Customizations>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Package {
    fn to_name_version(&self) -> String {
        if self.version.is_empty() || self.version == "*" {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
}

impl Blueprint {
    /// Package names requested by the blueprint, modules included; package
    /// groups are returned as `@group`.
    pub fn get_packages(&self) -> Vec<String> {
        self.packages
            .iter()
            .chain(self.modules.iter())
            .map(Package::to_name_version)
            .chain(self.groups.iter().map(|g| format!("@{}", g.name)))
            .collect()
    }

    pub fn customizations(&self) -> Option<&Customizations> {
        self.customizations.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customizations {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub kernel: Option<KernelCustomization>,
    #[serde(default)]
    pub sshkey: Vec<SshKeyCustomization>,
    #[serde(default)]
    pub user: Vec<UserCustomization>,
    #[serde(default)]
    pub group: Vec<GroupCustomization>,
    #[serde(default)]
    pub timezone: Option<TimezoneCustomization>,
    #[serde(default)]
    pub locale: Option<LocaleCustomization>,
    #[serde(default)]
    pub firewall: Option<FirewallCustomization>,
    #[serde(default)]
    pub services: Option<ServicesCustomization>,
    #[serde(default)]
    pub filesystem: Vec<FilesystemCustomization>,
    #[serde(default)]
    pub installation_device: Option<String>,
    #[serde(default)]
    pub fdo: Option<FdoCustomization>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelCustomization {
    #[serde(default = "default_kernel_name")]
    pub name: String,
    #[serde(default)]
    pub append: String,
}

fn default_kernel_name() -> String {
    DEFAULT_KERNEL_NAME.to_string()
}

impl Default for KernelCustomization {
    fn default() -> Self {
        Self {
            name: default_kernel_name(),
            append: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyCustomization {
    pub user: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCustomization {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCustomization {
    pub name: String,
    #[serde(default)]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneCustomization {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub ntpservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleCustomization {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub keyboard: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallCustomization {
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub services: Option<ServicesCustomization>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesCustomization {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemCustomization {
    pub mountpoint: String,
    #[serde(default, rename = "minsize")]
    pub min_size: DataSize,
}

/// FIDO Device Onboarding settings for the simplified installer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FdoCustomization {
    #[serde(default)]
    pub manufacturing_server_url: String,
    #[serde(default)]
    pub diun_pub_key_insecure: String,
    #[serde(default)]
    pub diun_pub_key_hash: String,
    #[serde(default)]
    pub diun_pub_key_root_certs: String,
}

/// A size given either as a byte count or as text such as `"2 GiB"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataSize {
    Bytes(u64),
    Text(String),
}

impl Default for DataSize {
    fn default() -> Self {
        DataSize::Bytes(0)
    }
}

impl DataSize {
    /// Size in bytes. Unparseable text yields `None`.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            DataSize::Bytes(n) => Some(*n),
            DataSize::Text(text) => parse_data_size(text),
        }
    }
}

fn parse_data_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "kB" => 1000,
        "KiB" => 1024,
        "MB" => 1000 * 1000,
        "MiB" => 1024 * 1024,
        "GB" => 1000 * 1000 * 1000,
        "GiB" => 1024 * 1024 * 1024,
        "TB" => 1000 * 1000 * 1000 * 1000,
        "TiB" => 1024 * 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

impl Customizations {
    /// Kernel customization, falling back to the default kernel package.
    pub fn get_kernel(&self) -> KernelCustomization {
        self.kernel.clone().unwrap_or_default()
    }

    pub fn get_filesystems(&self) -> &[FilesystemCustomization] {
        &self.filesystem
    }

    pub fn get_installation_device(&self) -> &str {
        self.installation_device.as_deref().unwrap_or("")
    }

    pub fn get_fdo(&self) -> Option<&FdoCustomization> {
        self.fdo.as_ref()
    }

    /// Users to create; bare SSH key entries come first as key-only users.
    pub fn get_users(&self) -> Vec<UserCustomization> {
        self.sshkey
            .iter()
            .map(|sshkey| UserCustomization {
                name: sshkey.user.clone(),
                key: Some(sshkey.key.clone()),
                ..Default::default()
            })
            .chain(self.user.iter().cloned())
            .collect()
    }

    pub fn get_timezone(&self) -> Option<&TimezoneCustomization> {
        self.timezone.as_ref()
    }

    /// Names of the customization categories that are set.
    pub fn set_categories(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.hostname.is_some() {
            set.push("Hostname");
        }
        if self.kernel.is_some() {
            set.push("Kernel");
        }
        if !self.sshkey.is_empty() {
            set.push("SSHKey");
        }
        if !self.user.is_empty() {
            set.push("User");
        }
        if !self.group.is_empty() {
            set.push("Group");
        }
        if self.timezone.is_some() {
            set.push("Timezone");
        }
        if self.locale.is_some() {
            set.push("Locale");
        }
        if self.firewall.is_some() {
            set.push("Firewall");
        }
        if self.services.is_some() {
            set.push("Services");
        }
        if !self.filesystem.is_empty() {
            set.push("Filesystem");
        }
        if self.installation_device.is_some() {
            set.push("InstallationDevice");
        }
        if self.fdo.is_some() {
            set.push("FDO");
        }
        set
    }

    /// Fail when any category outside `allowed` is set.
    pub fn check_allowed(&self, allowed: &[&str]) -> Result<(), String> {
        let rejected: Vec<String> = self
            .set_categories()
            .into_iter()
            .filter(|category| !allowed.contains(category))
            .map(|category| format!("'{}' is not allowed", category))
            .collect();
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(rejected.join(", "))
        }
    }
}

/// Kernel customization of optional customizations.
pub fn kernel_of(customizations: Option<&Customizations>) -> KernelCustomization {
    customizations.map(Customizations::get_kernel).unwrap_or_default()
}

/// Filesystem customizations of optional customizations.
pub fn filesystems_of(customizations: Option<&Customizations>) -> &[FilesystemCustomization] {
    customizations
        .map(Customizations::get_filesystems)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blueprint_packages_render_versions_and_groups() {
        let bp: Blueprint = toml::from_str(
            r#"
            name = "test"

            [[packages]]
            name = "tmux"
            version = "2.7"

            [[packages]]
            name = "vim"
            version = "*"

            [[modules]]
            name = "nodejs"

            [[groups]]
            name = "core"
            "#,
        )
        .expect("parse blueprint");
        assert_eq!(bp.get_packages(), vec!["tmux-2.7", "vim", "nodejs", "@core"]);
    }

    #[test]
    fn filesystem_minsize_accepts_numbers_and_units() {
        let c: Customizations = toml::from_str(
            r#"
            [[filesystem]]
            mountpoint = "/var"
            minsize = 1073741824

            [[filesystem]]
            mountpoint = "/srv"
            minsize = "2 GiB"
            "#,
        )
        .expect("parse customizations");
        assert_eq!(c.filesystem[0].min_size.bytes(), Some(1024 * 1024 * 1024));
        assert_eq!(c.filesystem[1].min_size.bytes(), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(DataSize::Text("12 parsecs".into()).bytes(), None);
    }

    #[test]
    fn kernel_defaults_to_kernel_package() {
        assert_eq!(kernel_of(None).name, "kernel");
        let c: Customizations = toml::from_str("[kernel]\nappend = \"nosmt\"\n").expect("parse");
        let kernel = c.get_kernel();
        assert_eq!(kernel.name, "kernel");
        assert_eq!(kernel.append, "nosmt");
    }

    #[test]
    fn check_allowed_reports_every_rejected_category() {
        let c = Customizations {
            hostname: Some("edge".into()),
            installation_device: Some("/dev/vda".into()),
            timezone: Some(TimezoneCustomization::default()),
            ..Default::default()
        };
        let err = c
            .check_allowed(&["InstallationDevice", "FDO"])
            .expect_err("hostname and timezone are not allowed");
        assert!(err.contains("'Hostname' is not allowed"));
        assert!(err.contains("'Timezone' is not allowed"));
        assert!(c.check_allowed(&["Hostname", "InstallationDevice", "Timezone"]).is_ok());
    }
}
