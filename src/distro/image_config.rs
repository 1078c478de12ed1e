//! OS configuration defaults layered distribution -> image type.

/// Keyboard layout for the console and X11.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub keymap: String,
    pub x11_layouts: Vec<String>,
}

/// `/etc/sysconfig` defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sysconfig {
    pub default_kernel: String,
    pub networking: bool,
    pub no_zero_conf: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelinuxState {
    Enforcing,
    Permissive,
    Disabled,
}

impl SelinuxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelinuxState::Enforcing => "enforcing",
            SelinuxState::Permissive => "permissive",
            SelinuxState::Disabled => "disabled",
        }
    }
}

/// Defaults applied to the OS tree before blueprint customizations.
///
/// Unset fields (`None`, empty lists) mean "inherit".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub keyboard: Option<Keyboard>,
    pub enabled_services: Vec<String>,
    pub disabled_services: Vec<String>,
    pub default_target: Option<String>,
    pub gpg_key_files: Vec<String>,
    pub ntp_servers: Vec<String>,
    pub sysconfig: Option<Sysconfig>,
    pub selinux_state: Option<SelinuxState>,
}

fn or_vec(child: &[String], parent: &[String]) -> Vec<String> {
    if child.is_empty() {
        parent.to_vec()
    } else {
        child.to_vec()
    }
}

impl ImageConfig {
    /// Copy of `self` with every unset field taken from `parent`.
    pub fn inherit_from(&self, parent: &ImageConfig) -> ImageConfig {
        ImageConfig {
            timezone: self.timezone.clone().or_else(|| parent.timezone.clone()),
            locale: self.locale.clone().or_else(|| parent.locale.clone()),
            keyboard: self.keyboard.clone().or_else(|| parent.keyboard.clone()),
            enabled_services: or_vec(&self.enabled_services, &parent.enabled_services),
            disabled_services: or_vec(&self.disabled_services, &parent.disabled_services),
            default_target: self
                .default_target
                .clone()
                .or_else(|| parent.default_target.clone()),
            gpg_key_files: or_vec(&self.gpg_key_files, &parent.gpg_key_files),
            ntp_servers: or_vec(&self.ntp_servers, &parent.ntp_servers),
            sysconfig: self.sysconfig.clone().or_else(|| parent.sysconfig.clone()),
            selinux_state: self.selinux_state.or(parent.selinux_state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_come_from_parent() {
        let parent = ImageConfig {
            timezone: Some("America/New_York".into()),
            locale: Some("en_US.UTF-8".into()),
            enabled_services: vec!["sshd".into()],
            ..Default::default()
        };
        let child = ImageConfig {
            timezone: Some("UTC".into()),
            default_target: Some("multi-user.target".into()),
            ..Default::default()
        };

        let merged = child.inherit_from(&parent);
        assert_eq!(merged.timezone.as_deref(), Some("UTC"));
        assert_eq!(merged.locale.as_deref(), Some("en_US.UTF-8"));
        assert_eq!(merged.enabled_services, vec!["sshd"]);
        assert_eq!(merged.default_target.as_deref(), Some("multi-user.target"));
    }

    #[test]
    fn lists_are_replaced_not_merged() {
        let parent = ImageConfig {
            enabled_services: vec!["sshd".into()],
            ..Default::default()
        };
        let child = ImageConfig {
            enabled_services: vec!["waagent".into()],
            ..Default::default()
        };
        assert_eq!(child.inherit_from(&parent).enabled_services, vec!["waagent"]);
    }
}
