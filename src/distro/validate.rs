//! Compatibility checks between an image type and a request.

use super::image_type::{ImageKind, ImageTypeRef, OSTreeImage};
use super::ImageOptions;
use crate::blueprint::{filesystems_of, kernel_of, Customizations};
use crate::error::{Error, Result};

/// Mountpoints users may add, exactly or as a parent directory.
pub const MOUNTPOINT_ALLOW_LIST: &[&str] = &[
    "/", "/var", "/opt", "/srv", "/usr", "/app", "/data", "/home", "/tmp",
];

/// Customization categories the simplified installer accepts.
const SIMPLIFIED_INSTALLER_CATEGORIES: &[&str] = &["InstallationDevice", "FDO"];

/// `true` if `mountpoint` is in the allow-list or below a non-root entry.
pub fn is_mountpoint_allowed(mountpoint: &str) -> bool {
    if MOUNTPOINT_ALLOW_LIST.contains(&mountpoint) {
        return true;
    }
    if mountpoint.contains("//") {
        return false;
    }
    MOUNTPOINT_ALLOW_LIST
        .iter()
        .filter(|allowed| **allowed != "/")
        .any(|allowed| {
            mountpoint
                .strip_prefix(allowed)
                .is_some_and(|rest| rest.starts_with('/'))
        })
}

/// Reject customizations and options the image type cannot honor.
pub fn check_options(
    image_type: &ImageTypeRef<'_>,
    customizations: Option<&Customizations>,
    options: &ImageOptions,
) -> Result<()> {
    let name = image_type.name();
    let kind = image_type.kind();

    if kind.boot_iso() && kind.rpm_ostree() {
        if options.ostree.parent.is_empty() {
            return Err(Error::Validation(format!(
                "boot ISO image type {name:?} requires specifying a URL from which to retrieve the OSTree commit"
            )));
        }
        if options.ostree.url.is_empty() {
            return Err(Error::Validation(format!(
                "boot ISO image type {name:?} requires specifying the URL of the OSTree repository"
            )));
        }

        if matches!(kind, ImageKind::OSTree(OSTreeImage::SimplifiedInstaller { .. })) {
            check_simplified_installer(name, customizations)?;
        } else if customizations.is_some() {
            return Err(Error::Validation(format!(
                "boot ISO image type {name:?} does not support blueprint customizations"
            )));
        }
    }

    if matches!(kind, ImageKind::OSTree(OSTreeImage::RawImage { .. }))
        && options.ostree.parent.is_empty()
    {
        return Err(Error::Validation(
            "edge raw images require specifying a URL from which to retrieve the OSTree commit"
                .to_string(),
        ));
    }

    let kernel = kernel_of(customizations);
    if !kernel.append.is_empty() && kind.rpm_ostree() && (!kind.bootable() || kind.boot_iso()) {
        return Err(Error::Validation(
            "kernel boot parameter customizations are not supported for ostree types".to_string(),
        ));
    }

    let mountpoints = filesystems_of(customizations);
    if !mountpoints.is_empty() && kind.rpm_ostree() {
        return Err(Error::Validation(
            "Custom mountpoints are not supported for ostree types".to_string(),
        ));
    }

    let invalid: Vec<String> = mountpoints
        .iter()
        .filter(|m| !is_mountpoint_allowed(&m.mountpoint))
        .map(|m| m.mountpoint.clone())
        .collect();
    if !invalid.is_empty() {
        return Err(Error::InvalidMountpoints(invalid));
    }

    Ok(())
}

fn check_simplified_installer(name: &str, customizations: Option<&Customizations>) -> Result<()> {
    let Some(customizations) = customizations else {
        return Err(Error::Validation(format!(
            "boot ISO image type {name:?} requires specifying an installation device to install to"
        )));
    };

    customizations
        .check_allowed(SIMPLIFIED_INSTALLER_CATEGORIES)
        .map_err(|err| {
            Error::Validation(format!(
                "boot ISO image type {name:?} contains unsupported blueprint customizations: {err}"
            ))
        })?;

    if customizations.get_installation_device().is_empty() {
        return Err(Error::Validation(format!(
            "boot ISO image type {name:?} requires specifying an installation device to install to"
        )));
    }

    let fdo = customizations.get_fdo().ok_or_else(|| {
        Error::Validation(format!(
            "boot ISO image type {name:?} requires specifying FDO configuration to install to"
        ))
    })?;
    if fdo.manufacturing_server_url.is_empty() {
        return Err(Error::Validation(format!(
            "boot ISO image type {name:?} requires specifying FDO.ManufacturingServerURL configuration to install to"
        )));
    }

    let keys_set = [
        &fdo.diun_pub_key_hash,
        &fdo.diun_pub_key_insecure,
        &fdo.diun_pub_key_root_certs,
    ]
    .iter()
    .filter(|key| !key.is_empty())
    .count();
    if keys_set != 1 {
        return Err(Error::Validation(format!(
            "boot ISO image type {name:?} requires specifying one of [FDO.DiunPubKeyHash,FDO.DiunPubKeyInsecure,FDO.DiunPubKeyRootCerts] configuration to install to"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_accepts_exact_and_nested_paths() {
        assert!(is_mountpoint_allowed("/"));
        assert!(is_mountpoint_allowed("/opt"));
        assert!(is_mountpoint_allowed("/opt/data"));
        assert!(is_mountpoint_allowed("/var/log/audit"));
    }

    #[test]
    fn allow_list_rejects_siblings_and_doubled_separators() {
        assert!(!is_mountpoint_allowed("/optfoo"));
        assert!(!is_mountpoint_allowed("/etc"));
        assert!(!is_mountpoint_allowed("/boot"));
        assert!(!is_mountpoint_allowed("/opt//data"));
        assert!(!is_mountpoint_allowed("//"));
    }
}
