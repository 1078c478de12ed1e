//! LVM volume groups and logical volumes.

use serde::Serialize;

use super::layout::oversized;
use super::{Filesystem, FsType, MIB};
use crate::error::Result;

/// LVM physical extent size; logical volumes are multiples of it.
pub const LVM_EXTENT_SIZE: u64 = 4 * MIB;

/// Space the physical volume header and metadata area take.
pub const LVM_METADATA_SIZE: u64 = MIB;

pub const ROOT_VG_NAME: &str = "rootvg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeGroup {
    pub name: String,
    pub description: String,
    pub logical_volumes: Vec<LogicalVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalVolume {
    pub name: String,
    pub size: u64,
    pub filesystem: Filesystem,
}

impl VolumeGroup {
    pub fn new(name: impl Into<String>, logical_volumes: Vec<LogicalVolume>) -> Self {
        Self {
            name: name.into(),
            description: "created via lvm2 and osbuild".to_string(),
            logical_volumes,
        }
    }

    /// Bytes the group needs from its physical volume.
    pub fn required_size(&self) -> Result<u64> {
        self.logical_volumes
            .iter()
            .try_fold(LVM_METADATA_SIZE, |total, lv| {
                let size = align_extent(lv.size)?;
                total.checked_add(size).ok_or_else(|| oversized(total))
            })
    }

    /// Add an XFS logical volume for `mountpoint`, rounded up to whole
    /// extents.
    ///
    /// The name is derived from the mountpoint; a numeric suffix is added on
    /// collision.
    pub fn create_logical_volume(&mut self, mountpoint: &str, size: u64) -> Result<&LogicalVolume> {
        let size = align_extent(size)?;
        let base = lv_name_for(mountpoint);
        let mut name = base.clone();
        let mut n = 1;
        while self.logical_volumes.iter().any(|lv| lv.name == name) {
            name = format!("{base}{n:02}");
            n += 1;
        }

        let index = self.logical_volumes.len();
        self.logical_volumes.push(LogicalVolume::new(
            name,
            size,
            Filesystem::new(FsType::Xfs, mountpoint),
        ));
        Ok(&self.logical_volumes[index])
    }

    pub fn logical_volume_mut(&mut self, mountpoint: &str) -> Option<&mut LogicalVolume> {
        self.logical_volumes
            .iter_mut()
            .find(|lv| lv.filesystem.mountpoint == mountpoint)
    }
}

impl LogicalVolume {
    /// `size` is taken as is; see [`align_extent`].
    pub fn new(name: impl Into<String>, size: u64, filesystem: Filesystem) -> Self {
        Self {
            name: name.into(),
            size,
            filesystem,
        }
    }
}

/// `/` -> `rootlv`, `/var/log` -> `var_loglv`.
pub fn lv_name_for(mountpoint: &str) -> String {
    let trimmed = mountpoint.trim_matches('/');
    if trimmed.is_empty() {
        return "rootlv".to_string();
    }
    format!("{}lv", trimmed.replace('/', "_"))
}

/// `size` rounded up to whole extents.
pub fn align_extent(size: u64) -> Result<u64> {
    size.div_ceil(LVM_EXTENT_SIZE)
        .checked_mul(LVM_EXTENT_SIZE)
        .ok_or_else(|| oversized(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::GIB;

    #[test]
    fn lv_names_follow_mountpoints() {
        assert_eq!(lv_name_for("/"), "rootlv");
        assert_eq!(lv_name_for("/srv"), "srvlv");
        assert_eq!(lv_name_for("/var/log"), "var_loglv");
    }

    #[test]
    fn logical_volumes_round_up_to_extents() {
        let mut vg = VolumeGroup::new(ROOT_VG_NAME, Vec::new());
        let lv = vg.create_logical_volume("/data", 5 * MIB).expect("datalv");
        assert_eq!(lv.size, 8 * MIB);
    }

    #[test]
    fn extent_alignment_reports_overflow() {
        assert_eq!(align_extent(0).expect("zero"), 0);
        assert_eq!(align_extent(LVM_EXTENT_SIZE + 1).expect("aligned"), 2 * LVM_EXTENT_SIZE);
        let err = align_extent(u64::MAX).expect_err("too large");
        assert!(matches!(err, crate::error::Error::Resource(_)));

        let mut vg = VolumeGroup::new(ROOT_VG_NAME, Vec::new());
        assert!(vg.create_logical_volume("/srv", u64::MAX).is_err());
        assert!(vg.logical_volumes.is_empty());
    }

    #[test]
    fn required_size_overflow_is_an_error() {
        let half = u64::MAX / 2 - u64::MAX / 2 % LVM_EXTENT_SIZE;
        let vg = VolumeGroup::new(
            ROOT_VG_NAME,
            vec![
                LogicalVolume::new("alv", half, Filesystem::new(FsType::Xfs, "/a")),
                LogicalVolume::new("blv", half, Filesystem::new(FsType::Xfs, "/b")),
                LogicalVolume::new("clv", half, Filesystem::new(FsType::Xfs, "/c")),
            ],
        );
        assert!(vg.required_size().is_err());
    }

    #[test]
    fn duplicate_names_get_a_suffix() {
        let mut vg = VolumeGroup::new(ROOT_VG_NAME, Vec::new());
        vg.create_logical_volume("/srv", GIB).expect("first");
        let second = vg.create_logical_volume("/srv/", GIB).expect("second").name.clone();
        assert_eq!(second, "srvlv01");
    }

    #[test]
    fn required_size_includes_metadata() {
        let vg = VolumeGroup::new(
            ROOT_VG_NAME,
            vec![LogicalVolume::new("rootlv", GIB, Filesystem::new(FsType::Xfs, "/"))],
        );
        assert_eq!(vg.required_size().expect("fits"), GIB + LVM_METADATA_SIZE);
    }
}
