//! Partition table model.
//!
//! A [`PartitionTable`] is pure data: the image pipelines turn it into
//! sfdisk/mkfs/lvm2 stages and the os pipelines into fstab and bootloader
//! options. Base tables live in the catalog; [`new_partition_table`] turns
//! one into a concrete, sized table for a single request.

pub mod layout;
pub mod lvm;

pub use layout::new_partition_table;
pub use lvm::{LogicalVolume, VolumeGroup};

use serde::Serialize;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Partition type identifiers, GPT GUIDs and DOS ids.
pub mod part_type {
    pub const BIOS_BOOT_GUID: &str = "21686148-6449-6E6F-744E-656564454649";
    pub const EFI_SYSTEM_GUID: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";
    pub const FILESYSTEM_DATA_GUID: &str = "0FC63DAF-8483-4772-8E79-3D69D8477DE4";
    pub const LVM_GUID: &str = "E6D6D379-F507-44C2-A23C-238F2A3DF928";

    pub const DOS_LINUX: &str = "83";
    pub const DOS_LVM: &str = "8e";
    pub const DOS_PREP: &str = "41";
    pub const DOS_EFI: &str = "ef";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionTableType {
    Gpt,
    Dos,
}

impl PartitionTableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionTableType::Gpt => "gpt",
            PartitionTableType::Dos => "dos",
        }
    }

    fn lvm_part_type(&self) -> &'static str {
        match self {
            PartitionTableType::Gpt => part_type::LVM_GUID,
            PartitionTableType::Dos => part_type::DOS_LVM,
        }
    }

    fn data_part_type(&self) -> &'static str {
        match self {
            PartitionTableType::Gpt => part_type::FILESYSTEM_DATA_GUID,
            PartitionTableType::Dos => part_type::DOS_LINUX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Xfs,
    Ext4,
    Vfat,
}

impl FsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsType::Xfs => "xfs",
            FsType::Ext4 => "ext4",
            FsType::Vfat => "vfat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filesystem {
    #[serde(rename = "type")]
    pub fs_type: FsType,
    pub uuid: String,
    pub label: String,
    pub mountpoint: String,
    pub fstab_options: String,
    pub fstab_freq: u64,
    pub fstab_passno: u64,
}

impl Filesystem {
    pub fn new(fs_type: FsType, mountpoint: impl Into<String>) -> Self {
        Self {
            fs_type,
            uuid: String::new(),
            label: String::new(),
            mountpoint: mountpoint.into(),
            fstab_options: "defaults".to_string(),
            fstab_freq: 0,
            fstab_passno: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_fstab(mut self, options: impl Into<String>, freq: u64, passno: u64) -> Self {
        self.fstab_options = options.into();
        self.fstab_freq = freq;
        self.fstab_passno = passno;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Filesystem(Filesystem),
    VolumeGroup(VolumeGroup),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub start: u64,
    pub size: u64,
    #[serde(rename = "type")]
    pub part_type: String,
    pub bootable: bool,
    pub uuid: String,
    pub payload: Option<Payload>,
}

impl Partition {
    pub fn new(size: u64, part_type: impl Into<String>) -> Self {
        Self {
            start: 0,
            size,
            part_type: part_type.into(),
            bootable: false,
            uuid: String::new(),
            payload: None,
        }
    }

    pub fn bootable(mut self) -> Self {
        self.bootable = true;
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_filesystem(mut self, fs: Filesystem) -> Self {
        self.payload = Some(Payload::Filesystem(fs));
        self
    }

    pub fn with_volume_group(mut self, vg: VolumeGroup) -> Self {
        self.payload = Some(Payload::VolumeGroup(vg));
        self
    }

    pub fn filesystem(&self) -> Option<&Filesystem> {
        match &self.payload {
            Some(Payload::Filesystem(fs)) => Some(fs),
            _ => None,
        }
    }

    pub fn volume_group(&self) -> Option<&VolumeGroup> {
        match &self.payload {
            Some(Payload::VolumeGroup(vg)) => Some(vg),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionTable {
    pub size: u64,
    pub uuid: String,
    #[serde(rename = "type")]
    pub pt_type: PartitionTableType,
    pub sector_size: u64,
    pub partitions: Vec<Partition>,
}

/// Where a filesystem lives inside the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsLocation<'a> {
    /// Directly on partition `index`.
    Partition { index: usize },
    /// On a logical volume of the volume group on partition `index`.
    LogicalVolume {
        index: usize,
        vg: &'a VolumeGroup,
        lv: &'a LogicalVolume,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct MountedFilesystem<'a> {
    pub filesystem: &'a Filesystem,
    pub location: FsLocation<'a>,
}

impl PartitionTable {
    pub fn new(pt_type: PartitionTableType, partitions: Vec<Partition>) -> Self {
        Self {
            size: 0,
            uuid: String::new(),
            pt_type,
            sector_size: DEFAULT_SECTOR_SIZE,
            partitions,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// All filesystems in table order, logical volumes after their group.
    pub fn filesystems(&self) -> Vec<MountedFilesystem<'_>> {
        let mut found = Vec::new();
        for (index, partition) in self.partitions.iter().enumerate() {
            match &partition.payload {
                Some(Payload::Filesystem(fs)) => found.push(MountedFilesystem {
                    filesystem: fs,
                    location: FsLocation::Partition { index },
                }),
                Some(Payload::VolumeGroup(vg)) => {
                    for lv in &vg.logical_volumes {
                        found.push(MountedFilesystem {
                            filesystem: &lv.filesystem,
                            location: FsLocation::LogicalVolume { index, vg, lv },
                        });
                    }
                }
                None => {}
            }
        }
        found
    }

    pub fn contains_mountpoint(&self, mountpoint: &str) -> bool {
        self.find_mountpoint(mountpoint).is_some()
    }

    pub fn find_mountpoint(&self, mountpoint: &str) -> Option<&Filesystem> {
        self.filesystems()
            .into_iter()
            .map(|mounted| mounted.filesystem)
            .find(|fs| fs.mountpoint == mountpoint)
    }

    pub fn root_filesystem(&self) -> Option<&Filesystem> {
        self.find_mountpoint("/")
    }

    pub fn boot_filesystem(&self) -> Option<&Filesystem> {
        self.find_mountpoint("/boot")
    }

    /// Index of the partition holding the filesystem mounted at `mountpoint`.
    pub fn partition_index_of(&self, mountpoint: &str) -> Option<usize> {
        self.filesystems()
            .into_iter()
            .find(|mounted| mounted.filesystem.mountpoint == mountpoint)
            .map(|mounted| match mounted.location {
                FsLocation::Partition { index } => index,
                FsLocation::LogicalVolume { index, .. } => index,
            })
    }

    /// Index of the BIOS boot (GPT) or PReP (DOS) partition, if any.
    pub fn bios_boot_partition_index(&self) -> Option<usize> {
        self.partitions.iter().position(|p| {
            p.part_type == part_type::BIOS_BOOT_GUID || p.part_type == part_type::DOS_PREP
        })
    }

    pub fn volume_groups(&self) -> Vec<(usize, &VolumeGroup)> {
        self.partitions
            .iter()
            .enumerate()
            .filter_map(|(index, p)| p.volume_group().map(|vg| (index, vg)))
            .collect()
    }

    pub fn bytes_to_sectors(&self, bytes: u64) -> u64 {
        bytes / self.sector_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PartitionTable {
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(MIB, part_type::BIOS_BOOT_GUID).bootable(),
                Partition::new(100 * MIB, part_type::EFI_SYSTEM_GUID)
                    .with_filesystem(Filesystem::new(FsType::Vfat, "/boot/efi")),
                Partition::new(2 * GIB, part_type::LVM_GUID).with_volume_group(VolumeGroup::new(
                    "rootvg",
                    vec![
                        LogicalVolume::new("rootlv", GIB, Filesystem::new(FsType::Xfs, "/")),
                        LogicalVolume::new("homelv", GIB, Filesystem::new(FsType::Xfs, "/home")),
                    ],
                )),
            ],
        )
    }

    #[test]
    fn filesystems_walk_partitions_and_logical_volumes() {
        let pt = sample();
        let mountpoints: Vec<&str> = pt
            .filesystems()
            .iter()
            .map(|m| m.filesystem.mountpoint.as_str())
            .collect();
        assert_eq!(mountpoints, vec!["/boot/efi", "/", "/home"]);
        assert!(pt.contains_mountpoint("/home"));
        assert!(!pt.contains_mountpoint("/srv"));
    }

    #[test]
    fn partition_index_resolves_logical_volume_container() {
        let pt = sample();
        assert_eq!(pt.partition_index_of("/home"), Some(2));
        assert_eq!(pt.partition_index_of("/boot/efi"), Some(1));
        assert_eq!(pt.bios_boot_partition_index(), Some(0));
        assert_eq!(pt.volume_groups().len(), 1);
    }
}
