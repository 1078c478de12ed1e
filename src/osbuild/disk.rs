//! Stages that write a [`PartitionTable`] into an image file.

use std::collections::BTreeMap;

use super::stages::{
    self, CopyPath, FstabEntry, Grub2InstCore, Grub2InstOptions, Grub2InstPrefix,
    Lvm2CreateOptions, Lvm2MetadataOptions, Lvm2Volume, MkfsOptions, SfdiskOptions,
    SfdiskPartition, ZiplInstOptions,
};
use super::{Device, Input, Mount, Stage};
use crate::disk::{FsLocation, FsType, MountedFilesystem, PartitionTable};

/// Device name used for a filesystem mounted at `mountpoint`.
///
/// `/` -> `root`, `/boot/efi` -> `boot-efi`.
pub fn device_name(mountpoint: &str) -> String {
    let trimmed = mountpoint.trim_matches('/');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.replace('/', "-")
    }
}

fn mount_type(fs_type: FsType) -> &'static str {
    match fs_type {
        FsType::Xfs => "org.osbuild.xfs",
        FsType::Ext4 => "org.osbuild.ext4",
        FsType::Vfat => "org.osbuild.fat",
    }
}

fn mkfs_type(fs_type: FsType) -> &'static str {
    match fs_type {
        FsType::Xfs => "org.osbuild.mkfs.xfs",
        FsType::Ext4 => "org.osbuild.mkfs.ext4",
        FsType::Vfat => "org.osbuild.mkfs.fat",
    }
}

fn partition_device(pt: &PartitionTable, filename: &str, index: usize) -> Device {
    let partition = &pt.partitions[index];
    Device::loopback(
        filename,
        pt.bytes_to_sectors(partition.start),
        pt.bytes_to_sectors(partition.size),
    )
}

fn whole_disk_device(pt: &PartitionTable, filename: &str) -> Device {
    Device::loopback(filename, 0, pt.bytes_to_sectors(pt.size))
}

/// Devices needed to reach one filesystem, plus the name of the device the
/// filesystem sits on.
fn filesystem_devices(
    pt: &PartitionTable,
    filename: &str,
    mounted: &MountedFilesystem<'_>,
    target: Option<&str>,
) -> (String, BTreeMap<String, Device>) {
    let mut devices = BTreeMap::new();
    let name = match mounted.location {
        FsLocation::Partition { index } => {
            let name = target
                .map(str::to_string)
                .unwrap_or_else(|| device_name(&mounted.filesystem.mountpoint));
            devices.insert(name.clone(), partition_device(pt, filename, index));
            name
        }
        FsLocation::LogicalVolume { index, vg, lv } => {
            let name = target.map(str::to_string).unwrap_or_else(|| lv.name.clone());
            devices.insert(vg.name.clone(), partition_device(pt, filename, index));
            devices.insert(name.clone(), Device::logical_volume(&vg.name, &lv.name));
            name
        }
    };
    (name, devices)
}

/// Devices and mounts for every filesystem, parents mounted before children.
fn mounts_for(pt: &PartitionTable, filename: &str) -> (BTreeMap<String, Device>, Vec<Mount>) {
    let mut filesystems = pt.filesystems();
    filesystems.sort_by_key(|m| {
        let mp = m.filesystem.mountpoint.as_str();
        (mp.matches('/').count() - usize::from(mp == "/"), mp.to_string())
    });

    let mut devices = BTreeMap::new();
    let mut mounts = Vec::new();
    for mounted in &filesystems {
        let (source, fs_devices) = filesystem_devices(pt, filename, mounted, None);
        devices.extend(fs_devices);
        mounts.push(Mount {
            name: device_name(&mounted.filesystem.mountpoint),
            mount_type: mount_type(mounted.filesystem.fs_type).to_string(),
            source,
            target: mounted.filesystem.mountpoint.clone(),
        });
    }
    (devices, mounts)
}

/// Partition the image file, create volumes and filesystems, copy the tree
/// of `tree_pipeline` onto them.
pub fn assembly_stages(pt: &PartitionTable, filename: &str, tree_pipeline: &str) -> Vec<Stage> {
    let mut result = vec![stages::truncate(filename, pt.size), sfdisk(pt, filename)];

    for (index, vg) in pt.volume_groups() {
        let mut devices = BTreeMap::new();
        devices.insert("device".to_string(), partition_device(pt, filename, index));
        let volumes = vg
            .logical_volumes
            .iter()
            .map(|lv| Lvm2Volume {
                name: lv.name.clone(),
                size: format!("{}B", lv.size),
            })
            .collect();
        result.push(
            Stage::new("org.osbuild.lvm2.create", Lvm2CreateOptions { volumes })
                .with_devices(devices),
        );
    }

    for mounted in pt.filesystems() {
        let fs = mounted.filesystem;
        let options = match fs.fs_type {
            FsType::Vfat => MkfsOptions {
                volid: Some(fs.uuid.replace('-', "")),
                label: fs.label.clone(),
                ..Default::default()
            },
            FsType::Xfs | FsType::Ext4 => MkfsOptions {
                uuid: Some(fs.uuid.clone()),
                label: fs.label.clone(),
                ..Default::default()
            },
        };
        let (_, devices) = filesystem_devices(pt, filename, &mounted, Some("device"));
        result.push(Stage::new(mkfs_type(fs.fs_type), options).with_devices(devices));
    }

    let (devices, mounts) = mounts_for(pt, filename);
    result.push(
        stages::copy(vec![CopyPath::new("input://root-tree/", "mount://root/")])
            .with_input("root-tree", Input::tree(tree_pipeline))
            .with_devices(devices)
            .with_mounts(mounts),
    );
    result
}

fn sfdisk(pt: &PartitionTable, filename: &str) -> Stage {
    let partitions = pt
        .partitions
        .iter()
        .map(|p| SfdiskPartition {
            bootable: p.bootable,
            start: pt.bytes_to_sectors(p.start),
            size: pt.bytes_to_sectors(p.size),
            part_type: p.part_type.clone(),
            uuid: p.uuid.clone(),
        })
        .collect();
    let mut devices = BTreeMap::new();
    devices.insert("device".to_string(), whole_disk_device(pt, filename));
    Stage::new(
        "org.osbuild.sfdisk",
        SfdiskOptions {
            label: pt.pt_type.as_str().to_string(),
            uuid: pt.uuid.clone(),
            partitions,
        },
    )
    .with_devices(devices)
}

/// Index of the partition holding `/boot`, or `/` without a boot partition.
fn boot_partition_index(pt: &PartitionTable) -> Option<usize> {
    pt.partition_index_of("/boot")
        .or_else(|| pt.partition_index_of("/"))
}

/// Install the GRUB2 core image for BIOS or Open Firmware boot.
///
/// Returns `None` when the table has no BIOS boot or PReP partition.
pub fn grub2_inst(pt: &PartitionTable, filename: &str, platform: &str) -> Option<Stage> {
    let bios_index = pt.bios_boot_partition_index()?;
    let boot_index = boot_partition_index(pt)?;
    let separate_boot = pt.boot_filesystem().is_some();
    let boot_fs = pt.boot_filesystem().or_else(|| pt.root_filesystem())?;

    Some(Stage::new(
        "org.osbuild.grub2.inst",
        Grub2InstOptions {
            filename: filename.to_string(),
            platform: platform.to_string(),
            location: pt.bytes_to_sectors(pt.partitions[bios_index].start),
            core: Grub2InstCore {
                core_type: "mkimage".to_string(),
                partlabel: pt.pt_type.as_str().to_string(),
                filesystem: boot_fs.fs_type.as_str().to_string(),
            },
            prefix: Grub2InstPrefix {
                prefix_type: "partition".to_string(),
                partlabel: pt.pt_type.as_str().to_string(),
                number: boot_index,
                path: if separate_boot { "/grub2" } else { "/boot/grub2" }.to_string(),
            },
        },
    ))
}

/// Write the zipl boot record for s390x.
pub fn zipl_inst(pt: &PartitionTable, filename: &str, kernel_version: &str) -> Option<Stage> {
    let boot_index = boot_partition_index(pt)?;
    let (mut devices, mounts) = mounts_for(pt, filename);
    devices.insert("disk".to_string(), whole_disk_device(pt, filename));
    Some(
        Stage::new(
            "org.osbuild.zipl.inst",
            ZiplInstOptions {
                kernel: kernel_version.to_string(),
                location: pt.bytes_to_sectors(pt.partitions[boot_index].start),
            },
        )
        .with_devices(devices)
        .with_mounts(mounts),
    )
}

/// Reset LVM metadata so images do not carry the build host's identity.
pub fn lvm2_metadata(pt: &PartitionTable, filename: &str) -> Vec<Stage> {
    pt.volume_groups()
        .into_iter()
        .map(|(index, vg)| {
            let mut devices = BTreeMap::new();
            devices.insert("device".to_string(), partition_device(pt, filename, index));
            Stage::new(
                "org.osbuild.lvm2.metadata",
                Lvm2MetadataOptions {
                    creation_host: "osbuild".to_string(),
                    creation_time: "0".to_string(),
                    description: vg.description.clone(),
                    vg_name: vg.name.clone(),
                },
            )
            .with_devices(devices)
        })
        .collect()
}

/// A bare FAT filesystem image of `size` bytes holding the tree of
/// `tree_pipeline`, as used for EFI boot images on ISOs.
pub fn vfat_image_stages(filename: &str, size: u64, volid: &str, tree_pipeline: &str) -> Vec<Stage> {
    let sectors = size / crate::disk::DEFAULT_SECTOR_SIZE;
    let mut devices = BTreeMap::new();
    devices.insert("device".to_string(), Device::loopback(filename, 0, sectors));

    let mut copy_devices = BTreeMap::new();
    copy_devices.insert("root".to_string(), Device::loopback(filename, 0, sectors));
    let mounts = vec![Mount {
        name: "root".to_string(),
        mount_type: mount_type(FsType::Vfat).to_string(),
        source: "root".to_string(),
        target: "/".to_string(),
    }];

    vec![
        stages::truncate(filename, size),
        Stage::new(
            mkfs_type(FsType::Vfat),
            MkfsOptions {
                volid: Some(volid.replace('-', "")),
                ..Default::default()
            },
        )
        .with_devices(devices),
        stages::copy(vec![CopyPath::new("input://root-tree/", "mount://root/")])
            .with_input("root-tree", Input::tree(tree_pipeline))
            .with_devices(copy_devices)
            .with_mounts(mounts),
    ]
}

/// fstab entries for every filesystem in table order.
pub fn fstab_entries(pt: &PartitionTable) -> Vec<FstabEntry> {
    pt.filesystems()
        .into_iter()
        .map(|m| FstabEntry {
            uuid: m.filesystem.uuid.clone(),
            vfs_type: m.filesystem.fs_type.as_str().to_string(),
            path: m.filesystem.mountpoint.clone(),
            options: m.filesystem.fstab_options.clone(),
            freq: m.filesystem.fstab_freq,
            passno: m.filesystem.fstab_passno,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{
        part_type, Filesystem, LogicalVolume, Partition, PartitionTableType, VolumeGroup, GIB,
        MIB,
    };

    fn lvm_table() -> PartitionTable {
        let mut pt = PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(MIB, part_type::BIOS_BOOT_GUID).bootable(),
                Partition::new(100 * MIB, part_type::EFI_SYSTEM_GUID).with_filesystem(
                    Filesystem::new(FsType::Vfat, "/boot/efi").with_uuid("7B77-95E7"),
                ),
                Partition::new(GIB, part_type::FILESYSTEM_DATA_GUID).with_filesystem(
                    Filesystem::new(FsType::Xfs, "/boot").with_uuid("boot-uuid"),
                ),
                Partition::new(4 * GIB, part_type::LVM_GUID).with_volume_group(VolumeGroup::new(
                    "rootvg",
                    vec![
                        LogicalVolume::new(
                            "rootlv",
                            2 * GIB,
                            Filesystem::new(FsType::Xfs, "/").with_uuid("root-uuid"),
                        ),
                        LogicalVolume::new(
                            "srvlv",
                            GIB,
                            Filesystem::new(FsType::Xfs, "/srv").with_uuid("srv-uuid"),
                        ),
                    ],
                )),
            ],
        );
        let mut start = MIB;
        for p in &mut pt.partitions {
            p.start = start;
            start += p.size;
        }
        pt.size = start + MIB;
        pt
    }

    #[test]
    fn device_names_follow_mountpoints() {
        assert_eq!(device_name("/"), "root");
        assert_eq!(device_name("/boot/efi"), "boot-efi");
    }

    #[test]
    fn copy_mounts_root_first() {
        let stages = assembly_stages(&lvm_table(), "disk.img", "os");
        let copy = stages.last().expect("copy stage");
        assert_eq!(copy.stage_type, "org.osbuild.copy");
        let targets: Vec<&str> = copy.mounts.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(targets, vec!["/", "/boot", "/srv", "/boot/efi"]);
        assert_eq!(copy.mounts[0].name, "root");
        assert_eq!(copy.mounts[0].source, "rootlv");
        assert_eq!(
            copy.devices["rootlv"].parent.as_deref(),
            Some("rootvg")
        );
    }

    #[test]
    fn assembly_creates_volumes_and_filesystems() {
        let stages = assembly_stages(&lvm_table(), "disk.img", "os");
        let types: Vec<&str> = stages.iter().map(|s| s.stage_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "org.osbuild.truncate",
                "org.osbuild.sfdisk",
                "org.osbuild.lvm2.create",
                "org.osbuild.mkfs.fat",
                "org.osbuild.mkfs.xfs",
                "org.osbuild.mkfs.xfs",
                "org.osbuild.mkfs.xfs",
                "org.osbuild.copy",
            ]
        );
        let fat = serde_json::to_value(&stages[3]).expect("serialize");
        assert_eq!(fat["options"]["volid"], "7B7795E7");
    }

    #[test]
    fn grub2_inst_targets_bios_partition() {
        let pt = lvm_table();
        let stage = grub2_inst(&pt, "disk.img", "i386-pc").expect("bios boot partition");
        let json = serde_json::to_value(&stage).expect("serialize");
        assert_eq!(json["options"]["location"], 2048);
        assert_eq!(json["options"]["prefix"]["number"], 2);
        assert_eq!(json["options"]["prefix"]["path"], "/grub2");
    }

    #[test]
    fn fstab_lists_every_filesystem() {
        let entries = fstab_entries(&lvm_table());
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/boot/efi", "/boot", "/", "/srv"]);
        assert_eq!(lvm2_metadata(&lvm_table(), "disk.img").len(), 1);
    }
}
