//! Base partition tables of the disk image types.
//!
//! Sizes here are minimums; the layout pass grows the last partition to
//! fill the image. Identifiers left empty are generated per request.

use super::image_type::BasePartitionTables;
use super::{AARCH64, PPC64LE, S390X, X86_64};
use crate::disk::{
    part_type, Filesystem, FsType, LogicalVolume, Partition, PartitionTable, PartitionTableType,
    VolumeGroup, GIB, MIB,
};

const GPT_UUID: &str = "D209C89E-EA5E-4FBD-B161-B461CCE297E0";
const DOS_UUID: &str = "0x14fc63d2";

const BIOS_BOOT_PART_UUID: &str = "FAC7F1FB-3E8D-4137-A512-961DE09A5549";
const EFI_PART_UUID: &str = "68B2905B-DF3E-4FB3-80FA-49D1E773AA33";
const BOOT_PART_UUID: &str = "CB07C243-BC44-4717-853E-28852021225B";
const ROOT_PART_UUID: &str = "6264D520-3FB9-423F-8AB8-7A0A8E3D3562";
const EFI_FS_UUID: &str = "7B77-95E7";

const EFI_FSTAB_OPTIONS: &str = "defaults,uid=0,gid=0,umask=077,shortname=winnt";

fn bios_boot() -> Partition {
    Partition::new(MIB, part_type::BIOS_BOOT_GUID)
        .bootable()
        .with_uuid(BIOS_BOOT_PART_UUID)
}

fn efi_system(size: u64) -> Partition {
    Partition::new(size, part_type::EFI_SYSTEM_GUID)
        .with_uuid(EFI_PART_UUID)
        .with_filesystem(
            Filesystem::new(FsType::Vfat, "/boot/efi")
                .with_uuid(EFI_FS_UUID)
                .with_fstab(EFI_FSTAB_OPTIONS, 0, 2),
        )
}

fn boot(size: u64, fs_type: FsType) -> Partition {
    Partition::new(size, part_type::FILESYSTEM_DATA_GUID)
        .with_uuid(BOOT_PART_UUID)
        .with_filesystem(Filesystem::new(fs_type, "/boot").with_label("boot"))
}

fn gpt_root() -> Partition {
    Partition::new(2 * GIB, part_type::FILESYSTEM_DATA_GUID)
        .with_uuid(ROOT_PART_UUID)
        .with_filesystem(root_fs())
}

fn root_fs() -> Filesystem {
    Filesystem::new(FsType::Xfs, "/").with_label("root")
}

fn gpt(partitions: Vec<Partition>) -> PartitionTable {
    PartitionTable::new(PartitionTableType::Gpt, partitions).with_uuid(GPT_UUID)
}

fn dos(partitions: Vec<Partition>) -> PartitionTable {
    PartitionTable::new(PartitionTableType::Dos, partitions).with_uuid(DOS_UUID)
}

fn tables(entries: Vec<(&str, PartitionTable)>) -> BasePartitionTables {
    entries
        .into_iter()
        .map(|(arch, pt)| (arch.to_string(), pt))
        .collect()
}

/// Tables of the generic cloud and virtualization images.
pub fn default_tables() -> BasePartitionTables {
    tables(vec![
        (
            X86_64,
            gpt(vec![bios_boot(), efi_system(100 * MIB), gpt_root()]),
        ),
        (AARCH64, gpt(vec![efi_system(100 * MIB), gpt_root()])),
        (
            PPC64LE,
            dos(vec![
                Partition::new(4 * MIB, part_type::DOS_PREP).bootable(),
                Partition::new(2 * GIB, part_type::DOS_LINUX).with_filesystem(root_fs()),
            ]),
        ),
        (
            S390X,
            dos(vec![Partition::new(2 * GIB, part_type::DOS_LINUX)
                .bootable()
                .with_filesystem(root_fs())]),
        ),
    ])
}

/// EC2 boots x86_64 through BIOS only; aarch64 keeps a separate `/boot`.
pub fn ec2_tables() -> BasePartitionTables {
    tables(vec![
        (X86_64, gpt(vec![bios_boot(), gpt_root()])),
        (
            AARCH64,
            gpt(vec![
                efi_system(200 * MIB),
                boot(512 * MIB, FsType::Xfs),
                gpt_root(),
            ]),
        ),
    ])
}

/// OSTree deployments keep kernels on an ext4 `/boot`.
pub fn edge_tables() -> BasePartitionTables {
    let table = || {
        gpt(vec![
            efi_system(127 * MIB),
            boot(384 * MIB, FsType::Ext4),
            gpt_root(),
        ])
    };
    tables(vec![(X86_64, table()), (AARCH64, table())])
}

/// Azure RHUI ships with the root filesystem split across logical volumes.
pub fn azure_rhui_tables() -> BasePartitionTables {
    let lv = |name: &str, size: u64, mountpoint: &str, label: &str| {
        LogicalVolume::new(
            name,
            size,
            Filesystem::new(FsType::Xfs, mountpoint).with_label(label),
        )
    };
    let rootvg = VolumeGroup::new(
        "rootvg",
        vec![
            lv("homelv", GIB, "/home", "home"),
            lv("rootlv", 2 * GIB, "/", "root"),
            lv("tmplv", 2 * GIB, "/tmp", "tmp"),
            lv("usrlv", 10 * GIB, "/usr", "usr"),
            lv("varlv", 10 * GIB, "/var", "var"),
        ],
    );
    tables(vec![(
        X86_64,
        gpt(vec![
            efi_system(500 * MIB),
            boot(500 * MIB, FsType::Xfs),
            Partition::new(2 * MIB, part_type::BIOS_BOOT_GUID)
                .bootable()
                .with_uuid(BIOS_BOOT_PART_UUID),
            Partition::new(25 * GIB, part_type::LVM_GUID)
                .with_uuid(ROOT_PART_UUID)
                .with_volume_group(rootvg),
        ]),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_default_table_has_a_root() {
        for (arch, pt) in default_tables() {
            assert!(pt.root_filesystem().is_some(), "{arch} lacks a root filesystem");
        }
    }

    #[test]
    fn legacy_platforms_have_a_boot_loader_partition() {
        let tables = default_tables();
        assert!(tables[X86_64].bios_boot_partition_index().is_some());
        assert!(tables[PPC64LE].bios_boot_partition_index().is_some());
        assert!(tables[AARCH64].bios_boot_partition_index().is_none());
        assert_eq!(tables[S390X].pt_type, PartitionTableType::Dos);
    }

    #[test]
    fn edge_boot_is_ext4() {
        let tables = edge_tables();
        let boot = tables[X86_64].boot_filesystem().expect("boot");
        assert_eq!(boot.fs_type, FsType::Ext4);
    }

    #[test]
    fn azure_rhui_splits_root_into_volumes() {
        let tables = azure_rhui_tables();
        let pt = &tables[X86_64];
        for mountpoint in ["/", "/home", "/tmp", "/usr", "/var"] {
            assert!(pt.contains_mountpoint(mountpoint), "missing {mountpoint}");
        }
        assert_eq!(pt.volume_groups().len(), 1);
    }
}
