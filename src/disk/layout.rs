//! Turning a base table plus mountpoint requests into a sized layout.

use rand::rngs::StdRng;
use rand::{Rng, RngCore};
use tracing::debug;

use super::lvm::{align_extent, LogicalVolume, VolumeGroup, LVM_EXTENT_SIZE, ROOT_VG_NAME};
use super::{
    Filesystem, FsType, Partition, PartitionTable, PartitionTableType, Payload, GIB, MIB,
};
use crate::blueprint::FilesystemCustomization;
use crate::error::{Error, Result};

/// Partition start and size granularity.
pub const DEFAULT_GRAIN: u64 = MIB;

/// Size of the `/boot` partition added when converting to LVM.
const BOOT_PARTITION_SIZE: u64 = GIB;

/// Size given to a new logical volume requested with a zero minimum size.
const DEFAULT_LV_SIZE: u64 = GIB;

/// Build the concrete partition table for one request.
///
/// Mountpoints already in `base` grow to the requested minimum size. Other
/// mountpoints need `lvmify`: the root partition becomes the `rootvg` volume
/// group and each new mountpoint gets its own logical volume. The result is
/// laid out to fill exactly `image_size` bytes, then every identifier the
/// base left empty is drawn from `rng`.
pub fn new_partition_table(
    base: &PartitionTable,
    mountpoints: &[FilesystemCustomization],
    image_size: u64,
    lvmify: bool,
    rng: &mut StdRng,
) -> Result<PartitionTable> {
    let mut table = base.clone();
    let mut new_mountpoints = Vec::new();

    for custom in mountpoints {
        let size = custom.min_size.bytes().ok_or_else(|| {
            Error::Validation(format!(
                "invalid minimum size for mountpoint {}",
                custom.mountpoint
            ))
        })?;
        if table.contains_mountpoint(&custom.mountpoint) {
            table.grow_filesystem(&custom.mountpoint, size)?;
        } else {
            new_mountpoints.push((custom.mountpoint.as_str(), size));
        }
    }

    if !new_mountpoints.is_empty() {
        if !lvmify {
            let names: Vec<&str> = new_mountpoints.iter().map(|(mp, _)| *mp).collect();
            return Err(Error::Resource(format!(
                "mountpoints {names:?} are not part of the fixed partition layout"
            )));
        }
        table.ensure_lvm()?;
        for (mountpoint, size) in new_mountpoints {
            table.add_logical_volume(mountpoint, size)?;
        }
    }

    table.relayout(image_size)?;
    table.generate_uuids(rng);
    Ok(table)
}

impl PartitionTable {
    fn grow_filesystem(&mut self, mountpoint: &str, size: u64) -> Result<()> {
        for partition in &mut self.partitions {
            match &mut partition.payload {
                Some(Payload::Filesystem(fs)) if fs.mountpoint == mountpoint => {
                    partition.size = partition.size.max(align_up(size, DEFAULT_GRAIN)?);
                    debug!(mountpoint, size = partition.size, "grew partition");
                    return Ok(());
                }
                Some(Payload::VolumeGroup(vg)) => {
                    if let Some(lv) = vg.logical_volume_mut(mountpoint) {
                        lv.size = lv.size.max(align_extent(size)?);
                        debug!(mountpoint, size = lv.size, "grew logical volume");
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Move the root filesystem onto LVM unless a volume group already exists.
    fn ensure_lvm(&mut self) -> Result<()> {
        if !self.volume_groups().is_empty() {
            return Ok(());
        }

        let root_index = self
            .partitions
            .iter()
            .position(|p| p.filesystem().is_some_and(|fs| fs.mountpoint == "/"))
            .ok_or_else(|| {
                Error::Config("base partition table has no root filesystem".to_string())
            })?;

        let mut root_index = root_index;
        if !self.contains_mountpoint("/boot") {
            let boot = Partition::new(BOOT_PARTITION_SIZE, self.pt_type.data_part_type())
                .with_filesystem(
                    Filesystem::new(FsType::Xfs, "/boot").with_label("boot"),
                );
            self.partitions.insert(root_index, boot);
            root_index += 1;
        }

        let lvm_type = self.pt_type.lvm_part_type().to_string();
        let root = &mut self.partitions[root_index];
        let Some(Payload::Filesystem(root_fs)) = root.payload.take() else {
            return Err(Error::Config("root partition lost its filesystem".to_string()));
        };
        let root_size = align_extent(root.size)?;
        let mut vg = VolumeGroup::new(ROOT_VG_NAME, Vec::new());
        vg.logical_volumes
            .push(LogicalVolume::new("rootlv", root_size, root_fs));
        root.part_type = lvm_type;
        root.payload = Some(Payload::VolumeGroup(vg));
        debug!(partition = root_index, "converted root partition to LVM");
        Ok(())
    }

    fn add_logical_volume(&mut self, mountpoint: &str, size: u64) -> Result<()> {
        let size = if size == 0 { DEFAULT_LV_SIZE } else { size };
        let vg = self
            .partitions
            .iter_mut()
            .find_map(|p| match &mut p.payload {
                Some(Payload::VolumeGroup(vg)) => Some(vg),
                _ => None,
            })
            .ok_or_else(|| Error::Config("no volume group to add volumes to".to_string()))?;
        let lv = vg.create_logical_volume(mountpoint, size)?;
        debug!(mountpoint, name = %lv.name, size = lv.size, "added logical volume");
        Ok(())
    }

    /// Assign start offsets and fit the table into `image_size`.
    ///
    /// Every partition is grain aligned; the first starts one grain in and
    /// GPT keeps one grain free at the end for the backup header. The last
    /// partition takes all remaining space, and when it holds a volume group
    /// the root logical volume takes the remaining extents.
    fn relayout(&mut self, image_size: u64) -> Result<()> {
        let footer = match self.pt_type {
            PartitionTableType::Gpt => DEFAULT_GRAIN,
            PartitionTableType::Dos => 0,
        };

        for partition in &mut self.partitions {
            let required = match &partition.payload {
                Some(Payload::VolumeGroup(vg)) => vg.required_size()?,
                _ => 0,
            };
            partition.size = align_up(partition.size.max(required), DEFAULT_GRAIN)?;
        }

        let mut start = DEFAULT_GRAIN;
        for partition in &mut self.partitions {
            partition.start = start;
            start = start
                .checked_add(partition.size)
                .ok_or_else(|| oversized(partition.size))?;
        }

        let needed = start.checked_add(footer).ok_or_else(|| oversized(start))?;
        if needed > image_size {
            return Err(Error::Resource(format!(
                "image size {image_size} is too small, the partition layout needs at least {needed} bytes"
            )));
        }

        let end = align_down(image_size - footer, DEFAULT_GRAIN);
        if let Some(last) = self.partitions.last_mut() {
            last.size = end - last.start;
            if let Some(Payload::VolumeGroup(vg)) = &mut last.payload {
                absorb_free_extents(vg, last.size)?;
            }
        }

        self.size = image_size;
        Ok(())
    }

    fn generate_uuids(&mut self, rng: &mut StdRng) {
        if self.uuid.is_empty() {
            self.uuid = match self.pt_type {
                PartitionTableType::Gpt => random_uuid(rng).to_uppercase(),
                PartitionTableType::Dos => format!("0x{:08x}", rng.gen::<u32>()),
            };
        }

        let gpt = self.pt_type == PartitionTableType::Gpt;
        for partition in &mut self.partitions {
            if gpt && partition.uuid.is_empty() {
                partition.uuid = random_uuid(rng).to_uppercase();
            }
            match &mut partition.payload {
                Some(Payload::Filesystem(fs)) => fill_fs_uuid(fs, rng),
                Some(Payload::VolumeGroup(vg)) => {
                    for lv in &mut vg.logical_volumes {
                        fill_fs_uuid(&mut lv.filesystem, rng);
                    }
                }
                None => {}
            }
        }
    }
}

fn absorb_free_extents(vg: &mut VolumeGroup, pv_size: u64) -> Result<()> {
    let used = vg.required_size()?;
    let free = pv_size.saturating_sub(used);
    let grow = free - free % LVM_EXTENT_SIZE;
    if grow == 0 {
        return Ok(());
    }
    let target = vg
        .logical_volumes
        .iter()
        .position(|lv| lv.filesystem.mountpoint == "/")
        .unwrap_or(0);
    if let Some(lv) = vg.logical_volumes.get_mut(target) {
        lv.size = align_extent(lv.size)?
            .checked_add(grow)
            .ok_or_else(|| oversized(grow))?;
    }
    Ok(())
}

fn fill_fs_uuid(fs: &mut Filesystem, rng: &mut StdRng) {
    if !fs.uuid.is_empty() {
        return;
    }
    fs.uuid = match fs.fs_type {
        FsType::Vfat => new_volid(rng),
        FsType::Xfs | FsType::Ext4 => random_uuid(rng),
    };
}

/// FAT volume id in `XXXX-XXXX` form.
pub fn new_volid(rng: &mut StdRng) -> String {
    let id = rng.gen::<u32>();
    format!("{:04X}-{:04X}", id >> 16, id & 0xffff)
}

fn random_uuid(rng: &mut StdRng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

/// `value` rounded up to a multiple of `grain`.
pub fn align_up(value: u64, grain: u64) -> Result<u64> {
    value
        .div_ceil(grain)
        .checked_mul(grain)
        .ok_or_else(|| oversized(value))
}

pub fn align_down(value: u64, grain: u64) -> u64 {
    value - value % grain
}

/// A size that does not fit in 64 bits once aligned or summed.
pub(crate) fn oversized(size: u64) -> Error {
    Error::Resource(format!("size {size} exceeds the largest supported disk size"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::DataSize;
    use crate::disk::part_type;
    use rand::SeedableRng;

    fn base_gpt() -> PartitionTable {
        PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(MIB, part_type::BIOS_BOOT_GUID).bootable(),
                Partition::new(100 * MIB, part_type::EFI_SYSTEM_GUID).with_filesystem(
                    Filesystem::new(FsType::Vfat, "/boot/efi").with_uuid("7B77-95E7"),
                ),
                Partition::new(2 * GIB, part_type::FILESYSTEM_DATA_GUID)
                    .with_filesystem(Filesystem::new(FsType::Xfs, "/").with_label("root")),
            ],
        )
    }

    fn mount(mountpoint: &str, bytes: u64) -> FilesystemCustomization {
        FilesystemCustomization {
            mountpoint: mountpoint.to_string(),
            min_size: DataSize::Bytes(bytes),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn new_mountpoint_converts_root_to_lvm() {
        let pt = new_partition_table(&base_gpt(), &[mount("/srv", GIB)], 10 * GIB, true, &mut rng())
            .expect("lvm layout");

        let vgs = pt.volume_groups();
        assert_eq!(vgs.len(), 1);
        let (_, vg) = vgs[0];
        assert_eq!(vg.name, "rootvg");
        let names: Vec<&str> = vg.logical_volumes.iter().map(|lv| lv.name.as_str()).collect();
        assert_eq!(names, vec!["rootlv", "srvlv"]);
        assert!(pt.boot_filesystem().is_some(), "boot partition added");
        assert_eq!(pt.find_mountpoint("/srv").map(|fs| fs.fs_type), Some(FsType::Xfs));
    }

    #[test]
    fn new_mountpoint_without_lvmify_fails() {
        let err = new_partition_table(&base_gpt(), &[mount("/srv", GIB)], 10 * GIB, false, &mut rng())
            .expect_err("fixed layout");
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn existing_mountpoint_grows_without_lvm() {
        let pt = new_partition_table(&base_gpt(), &[mount("/", 5 * GIB)], 10 * GIB, false, &mut rng())
            .expect("grown root");
        assert!(pt.volume_groups().is_empty());
        let root = pt.partitions.last().expect("root partition");
        assert!(root.size >= 5 * GIB);
    }

    #[test]
    fn layout_is_aligned_and_fits_image() {
        let image_size = 10 * GIB + 12345;
        let pt = new_partition_table(&base_gpt(), &[mount("/var/log", GIB)], image_size, true, &mut rng())
            .expect("layout");
        assert_eq!(pt.size, image_size);
        let mut expected_start = MIB;
        for partition in &pt.partitions {
            assert_eq!(partition.start % MIB, 0);
            assert_eq!(partition.size % MIB, 0);
            assert_eq!(partition.start, expected_start);
            expected_start += partition.size;
        }
        assert!(expected_start + MIB <= image_size);
        let (_, vg) = pt.volume_groups()[0];
        let container = pt.partitions.last().expect("lvm partition");
        assert!(vg.required_size().expect("vg size") <= container.size);
    }

    #[test]
    fn oversized_request_is_a_resource_error() {
        let err = new_partition_table(&base_gpt(), &[mount("/srv", u64::MAX)], 10 * GIB, true, &mut rng())
            .expect_err("oversized volume");
        assert!(matches!(err, Error::Resource(_)));

        let err = new_partition_table(&base_gpt(), &[mount("/", u64::MAX)], 10 * GIB, false, &mut rng())
            .expect_err("oversized partition");
        assert!(matches!(err, Error::Resource(_)));

        assert!(matches!(align_up(u64::MAX, MIB), Err(Error::Resource(_))));
        assert_eq!(align_up(MIB + 1, MIB).expect("aligned"), 2 * MIB);
    }

    #[test]
    fn too_small_image_is_a_resource_error() {
        let err = new_partition_table(&base_gpt(), &[mount("/", 4 * GIB)], 2 * GIB, true, &mut rng())
            .expect_err("does not fit");
        assert!(matches!(err, Error::Resource(_)));
    }

    #[test]
    fn same_seed_same_identifiers() {
        let a = new_partition_table(&base_gpt(), &[mount("/srv", GIB)], 10 * GIB, true, &mut rng())
            .expect("a");
        let b = new_partition_table(&base_gpt(), &[mount("/srv", GIB)], 10 * GIB, true, &mut rng())
            .expect("b");
        assert_eq!(a, b);

        let c = new_partition_table(
            &base_gpt(),
            &[mount("/srv", GIB)],
            10 * GIB,
            true,
            &mut StdRng::seed_from_u64(1),
        )
        .expect("c");
        assert_ne!(a.uuid, c.uuid);
        assert_eq!(a.partitions.len(), c.partitions.len());
        for (pa, pc) in a.partitions.iter().zip(&c.partitions) {
            assert_eq!((pa.start, pa.size), (pc.start, pc.size));
        }
    }

    #[test]
    fn preset_uuids_are_kept() {
        let pt = new_partition_table(&base_gpt(), &[], 4 * GIB, true, &mut rng()).expect("layout");
        assert_eq!(
            pt.find_mountpoint("/boot/efi").map(|fs| fs.uuid.as_str()),
            Some("7B77-95E7")
        );
        assert!(!pt.root_filesystem().expect("root").uuid.is_empty());
    }

    #[test]
    fn existing_volume_group_receives_new_volume() {
        let base = PartitionTable::new(
            PartitionTableType::Gpt,
            vec![
                Partition::new(500 * MIB, part_type::EFI_SYSTEM_GUID)
                    .with_filesystem(Filesystem::new(FsType::Vfat, "/boot/efi")),
                Partition::new(500 * MIB, part_type::FILESYSTEM_DATA_GUID)
                    .with_filesystem(Filesystem::new(FsType::Xfs, "/boot")),
                Partition::new(2 * GIB, part_type::LVM_GUID).with_volume_group(VolumeGroup::new(
                    "rootvg",
                    vec![LogicalVolume::new("rootlv", 2 * GIB, Filesystem::new(FsType::Xfs, "/"))],
                )),
            ],
        );
        let pt = new_partition_table(&base, &[mount("/data", 3 * GIB)], 20 * GIB, true, &mut rng())
            .expect("layout");
        assert_eq!(pt.partitions.len(), 3);
        assert!(pt.contains_mountpoint("/data"));
    }

    #[test]
    fn dos_tables_get_hex_identifier() {
        let base = PartitionTable::new(
            PartitionTableType::Dos,
            vec![Partition::new(2 * GIB, part_type::DOS_LINUX)
                .bootable()
                .with_filesystem(Filesystem::new(FsType::Xfs, "/"))],
        );
        let pt = new_partition_table(&base, &[mount("/home", GIB)], 10 * GIB, true, &mut rng())
            .expect("layout");
        assert!(pt.uuid.starts_with("0x"));
        assert!(pt.partitions.iter().all(|p| p.uuid.is_empty()));
        assert_eq!(pt.partitions[1].part_type, part_type::DOS_LVM);
    }
}
