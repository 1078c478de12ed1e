use rand::rngs::StdRng;

use super::{build_pipeline, image_pipeline, os_pipeline, xz_archive_pipeline, ImageFamily, PipelineContext};
use crate::blueprint::filesystems_of;
use crate::disk::PartitionTable;
use crate::distro::image_type::{DiskFormat, DiskImage};
use crate::distro::{sets, stage_options};
use crate::error::Result;
use crate::osbuild::stages;
use crate::osbuild::{Input, Pipeline};

impl DiskImage {
    /// Name of the file the `image` pipeline writes.
    fn raw_filename<'a>(&self, filename: &'a str) -> &'a str {
        match (&self.format, self.xz) {
            (DiskFormat::Raw, false) => filename,
            (DiskFormat::Raw, true) => "image.raw",
            _ => "disk.img",
        }
    }
}

impl ImageFamily for DiskImage {
    fn base_partition_table(&self, arch: &str) -> Option<&PartitionTable> {
        self.tables.get(arch)
    }

    fn lvmify(&self) -> bool {
        true
    }

    fn pipelines(&self, ctx: &PipelineContext<'_>, rng: &mut StdRng) -> Result<Vec<Pipeline>> {
        let pt = ctx.image_type.partition_table(
            filesystems_of(ctx.customizations),
            ctx.options,
            rng,
        )?;
        let kernel_version =
            ctx.kernel_version(&ctx.kernel_name(), &[sets::PACKAGES, sets::BLUEPRINT])?;
        let filename = ctx.image_type.filename();
        let raw = self.raw_filename(filename);

        let mut pipelines = vec![
            build_pipeline(ctx),
            os_pipeline(ctx, Some(&pt))?,
            image_pipeline(ctx, &pt, raw, "os", &kernel_version),
        ];

        if let (Some(name), Some(format)) = (
            self.format.pipeline_name(),
            stage_options::qemu_format(&self.format),
        ) {
            let mut qemu = Pipeline::new(name).with_build("build");
            qemu.add_stage(stages::qemu(
                filename,
                format,
                Input::pipeline_file("image", raw),
            ));
            pipelines.push(qemu);
        }

        if self.xz {
            pipelines.push(xz_archive_pipeline("image", raw, filename));
        }

        Ok(pipelines)
    }
}
