//! Anaconda installer ISOs and the pipelines they share with the OSTree
//! installers.

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::{build_pipeline, os_pipeline, ImageFamily, PipelineContext};
use crate::blueprint::DEFAULT_KERNEL_NAME;
use crate::distro::stage_options;
use crate::distro::{sets, X86_64};
use crate::error::Result;
use crate::osbuild::stages::{self, KickstartOptions, UserEntry, UsersOptions};
use crate::osbuild::{Input, Pipeline, Stage};

const ANACONDA_SHELL: &str = "/usr/libexec/anaconda/run-anaconda";
const LIVEIMG_PATH: &str = "/liveimg.tar";

/// ISO installing the plain OS tree from a tarball.
#[derive(Debug, Clone, Copy)]
pub struct InstallerImage;

impl ImageFamily for InstallerImage {
    fn lvmify(&self) -> bool {
        true
    }

    fn pipelines(&self, ctx: &PipelineContext<'_>, _rng: &mut StdRng) -> Result<Vec<Pipeline>> {
        let kernel_version = ctx.kernel_version(DEFAULT_KERNEL_NAME, &[sets::INSTALLER])?;

        let payload = vec![stages::tar(LIVEIMG_PATH, Input::tree("os"))];
        let kickstart = stage_options::tar_kickstart_options(&format!("file://{LIVEIMG_PATH}"));

        Ok(vec![
            build_pipeline(ctx),
            os_pipeline(ctx, None)?,
            anaconda_tree_pipeline(ctx, &kernel_version, "BaseOS"),
            bootiso_tree_pipeline(ctx, &kernel_version, kickstart, payload)?,
            bootiso_pipeline(ctx, ctx.arch() == X86_64),
        ])
    }
}

/// Users of the live installer environment. `install` is a root alias
/// whose login shell starts Anaconda.
fn installer_users() -> UsersOptions {
    let mut users = BTreeMap::new();
    users.insert(
        "root".to_string(),
        UserEntry {
            password: Some(String::new()),
            ..Default::default()
        },
    );
    users.insert(
        "install".to_string(),
        UserEntry {
            uid: Some(0),
            gid: Some(0),
            home: Some("/root".to_string()),
            shell: Some(ANACONDA_SHELL.to_string()),
            password: Some(String::new()),
            ..Default::default()
        },
    );
    UsersOptions { users }
}

/// The Anaconda runtime booted from the ISO.
pub(crate) fn anaconda_tree_pipeline(
    ctx: &PipelineContext<'_>,
    kernel_version: &str,
    variant: &str,
) -> Pipeline {
    let arch = ctx.arch();
    let distro = ctx.distro();

    let mut p = Pipeline::new("anaconda-tree").with_build("build");
    p.add_stage(stages::rpm(
        stage_options::rpm_options(ctx.repos),
        Input::packages(ctx.specs(sets::INSTALLER)),
    ));
    p.add_stage(stages::buildstamp(stage_options::buildstamp_options(
        arch,
        &distro.product,
        &distro.os_version,
        variant,
    )));
    p.add_stage(stages::locale("en_US.UTF-8"));
    p.add_stage(stages::users(installer_users()));
    p.add_stage(stages::anaconda(stage_options::anaconda_options()));
    p.add_stage(stages::lorax_script(stage_options::lorax_script_options(arch)));
    p.add_stage(stages::dracut(stage_options::dracut_options(
        kernel_version,
        arch,
        &["anaconda"],
    )));
    p.add_stage(stages::selinux_config("permissive"));
    p
}

/// ISO contents: boot files and squashed runtime, kickstart, then the
/// payload stages.
pub(crate) fn bootiso_tree_pipeline(
    ctx: &PipelineContext<'_>,
    kernel_version: &str,
    kickstart: KickstartOptions,
    payload: Vec<Stage>,
) -> Result<Pipeline> {
    let arch = ctx.arch();
    let distro = ctx.distro();
    let isolabel = distro.iso_label(arch);

    let mut p = Pipeline::new("bootiso-tree").with_build("build");
    p.add_stage(stages::bootiso_mono(
        stage_options::bootiso_mono_options(
            kernel_version,
            arch,
            &distro.vendor,
            &distro.product,
            &distro.os_version,
            &isolabel,
        )?,
        Input::tree("anaconda-tree"),
        Input::tree("anaconda-tree"),
    ));
    p.add_stage(stages::kickstart(kickstart));
    p.add_stage(stages::discinfo(stage_options::discinfo_options(arch)));
    p.add_stages(payload);
    Ok(p)
}

/// The final ISO built from `bootiso-tree`.
pub(crate) fn bootiso_pipeline(ctx: &PipelineContext<'_>, isolinux: bool) -> Pipeline {
    let filename = ctx.image_type.filename();
    let isolabel = ctx.distro().iso_label(ctx.arch());

    let mut p = Pipeline::new("bootiso").with_build("build");
    p.add_stage(stages::xorrisofs(
        stage_options::xorrisofs_options(filename, &isolabel, isolinux),
        Input::tree("bootiso-tree"),
    ));
    p.add_stage(stages::implantisomd5(filename));
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_user_is_root_alias_running_anaconda() {
        let users = installer_users();
        let install = &users.users["install"];
        assert_eq!(install.uid, Some(0));
        assert_eq!(install.shell.as_deref(), Some(ANACONDA_SHELL));
        assert_eq!(users.users["root"].password.as_deref(), Some(""));
    }
}
