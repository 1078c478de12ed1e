//! Registry of distributions, architectures and image types.

use std::collections::BTreeMap;

use tracing::debug;

use super::image_type::{ImageType, ImageTypeRef};
use super::{rhel8, sets, BootType, ImageConfig};
use crate::error::{Error, Result};

/// Every distribution this crate can compose, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    distros: BTreeMap<String, Distribution>,
}

impl Catalog {
    /// Build and check the full catalog.
    ///
    /// Broken catalog data (an image type without a build package set, an
    /// alias to a missing image type) is returned as [`Error::Config`].
    pub fn new() -> Result<Self> {
        Self::from_distributions(rhel8::distributions()?)
    }

    pub fn from_distributions(distributions: Vec<Distribution>) -> Result<Self> {
        let mut distros = BTreeMap::new();
        for distro in distributions {
            for arch in distro.arches.values() {
                arch.validate()?;
            }
            let name = distro.name.clone();
            if distros.insert(name.clone(), distro).is_some() {
                return Err(Error::Config(format!("distribution '{name}' defined twice")));
            }
        }
        debug!(distros = distros.len(), "catalog built");
        Ok(Self { distros })
    }

    pub fn get_distro(&self, name: &str) -> Result<&Distribution> {
        self.distros
            .get(name)
            .ok_or_else(|| Error::UnknownDistro(name.to_string()))
    }

    pub fn list_distros(&self) -> Vec<&str> {
        self.distros.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub name: String,
    pub product: String,
    pub os_version: String,
    pub release_version: String,
    pub module_platform_id: String,
    pub vendor: String,
    /// OSTree ref with an `{arch}` placeholder.
    pub ostree_ref_template: String,
    /// ISO volume label with an `{arch}` placeholder.
    pub iso_label_template: String,
    pub runner: String,
    pub default_image_config: ImageConfig,
    arches: BTreeMap<String, Architecture>,
}

impl Distribution {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        product: &str,
        os_version: &str,
        release_version: &str,
        module_platform_id: &str,
        vendor: &str,
        ostree_ref_template: &str,
        iso_label_template: &str,
        runner: &str,
        default_image_config: ImageConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            product: product.to_string(),
            os_version: os_version.to_string(),
            release_version: release_version.to_string(),
            module_platform_id: module_platform_id.to_string(),
            vendor: vendor.to_string(),
            ostree_ref_template: ostree_ref_template.to_string(),
            iso_label_template: iso_label_template.to_string(),
            runner: runner.to_string(),
            default_image_config,
            arches: BTreeMap::new(),
        }
    }

    pub fn add_arch(&mut self, arch: Architecture) -> Result<()> {
        if arch.distro != self.name {
            return Err(Error::Config(format!(
                "architecture '{}' belongs to '{}', not '{}'",
                arch.name, arch.distro, self.name
            )));
        }
        let name = arch.name.clone();
        if self.arches.insert(name.clone(), arch).is_some() {
            return Err(Error::Config(format!(
                "architecture '{name}' defined twice for '{}'",
                self.name
            )));
        }
        Ok(())
    }

    pub fn is_rhel(&self) -> bool {
        self.name.starts_with("rhel")
    }

    pub fn get_arch(&self, name: &str) -> Result<ArchRef<'_>> {
        let arch = self
            .arches
            .get(name)
            .ok_or_else(|| Error::UnknownArch(name.to_string()))?;
        Ok(ArchRef { distro: self, arch })
    }

    pub fn list_arches(&self) -> Vec<&str> {
        self.arches.keys().map(String::as_str).collect()
    }

    pub fn ostree_ref(&self, arch: &str) -> String {
        self.ostree_ref_template.replace("{arch}", arch)
    }

    pub fn iso_label(&self, arch: &str) -> String {
        self.iso_label_template.replace("{arch}", arch)
    }
}

#[derive(Debug, Clone)]
pub struct Architecture {
    pub name: String,
    /// Name of the owning distribution.
    pub distro: String,
    /// GRUB2 platform for BIOS / Open Firmware boot.
    pub legacy: Option<String>,
    pub boot_type: BootType,
    image_types: BTreeMap<String, ImageType>,
    aliases: BTreeMap<String, String>,
}

impl Architecture {
    pub fn new(distro: &str, name: &str, legacy: Option<&str>, boot_type: BootType) -> Self {
        Self {
            name: name.to_string(),
            distro: distro.to_string(),
            legacy: legacy.map(str::to_string),
            boot_type,
            image_types: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Register an image type and its aliases.
    pub fn add_image_type(&mut self, image_type: ImageType) -> Result<()> {
        if !image_type.package_sets.contains_key(sets::BUILD) {
            return Err(Error::Config(format!(
                "'{}' image type has no '{}' package set defined",
                image_type.name,
                sets::BUILD
            )));
        }
        let name = image_type.name.clone();
        for alias in &image_type.aliases {
            self.add_alias(alias, &name)?;
        }
        if self.image_types.insert(name.clone(), image_type).is_some() {
            return Err(Error::Config(format!(
                "image type '{name}' defined twice for {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Register `alias` for `target`; `target` is checked by [`validate`](Self::validate).
    pub fn add_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        if let Some(existing) = self.aliases.get(alias) {
            return Err(Error::Config(format!(
                "image type alias '{alias}' for '{target}' is already defined for another image type '{existing}'"
            )));
        }
        self.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    /// Check that every alias resolves and no alias shadows a real name.
    pub fn validate(&self) -> Result<()> {
        for (alias, target) in &self.aliases {
            if !self.image_types.contains_key(target) {
                return Err(Error::Config(format!(
                    "image type '{alias}' is an alias to a non-existing image type '{target}'"
                )));
            }
            if self.image_types.contains_key(alias) {
                return Err(Error::Config(format!(
                    "image type alias '{alias}' shadows an image type of the same name"
                )));
            }
        }
        Ok(())
    }
}

/// An architecture together with its distribution.
#[derive(Debug, Clone, Copy)]
pub struct ArchRef<'a> {
    pub distro: &'a Distribution,
    pub arch: &'a Architecture,
}

impl<'a> ArchRef<'a> {
    pub fn name(&self) -> &'a str {
        &self.arch.name
    }

    pub fn get_image_type(&self, name: &str) -> Result<ImageTypeRef<'a>> {
        let image_type = match self.arch.image_types.get(name) {
            Some(image_type) => image_type,
            None => {
                let target = self
                    .arch
                    .aliases
                    .get(name)
                    .ok_or_else(|| Error::UnknownImageType(name.to_string()))?;
                self.arch
                    .image_types
                    .get(target)
                    .ok_or_else(|| Error::UnknownImageType(name.to_string()))?
            }
        };
        Ok(ImageTypeRef::new(self.distro, self.arch, image_type))
    }

    pub fn list_image_types(&self) -> Vec<&'a str> {
        self.arch.image_types.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distro::image_type::ImageKind;
    use crate::distro::package_sets::PackageSetSource;
    use crate::rpmmd::PackageSet;

    fn tar_type(name: &str, with_build: bool) -> ImageType {
        let mut it = ImageType::new(name, "root.tar.xz", "application/x-tar", ImageKind::Tar)
            .pipelines(&["build"], &["os", "root-tar"]);
        if with_build {
            it = it.package_set(sets::BUILD, PackageSetSource::Literal(PackageSet::new(["rpm"])));
        }
        it
    }

    #[test]
    fn missing_build_set_is_a_config_error() {
        let mut arch = Architecture::new("test-1", "x86_64", None, BootType::Hybrid);
        let err = arch
            .add_image_type(tar_type("tar", false))
            .expect_err("build set required");
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn dangling_alias_fails_catalog_construction() {
        let mut distro = Distribution::new(
            "test-1",
            "Test",
            "1",
            "1",
            "platform:t1",
            "test",
            "test/{arch}",
            "TEST-{arch}",
            "org.osbuild.test1",
            ImageConfig::default(),
        );
        let mut arch = Architecture::new("test-1", "x86_64", None, BootType::Hybrid);
        arch.add_image_type(tar_type("tar", true)).expect("tar");
        arch.add_alias("tarball", "missing").expect("alias registered");
        distro.add_arch(arch).expect("arch");

        let err = Catalog::from_distributions(vec![distro]).expect_err("dangling alias");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        let mut arch = Architecture::new("test-1", "x86_64", None, BootType::Hybrid);
        arch.add_alias("a", "tar").expect("first");
        assert!(arch.add_alias("a", "other").is_err());
    }

    #[test]
    fn templates_are_formatted_with_arch() {
        let distro = Distribution::new(
            "test-1",
            "Test",
            "1",
            "1",
            "platform:t1",
            "test",
            "test/1/{arch}/edge",
            "TEST-1-{arch}",
            "org.osbuild.test1",
            ImageConfig::default(),
        );
        assert_eq!(distro.ostree_ref("aarch64"), "test/1/aarch64/edge");
        assert_eq!(distro.iso_label("x86_64"), "TEST-1-x86_64");
    }
}
