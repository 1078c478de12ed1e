//! osbuild manifest (format version 2).
//!
//! Everything here serializes with ordered maps, so equal values always
//! produce byte-identical JSON.

pub mod disk;
pub mod sources;
pub mod stages;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::rpmmd::PackageSpec;

pub use sources::Sources;
pub use stages::StageOptions;

pub const MANIFEST_VERSION: &str = "2";

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub version: String,
    pub pipelines: Vec<Pipeline>,
    pub sources: Sources,
}

impl Manifest {
    pub fn new(pipelines: Vec<Pipeline>, sources: Sources) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            pipelines,
            sources,
        }
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pipeline {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build: None,
            runner: None,
            stages: Vec::new(),
        }
    }

    /// Run this pipeline inside the tree produced by pipeline `build`.
    pub fn with_build(mut self, build: &str) -> Self {
        self.build = Some(pipeline_ref(build));
        self
    }

    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    pub fn add_stages(&mut self, stages: impl IntoIterator<Item = Stage>) {
        self.stages.extend(stages);
    }

    pub fn stage(&self, stage_type: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.stage_type == stage_type)
    }
}

/// `name:<pipeline>`, the form used in build and input references.
pub fn pipeline_ref(name: &str) -> String {
    format!("name:{name}")
}

#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Input>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<StageOptions>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub devices: BTreeMap<String, Device>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

impl Stage {
    pub fn new(stage_type: impl Into<String>, options: impl Into<StageOptions>) -> Self {
        Self {
            options: Some(options.into()),
            ..Self::bare(stage_type)
        }
    }

    /// A stage without options.
    pub fn bare(stage_type: impl Into<String>) -> Self {
        Self {
            stage_type: stage_type.into(),
            inputs: BTreeMap::new(),
            options: None,
            devices: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, input: Input) -> Self {
        self.inputs.insert(name.into(), input);
        self
    }

    pub fn with_devices(mut self, devices: BTreeMap<String, Device>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_mounts(mut self, mounts: Vec<Mount>) -> Self {
        self.mounts = mounts;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

pub const ORIGIN_SOURCE: &str = "org.osbuild.source";
pub const ORIGIN_PIPELINE: &str = "org.osbuild.pipeline";

#[derive(Debug, Clone, Serialize)]
pub struct Input {
    #[serde(rename = "type")]
    pub input_type: String,
    pub origin: String,
    pub references: References,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum References {
    Ids(Vec<String>),
    Files(BTreeMap<String, FileReference>),
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReference {
    pub file: String,
}

impl Input {
    /// RPMs fetched through the curl source, by checksum.
    pub fn packages(specs: &[PackageSpec]) -> Self {
        Self {
            input_type: "org.osbuild.files".to_string(),
            origin: ORIGIN_SOURCE.to_string(),
            references: References::Ids(specs.iter().map(|s| s.checksum.clone()).collect()),
        }
    }

    /// The file tree produced by `pipeline`.
    pub fn tree(pipeline: &str) -> Self {
        Self {
            input_type: "org.osbuild.tree".to_string(),
            origin: ORIGIN_PIPELINE.to_string(),
            references: References::Ids(vec![pipeline_ref(pipeline)]),
        }
    }

    /// A single file out of the tree produced by `pipeline`.
    pub fn pipeline_file(pipeline: &str, file: &str) -> Self {
        let mut files = BTreeMap::new();
        files.insert(
            pipeline_ref(pipeline),
            FileReference {
                file: file.to_string(),
            },
        );
        Self {
            input_type: "org.osbuild.files".to_string(),
            origin: ORIGIN_PIPELINE.to_string(),
            references: References::Files(files),
        }
    }

    /// Content from the inline source, by checksum.
    pub fn source_file(checksum: &str) -> Self {
        Self {
            input_type: "org.osbuild.files".to_string(),
            origin: ORIGIN_SOURCE.to_string(),
            references: References::Ids(vec![checksum.to_string()]),
        }
    }

    /// An OSTree commit from the ostree source.
    pub fn ostree_commit(checksum: &str) -> Self {
        Self {
            input_type: "org.osbuild.ostree".to_string(),
            origin: ORIGIN_SOURCE.to_string(),
            references: References::Ids(vec![checksum.to_string()]),
        }
    }

    /// The commit produced by an earlier pipeline.
    pub fn ostree_pipeline(pipeline: &str) -> Self {
        Self {
            input_type: "org.osbuild.ostree".to_string(),
            origin: ORIGIN_PIPELINE.to_string(),
            references: References::Ids(vec![pipeline_ref(pipeline)]),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Devices and mounts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub options: DeviceOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeviceOptions {
    Loopback {
        filename: String,
        start: u64,
        size: u64,
    },
    LogicalVolume {
        volume: String,
    },
}

impl Device {
    /// Loop device over `filename`; `start` and `size` are in sectors.
    pub fn loopback(filename: &str, start: u64, size: u64) -> Self {
        Self {
            device_type: "org.osbuild.loopback".to_string(),
            parent: None,
            options: DeviceOptions::Loopback {
                filename: filename.to_string(),
                start,
                size,
            },
        }
    }

    /// Logical volume `volume` on the physical volume device `parent`.
    pub fn logical_volume(parent: &str, volume: &str) -> Self {
        Self {
            device_type: "org.osbuild.lvm2.lv".to_string(),
            parent: Some(parent.to_string()),
            options: DeviceOptions::LogicalVolume {
                volume: volume.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Mount {
    pub name: String,
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_build_reference_is_prefixed() {
        let pipeline = Pipeline::new("os").with_build("build");
        assert_eq!(pipeline.build.as_deref(), Some("name:build"));
    }

    #[test]
    fn empty_stage_fields_are_omitted() {
        let json = serde_json::to_string(&Stage::bare("org.osbuild.fix-bls")).expect("serialize");
        assert_eq!(json, r#"{"type":"org.osbuild.fix-bls"}"#);
    }

    #[test]
    fn file_inputs_reference_pipeline_output() {
        let input = Input::pipeline_file("image", "disk.img");
        let json = serde_json::to_value(&input).expect("serialize");
        assert_eq!(json["references"]["name:image"]["file"], "disk.img");
        assert_eq!(json["origin"], ORIGIN_PIPELINE);
    }

    #[test]
    fn manifest_has_version_two() {
        let manifest = Manifest::new(vec![Pipeline::new("build")], Sources::default());
        let json: serde_json::Value =
            serde_json::from_str(&manifest.to_json().expect("json")).expect("parse");
        assert_eq!(json["version"], "2");
        assert_eq!(manifest.pipeline_names(), vec!["build"]);
    }
}
