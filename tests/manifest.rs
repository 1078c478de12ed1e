use std::collections::BTreeMap;

use distro_compose::blueprint::{
    Customizations, DataSize, FdoCustomization, FilesystemCustomization, KernelCustomization,
    UserCustomization,
};
use distro_compose::distro::{Catalog, ImageTypeRef, OSTreeImageOptions};
use distro_compose::error::Error;
use distro_compose::rpmmd::{PackageSpec, RepoConfig};
use distro_compose::ImageOptions;

const PARENT: &str = "02604b2da6e954bd34b8b82a835e5a77d2b60ffa";

fn kernel(arch: &str) -> PackageSpec {
    PackageSpec {
        name: "kernel".to_string(),
        version: "4.18.0".to_string(),
        release: "372.el8".to_string(),
        arch: arch.to_string(),
        remote_location: format!("https://example.com/kernel-4.18.0-372.el8.{arch}.rpm"),
        checksum: "sha256:6d2a0b9e8cc4e8d5b0d4fb4ea8c4d26f1b3b06f5a1a0c7d1e2f3a4b5c6d7e8f9"
            .to_string(),
        ..Default::default()
    }
}

fn specs(arch: &str) -> BTreeMap<String, Vec<PackageSpec>> {
    let mut specs = BTreeMap::new();
    specs.insert("packages".to_string(), vec![kernel(arch)]);
    specs.insert("installer".to_string(), vec![kernel(arch)]);
    specs
}

fn repos() -> Vec<RepoConfig> {
    vec![RepoConfig {
        name: "baseos".to_string(),
        base_url: Some("https://example.com/baseos".to_string()),
        gpg_key: Some("-----BEGIN PGP PUBLIC KEY BLOCK-----".to_string()),
        check_gpg: true,
        ..Default::default()
    }]
}

fn ostree_options() -> ImageOptions {
    ImageOptions {
        size: 0,
        ostree: OSTreeImageOptions {
            parent: PARENT.to_string(),
            url: "https://example.com/repo".to_string(),
            reference: String::new(),
        },
    }
}

fn with_image_type<F>(distro: &str, arch: &str, name: &str, f: F)
where
    F: FnOnce(ImageTypeRef<'_>),
{
    let catalog = Catalog::new().expect("catalog builds");
    let image_type = catalog
        .get_distro(distro)
        .and_then(|d| d.get_arch(arch))
        .and_then(|a| a.get_image_type(name))
        .expect("image type");
    f(image_type);
}

fn fdo_customizations(fdo: FdoCustomization) -> Customizations {
    Customizations {
        installation_device: Some("/dev/vda".to_string()),
        fdo: Some(fdo),
        ..Default::default()
    }
}

#[test]
fn qcow2_manifest_is_byte_identical_for_equal_seeds() {
    with_image_type("rhel-86", "x86_64", "qcow2", |qcow2| {
        let options = ImageOptions::default();
        let compose = |seed| {
            qcow2
                .manifest(None, &options, &repos(), &specs("x86_64"), seed)
                .expect("manifest")
                .to_json()
                .expect("json")
        };
        let first = compose(42);
        assert_eq!(first, compose(42));
        assert_ne!(first, compose(43));
    });
}

#[test]
fn disk_manifests_have_format_pipelines() {
    with_image_type("rhel-86", "x86_64", "qcow2", |qcow2| {
        let manifest = qcow2
            .manifest(None, &ImageOptions::default(), &repos(), &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(manifest.pipeline_names(), vec!["build", "os", "image", "qcow2"]);
        let json = manifest.to_json().expect("json");
        assert!(json.contains("ffffffffffffffffffffffffffffffff-4.18.0-372.el8.x86_64"));
        assert!(json.contains("https://example.com/kernel-4.18.0-372.el8.x86_64.rpm"));
    });

    with_image_type("rhel-86", "x86_64", "ec2", |ec2| {
        let manifest = ec2
            .manifest(None, &ImageOptions::default(), &repos(), &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(manifest.pipeline_names(), vec!["build", "os", "image", "archive"]);
    });
}

#[test]
fn tar_and_installer_pipelines() {
    with_image_type("centos-8", "aarch64", "tar", |tar| {
        let manifest = tar
            .manifest(None, &ImageOptions::default(), &[], &specs("aarch64"), 0)
            .expect("manifest");
        assert_eq!(manifest.pipeline_names(), vec!["build", "os", "root-tar"]);
    });

    with_image_type("rhel-87", "x86_64", "image-installer", |installer| {
        let manifest = installer
            .manifest(None, &ImageOptions::default(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(
            manifest.pipeline_names(),
            vec!["build", "os", "anaconda-tree", "bootiso-tree", "bootiso"]
        );
    });
}

#[test]
fn edge_commit_and_container_pipelines() {
    with_image_type("rhel-86", "x86_64", "edge-commit", |commit| {
        let manifest = commit
            .manifest(None, &ImageOptions::default(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(
            manifest.pipeline_names(),
            vec!["build", "ostree-tree", "ostree-commit", "commit-archive"]
        );
        assert!(manifest.to_json().expect("json").contains("rhel/8/x86_64/edge"));
    });

    with_image_type("centos-8", "aarch64", "edge-container", |container| {
        let manifest = container
            .manifest(None, &ImageOptions::default(), &[], &specs("aarch64"), 0)
            .expect("manifest");
        assert_eq!(
            manifest.pipeline_names(),
            vec!["build", "ostree-tree", "ostree-commit", "container-tree", "container"]
        );
        assert!(manifest.to_json().expect("json").contains("\"arm64\""));
    });
}

#[test]
fn edge_raw_image_requires_parent_commit() {
    with_image_type("rhel-86", "x86_64", "edge-raw-image", |raw| {
        let err = raw
            .manifest(None, &ImageOptions::default(), &[], &specs("x86_64"), 0)
            .expect_err("parent required");
        assert!(matches!(err, Error::Validation(_)));

        let manifest = raw
            .manifest(None, &ostree_options(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(manifest.pipeline_names(), vec!["build", "image-tree", "image", "archive"]);
        assert!(manifest.to_json().expect("json").contains(PARENT));
    });
}

#[test]
fn edge_installer_rejects_customizations() {
    with_image_type("rhel-86", "x86_64", "edge-installer", |installer| {
        let customizations = Customizations {
            hostname: Some("edge".to_string()),
            ..Default::default()
        };
        let err = installer
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("customizations rejected");
        assert!(matches!(err, Error::Validation(_)));

        let manifest = installer
            .manifest(None, &ostree_options(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(
            manifest.pipeline_names(),
            vec!["build", "anaconda-tree", "bootiso-tree", "bootiso"]
        );
    });
}

#[test]
fn simplified_installer_needs_exactly_one_diun_key() {
    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let base = FdoCustomization {
            manufacturing_server_url: "http://fdo.example.com:8080".to_string(),
            ..Default::default()
        };

        let none = fdo_customizations(base.clone());
        let err = installer
            .manifest(Some(&none), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("no key");
        assert!(matches!(err, Error::Validation(_)));

        let two = fdo_customizations(FdoCustomization {
            diun_pub_key_insecure: "true".to_string(),
            diun_pub_key_hash: "sha256:abc".to_string(),
            ..base.clone()
        });
        let err = installer
            .manifest(Some(&two), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("two keys");
        assert!(matches!(err, Error::Validation(_)));

        let one = fdo_customizations(FdoCustomization {
            diun_pub_key_insecure: "true".to_string(),
            ..base
        });
        let manifest = installer
            .manifest(Some(&one), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert_eq!(
            manifest.pipeline_names(),
            vec![
                "build",
                "image-tree",
                "image",
                "archive",
                "coi-tree",
                "efiboot-tree",
                "bootiso-tree",
                "bootiso"
            ]
        );
        let json = manifest.to_json().expect("json");
        assert!(json.contains("fdo.manufacturing_server_url=http://fdo.example.com:8080"));
        assert!(json.contains("coreos.inst.install_dev=/dev/vda"));
    });
}

fn insecure_fdo() -> FdoCustomization {
    FdoCustomization {
        manufacturing_server_url: "http://fdo.example.com:8080".to_string(),
        diun_pub_key_insecure: "true".to_string(),
        ..Default::default()
    }
}

#[test]
fn simplified_installer_rejects_other_customizations() {
    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let customizations = Customizations {
            hostname: Some("edge".to_string()),
            ..fdo_customizations(insecure_fdo())
        };
        let err = installer
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("hostname rejected");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn simplified_installer_needs_an_installation_device() {
    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let customizations = Customizations {
            installation_device: Some(String::new()),
            ..fdo_customizations(insecure_fdo())
        };
        let err = installer
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("empty device");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn simplified_installer_needs_a_manufacturing_server() {
    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let customizations = fdo_customizations(FdoCustomization {
            manufacturing_server_url: String::new(),
            ..insecure_fdo()
        });
        let err = installer
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect_err("empty server url");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn ostree_installers_need_a_repository_url() {
    let options = ImageOptions {
        ostree: OSTreeImageOptions {
            url: String::new(),
            ..ostree_options().ostree
        },
        ..ostree_options()
    };

    with_image_type("rhel-86", "x86_64", "edge-installer", |installer| {
        let err = installer
            .manifest(None, &options, &[], &specs("x86_64"), 0)
            .expect_err("url required");
        assert!(matches!(err, Error::Validation(_)));
    });

    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let customizations = fdo_customizations(insecure_fdo());
        let err = installer
            .manifest(Some(&customizations), &options, &[], &specs("x86_64"), 0)
            .expect_err("url required");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn kernel_append_only_on_bootable_ostree_disks() {
    let customizations = Customizations {
        kernel: Some(KernelCustomization {
            name: "kernel".to_string(),
            append: "nosmt".to_string(),
        }),
        ..Default::default()
    };

    with_image_type("rhel-86", "x86_64", "edge-commit", |commit| {
        let err = commit
            .manifest(Some(&customizations), &ImageOptions::default(), &[], &specs("x86_64"), 0)
            .expect_err("append rejected");
        assert!(matches!(err, Error::Validation(_)));
    });

    with_image_type("rhel-86", "x86_64", "edge-raw-image", |raw| {
        let manifest = raw
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect("append accepted");
        assert!(manifest.to_json().expect("json").contains("nosmt"));
    });
}

#[test]
fn oversized_mountpoint_is_a_resource_error() {
    with_image_type("rhel-86", "x86_64", "qcow2", |qcow2| {
        let customizations = Customizations {
            filesystem: vec![FilesystemCustomization {
                mountpoint: "/srv".to_string(),
                min_size: DataSize::Bytes(u64::MAX),
            }],
            ..Default::default()
        };
        let err = qcow2
            .manifest(
                Some(&customizations),
                &ImageOptions::default(),
                &[],
                &specs("x86_64"),
                0,
            )
            .expect_err("oversized");
        assert!(matches!(err, Error::Resource(_)));
    });
}

#[test]
fn root_certs_land_in_inline_sources() {
    with_image_type("rhel-87", "x86_64", "edge-simplified-installer", |installer| {
        let customizations = fdo_customizations(FdoCustomization {
            manufacturing_server_url: "http://fdo.example.com:8080".to_string(),
            diun_pub_key_root_certs: "-----BEGIN CERTIFICATE-----".to_string(),
            ..Default::default()
        });
        let manifest = installer
            .manifest(Some(&customizations), &ostree_options(), &[], &specs("x86_64"), 0)
            .expect("manifest");
        assert!(manifest.to_json().expect("json").contains("org.osbuild.inline"));
    });
}

#[test]
fn disallowed_mountpoints_are_listed() {
    with_image_type("rhel-86", "x86_64", "qcow2", |qcow2| {
        let mountpoint = |path: &str| FilesystemCustomization {
            mountpoint: path.to_string(),
            min_size: DataSize::Bytes(1024 * 1024 * 1024),
        };
        let customizations = Customizations {
            filesystem: vec![mountpoint("/srv"), mountpoint("/etc"), mountpoint("/boot")],
            ..Default::default()
        };
        let err = qcow2
            .manifest(
                Some(&customizations),
                &ImageOptions::default(),
                &[],
                &specs("x86_64"),
                0,
            )
            .expect_err("invalid mountpoints");
        match err {
            Error::InvalidMountpoints(paths) => assert_eq!(paths, vec!["/etc", "/boot"]),
            other => panic!("unexpected error: {other}"),
        }
    });
}

#[test]
fn ostree_types_reject_custom_mountpoints() {
    with_image_type("rhel-86", "x86_64", "edge-commit", |commit| {
        let customizations = Customizations {
            filesystem: vec![FilesystemCustomization {
                mountpoint: "/srv".to_string(),
                min_size: DataSize::Bytes(1024 * 1024 * 1024),
            }],
            ..Default::default()
        };
        let err = commit
            .manifest(Some(&customizations), &ImageOptions::default(), &[], &specs("x86_64"), 0)
            .expect_err("mountpoints rejected");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn plaintext_passwords_are_rejected() {
    with_image_type("rhel-86", "x86_64", "qcow2", |qcow2| {
        let customizations = Customizations {
            user: vec![UserCustomization {
                name: "admin".to_string(),
                password: Some("hunter2".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = qcow2
            .manifest(
                Some(&customizations),
                &ImageOptions::default(),
                &[],
                &specs("x86_64"),
                0,
            )
            .expect_err("plaintext password");
        assert!(matches!(err, Error::Validation(_)));
    });
}

#[test]
fn missing_kernel_spec_is_a_validation_error() {
    with_image_type("rhel-86", "aarch64", "qcow2", |qcow2| {
        let err = qcow2
            .manifest(None, &ImageOptions::default(), &[], &BTreeMap::new(), 0)
            .expect_err("no kernel");
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.is_client_error());
    });
}
