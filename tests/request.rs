use std::fs;

use distro_compose::distro::Catalog;
use distro_compose::request::{load_package_specs, load_request};
use tempfile::TempDir;

const REQUEST: &str = r#"
seed = 1234

[options]
size = 21474836480

[[repositories]]
name = "baseos"
baseurl = "https://example.com/baseos"
check_gpg = false

[blueprint]
name = "web"
version = "0.0.1"

[[blueprint.packages]]
name = "nginx"
version = "*"

[blueprint.customizations]
hostname = "web01"

[blueprint.customizations.kernel]
append = "nosmt"
"#;

const SPECS: &str = r#"{
  "packages": [
    {
      "name": "kernel",
      "epoch": 0,
      "version": "4.18.0",
      "release": "372.el8",
      "arch": "x86_64",
      "remote_location": "https://example.com/kernel.rpm",
      "checksum": "sha256:0123456789abcdef",
      "check_gpg": true
    }
  ]
}"#;

#[test]
fn request_and_specs_load_from_disk() {
    let temp = TempDir::new().expect("tempdir");
    let request_path = temp.path().join("request.toml");
    let specs_path = temp.path().join("specs.json");
    fs::write(&request_path, REQUEST).expect("write request");
    fs::write(&specs_path, SPECS).expect("write specs");

    let request = load_request(&request_path).expect("request");
    assert_eq!(request.seed, 1234);
    assert_eq!(request.options.size, 20 * 1024 * 1024 * 1024);
    assert_eq!(request.repositories[0].name, "baseos");
    assert_eq!(request.blueprint.get_packages(), vec!["nginx"]);

    let specs = load_package_specs(&specs_path).expect("specs");
    assert_eq!(specs["packages"][0].kernel_release(), "4.18.0-372.el8.x86_64");

    let catalog = Catalog::new().expect("catalog");
    let qcow2 = catalog
        .get_distro("rhel-86")
        .and_then(|d| d.get_arch("x86_64"))
        .and_then(|a| a.get_image_type("qcow2"))
        .expect("qcow2");
    let manifest = qcow2
        .manifest(
            request.blueprint.customizations(),
            &request.options,
            &request.repositories,
            &specs,
            request.seed,
        )
        .expect("manifest");
    let json = manifest.to_json().expect("json");
    assert!(json.contains("nosmt"));
    assert!(json.contains("web01"));
}

#[test]
fn missing_file_error_names_the_path() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("absent.toml");
    let err = load_request(&path).expect_err("missing file");
    assert!(format!("{err:#}").contains("absent.toml"));
}

#[test]
fn malformed_specs_are_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("specs.json");
    fs::write(&path, r#"{"packages": [{"name": "kernel"}]}"#).expect("write");
    assert!(load_package_specs(&path).is_err());
}
