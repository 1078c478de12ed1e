//! Content sources: everything the engine fetches before running stages.

use std::collections::BTreeMap;

use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::rpmmd::{PackageSpec, RHSM_SECRETS};

#[derive(Debug, Clone, Default, Serialize)]
pub struct Sources {
    #[serde(rename = "org.osbuild.curl", skip_serializing_if = "Option::is_none")]
    pub curl: Option<CurlSource>,
    #[serde(rename = "org.osbuild.ostree", skip_serializing_if = "Option::is_none")]
    pub ostree: Option<OSTreeSource>,
    #[serde(rename = "org.osbuild.inline", skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineSource>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CurlSource {
    pub items: BTreeMap<String, CurlItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurlItem {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Secrets {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OSTreeSource {
    pub items: BTreeMap<String, OSTreeItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeItem {
    pub remote: OSTreeRemote,
}

#[derive(Debug, Clone, Serialize)]
pub struct OSTreeRemote {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InlineSource {
    pub items: BTreeMap<String, InlineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineItem {
    pub encoding: String,
    pub data: String,
}

impl Sources {
    /// Register a package for download.
    ///
    /// Packages are keyed by checksum; a later spec with the same checksum
    /// replaces the earlier one.
    pub fn add_package(&mut self, spec: &PackageSpec) {
        let secrets = (spec.secrets.as_deref() == Some(RHSM_SECRETS)).then(|| Secrets {
            name: RHSM_SECRETS.to_string(),
        });
        self.curl.get_or_insert_with(CurlSource::default).items.insert(
            spec.checksum.clone(),
            CurlItem {
                url: spec.remote_location.clone(),
                secrets,
            },
        );
    }

    pub fn add_ostree_commit(&mut self, checksum: &str, url: &str) {
        self.ostree
            .get_or_insert_with(OSTreeSource::default)
            .items
            .insert(
                checksum.to_string(),
                OSTreeItem {
                    remote: OSTreeRemote {
                        url: url.to_string(),
                    },
                },
            );
    }

    /// Embed `data` in the manifest and return its `sha256:` key.
    pub fn add_inline(&mut self, data: &str) -> String {
        let key = inline_checksum(data);
        self.inline
            .get_or_insert_with(InlineSource::default)
            .items
            .insert(
                key.clone(),
                InlineItem {
                    encoding: "base64".to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(data.as_bytes()),
                },
            );
        key
    }
}

/// Key under which `data` is stored in the inline source.
pub fn inline_checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(checksum: &str, url: &str) -> PackageSpec {
        PackageSpec {
            name: "bash".into(),
            remote_location: url.into(),
            checksum: checksum.into(),
            ..Default::default()
        }
    }

    #[test]
    fn same_checksum_last_write_wins() {
        let mut sources = Sources::default();
        sources.add_package(&spec("sha256:aa", "https://one.example.com/bash.rpm"));
        sources.add_package(&spec("sha256:aa", "https://two.example.com/bash.rpm"));

        let curl = sources.curl.expect("curl source");
        assert_eq!(curl.items.len(), 1);
        assert_eq!(curl.items["sha256:aa"].url, "https://two.example.com/bash.rpm");
    }

    #[test]
    fn rhsm_secret_is_attached() {
        let mut sources = Sources::default();
        let mut entitled = spec("sha256:bb", "https://cdn.example.com/x.rpm");
        entitled.secrets = Some(RHSM_SECRETS.into());
        let mut other = spec("sha256:cc", "https://cdn.example.com/y.rpm");
        other.secrets = Some("org.osbuild.unknown".into());
        sources.add_package(&entitled);
        sources.add_package(&other);

        let items = &sources.curl.as_ref().expect("curl").items;
        assert_eq!(
            items["sha256:bb"].secrets.as_ref().map(|s| s.name.as_str()),
            Some(RHSM_SECRETS)
        );
        assert!(items["sha256:cc"].secrets.is_none());
    }

    #[test]
    fn inline_items_are_content_addressed() {
        let mut sources = Sources::default();
        let key = sources.add_inline("hello");
        assert_eq!(
            key,
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        let item = &sources.inline.as_ref().expect("inline").items[&key];
        assert_eq!(item.encoding, "base64");
        assert_eq!(item.data, "aGVsbG8=");
    }

    #[test]
    fn empty_sources_serialize_to_empty_object() {
        let json = serde_json::to_string(&Sources::default()).expect("serialize");
        assert_eq!(json, "{}");
    }

    #[test]
    fn source_keys_use_wire_names() {
        let mut sources = Sources::default();
        sources.add_ostree_commit("abc123", "https://ostree.example.com/repo");
        let json = serde_json::to_value(&sources).expect("serialize");
        assert_eq!(
            json["org.osbuild.ostree"]["items"]["abc123"]["remote"]["url"],
            "https://ostree.example.com/repo"
        );
    }
}
