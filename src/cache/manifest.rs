//! The build manifest (§3, §6): a side artifact written into the final
//! overlay describing how a project was built, consumed by downstream
//! tooling that needs to know a package's build provenance without
//! re-deriving it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signature::BuildSignature;
use crate::vfs::resource::Tag;

pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildManifest {
    pub manifest_version: String,
    pub timestamp: String,
    pub build_signature: BuildSignature,
    pub versions: BTreeMap<String, String>,
    pub build_config: serde_json::Value,
    pub version: String,
    pub namespace: String,
    pub tags: BTreeMap<Tag, bool>,
}

impl BuildManifest {
    pub fn new(
        timestamp: impl Into<String>,
        build_signature: BuildSignature,
        versions: BTreeMap<String, String>,
        build_config: serde_json::Value,
        version: impl Into<String>,
        namespace: impl Into<String>,
        tags: BTreeMap<Tag, bool>,
    ) -> Self {
        Self {
            manifest_version: MANIFEST_VERSION.to_string(),
            timestamp: timestamp.into(),
            build_signature,
            versions,
            build_config,
            version: version.into(),
            namespace: namespace.into(),
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_serializes_tags_sorted_by_key() {
        let mut tags = BTreeMap::new();
        tags.insert(Tag::IsBundle, true);
        tags.insert(Tag::HasDebugVariant, false);

        let manifest = BuildManifest::new(
            "2026-01-01T00:00:00Z",
            BuildSignature("abc".into()),
            BTreeMap::new(),
            serde_json::Value::Null,
            "1.0.0",
            "my/app",
            tags,
        );

        let json = serde_json::to_string(&manifest).unwrap();
        let has_debug_pos = json.find("HasDebugVariant").unwrap();
        let is_bundle_pos = json.find("IsBundle").unwrap();
        assert!(has_debug_pos < is_bundle_pos);
    }
}
