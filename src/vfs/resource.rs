//! The resource value type (§3): a named blob plus integrity hash, tags, and
//! a back-reference to the project it belongs to.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BuildEngineError, Result};
use crate::utils::hash_bytes;

/// Fixed allow-list of resource tags (§3). Any other string is rejected by
/// [`TagSet::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tag {
    IsDebugVariant,
    HasDebugVariant,
    OmitFromBuildResult,
    IsBundle,
}

impl Tag {
    pub const STANDARD_TAGS: [Tag; 4] =
        [Tag::IsDebugVariant, Tag::HasDebugVariant, Tag::OmitFromBuildResult, Tag::IsBundle];

    fn as_str(self) -> &'static str {
        match self {
            Tag::IsDebugVariant => "IsDebugVariant",
            Tag::HasDebugVariant => "HasDebugVariant",
            Tag::OmitFromBuildResult => "OmitFromBuildResult",
            Tag::IsBundle => "IsBundle",
        }
    }
}

// Hand-rolled rather than `#[derive(Serialize, Deserialize)]`: `Tag` is used
// as a `BTreeMap` key in `TagSet`/`BuildManifest`, and `serde_json` only
// accepts JSON object keys that serialize through `serialize_str`, which the
// derive's unit-variant serialization does not use.
impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "IsDebugVariant" => Ok(Tag::IsDebugVariant),
            "HasDebugVariant" => Ok(Tag::HasDebugVariant),
            "OmitFromBuildResult" => Ok(Tag::OmitFromBuildResult),
            "IsBundle" => Ok(Tag::IsBundle),
            other => Err(D::Error::custom(format!("unknown resource tag `{other}`"))),
        }
    }
}

/// Tags attached to one resource. Kept as a sorted map so the build manifest
/// (§6) can serialize tags "sorted by key" deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSet(BTreeMap<Tag, bool>);

impl TagSet {
    pub fn get(&self, tag: Tag) -> bool {
        self.0.get(&tag).copied().unwrap_or(false)
    }

    pub fn set(&mut self, tag: Tag, value: bool) {
        self.0.insert(tag, value);
    }
}

/// A single piece of build content. Immutable once [`Resource::seal`] has
/// been called by the orchestrator; bytes may be replaced in place before
/// that (§3 "Lifecycle").
#[derive(Debug, Clone)]
pub struct Resource {
    path: String,
    bytes: Arc<[u8]>,
    project: Option<String>,
    tags: TagSet,
    hash: Option<String>,
    sealed: bool,
}

impl Resource {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: Arc::from(bytes.into().into_boxed_slice()),
            project: None,
            tags: TagSet::default(),
            hash: None,
            sealed: false,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> Result<&mut TagSet> {
        if self.sealed {
            return Err(BuildEngineError::invalid_state(format!(
                "cannot modify tags of sealed resource `{}`",
                self.path
            )));
        }
        Ok(&mut self.tags)
    }

    /// Replaces the resource's content. Invalidates any cached integrity
    /// hash. Fails once the resource is sealed.
    pub fn set_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        if self.sealed {
            return Err(BuildEngineError::invalid_state(format!(
                "cannot write to sealed resource `{}`",
                self.path
            )));
        }
        self.bytes = Arc::from(bytes.into().into_boxed_slice());
        self.hash = None;
        Ok(())
    }

    /// Lazily computes and caches the content-addressable integrity hash.
    pub fn integrity_hash(&mut self) -> &str {
        if self.hash.is_none() {
            self.hash = Some(hash_bytes(&self.bytes));
        }
        self.hash.as_deref().unwrap()
    }

    /// Computes the integrity hash without mutating/caching it on `self`.
    pub fn integrity_hash_ref(&self) -> String {
        self.hash.clone().unwrap_or_else(|| hash_bytes(&self.bytes))
    }

    pub fn seal(&mut self) {
        self.integrity_hash();
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// A path-overriding view onto a concealed resource (§4.1): every operation
/// forwards to the concealed resource except the reported path. Changing the
/// path of a facade is forbidden; cloning resolves it into a real resource.
#[derive(Debug, Clone)]
pub struct ResourceFacade {
    path: String,
    concealed: Resource,
}

impl ResourceFacade {
    pub fn new(path: impl Into<String>, concealed: Resource) -> Self {
        Self { path: path.into(), concealed }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn original_path(&self) -> &str {
        self.concealed.path()
    }

    pub fn bytes(&self) -> &[u8] {
        self.concealed.bytes()
    }

    /// Materializes the facade into a standalone resource bearing its own
    /// path; this is what `clone()` on the original JS facade resolves to.
    pub fn resolve(&self) -> Resource {
        let mut resolved = self.concealed.clone();
        resolved.path = self.path.clone();
        resolved
    }
}
