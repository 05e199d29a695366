//! The `Reader`/`Writer` contract (§4.1) and the prioritized `ReaderCollection`
//! composition used to build a project's layered view of its sources.

use crate::error::Result;
use crate::vfs::resource::Resource;

/// Options accepted by [`Reader::by_glob`]. Defaults mirror §4.1: directories
/// are excluded from glob results.
#[derive(Debug, Clone, Copy)]
pub struct GlobOptions {
    pub nodir: bool,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self { nodir: true }
    }
}

/// A source of resources. Implemented by concrete filesystem readers, the
/// in-memory [`ReaderCollection`], [`crate::vfs::proxy::ProxyReader`], and
/// [`crate::vfs::switch::SwitchReader`].
pub trait Reader: Send + Sync {
    /// Looks up a single resource by its exact virtual path.
    fn by_path(&self, path: &str) -> Result<Option<Resource>>;

    /// Looks up every resource matching a glob pattern.
    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>>;
}

/// An ordered, priority list of readers (§4.1): `by_path` returns the first
/// non-null hit; `by_glob` unions hits in order, deduplicating by path.
pub struct ReaderCollection {
    readers: Vec<Box<dyn Reader>>,
}

impl ReaderCollection {
    pub fn new(readers: Vec<Box<dyn Reader>>) -> Self {
        Self { readers }
    }

    pub fn push(&mut self, reader: Box<dyn Reader>) {
        self.readers.push(reader);
    }
}

impl Reader for ReaderCollection {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        for reader in &self.readers {
            if let Some(resource) = reader.by_path(path)? {
                return Ok(Some(resource));
            }
        }
        Ok(None)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for reader in &self.readers {
            for resource in reader.by_glob(pattern, options)? {
                if seen.insert(resource.path().to_string()) {
                    out.push(resource);
                }
            }
        }
        Ok(out)
    }
}

/// An in-memory reader backed by a flat map, used by tests, the `dist`-style
/// source projection, and as the base layer under a [`crate::vfs::writer::Workspace`].
pub struct MemoryReader {
    resources: std::collections::HashMap<String, Resource>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self { resources: std::collections::HashMap::new() }
    }

    pub fn insert(&mut self, resource: Resource) {
        self.resources.insert(resource.path().to_string(), resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every path currently stored, in no particular order.
    pub fn paths(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }
}

impl Default for MemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reader for MemoryReader {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        Ok(self.resources.get(path).cloned())
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| crate::error::BuildEngineError::invalid_argument(e.to_string()))?;
        let mut out: Vec<Resource> = self
            .resources
            .values()
            .filter(|r| matcher.matches(r.path()))
            .filter(|r| !(options.nodir && r.path().ends_with('/')))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(out)
    }
}
