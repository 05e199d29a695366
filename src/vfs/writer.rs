//! `Writer` and `Workspace` (§4.1): a writer is a reader plus `write`; a
//! workspace composes a writer with prioritized fallthrough readers so that
//! writes go to the writer and reads prefer it first.

use crate::error::Result;
use crate::vfs::reader::{GlobOptions, MemoryReader, Reader, ReaderCollection};
use crate::vfs::resource::Resource;

/// A reader that also accepts writes.
pub trait Writer: Reader {
    fn write(&mut self, resource: Resource) -> Result<()>;
}

/// In-memory writer backing one stage's output (§3 "Stage").
#[derive(Default)]
pub struct MemoryWriter {
    inner: MemoryReader,
    written_paths: Vec<String>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every path ever written through this writer, in write order
    /// (duplicates retained), mirroring the monitor's `pathsWritten` set
    /// before dedup — callers needing a set should collect into one.
    pub fn written_paths(&self) -> &[String] {
        &self.written_paths
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Reader for MemoryWriter {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        self.inner.by_path(path)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        self.inner.by_glob(pattern, options)
    }
}

impl Writer for MemoryWriter {
    fn write(&mut self, resource: Resource) -> Result<()> {
        self.written_paths.push(resource.path().to_string());
        self.inner.insert(resource);
        Ok(())
    }
}

/// A writer overlaid on prioritized fallthrough readers (§4.1): reads prefer
/// the writer, then fall through to the source readers in order; writes
/// always go to the writer.
pub struct Workspace {
    writer: MemoryWriter,
    fallthrough: ReaderCollection,
}

impl Workspace {
    pub fn new(fallthrough: ReaderCollection) -> Self {
        Self { writer: MemoryWriter::new(), fallthrough }
    }

    /// Builds a workspace around an existing writer — used by the project
    /// driver to hand a task the actual stage writer (so its output lands in
    /// that stage, not a disconnected scratch writer) rather than an empty
    /// one (§4.3).
    pub fn with_writer(writer: MemoryWriter, fallthrough: ReaderCollection) -> Self {
        Self { writer, fallthrough }
    }

    pub fn writer(&self) -> &MemoryWriter {
        &self.writer
    }

    /// Reclaims the writer after the task that used this workspace returns,
    /// so the driver can put it back into the stage it came from.
    pub fn into_writer(self) -> MemoryWriter {
        self.writer
    }
}

impl Reader for Workspace {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        if let Some(resource) = self.writer.by_path(path)? {
            return Ok(Some(resource));
        }
        self.fallthrough.by_path(path)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        let mut out = self.writer.by_glob(pattern, options)?;
        for path in out.iter().map(|r| r.path().to_string()) {
            seen.insert(path);
        }
        for resource in self.fallthrough.by_glob(pattern, options)? {
            if seen.insert(resource.path().to_string()) {
                out.push(resource);
            }
        }
        Ok(out)
    }
}

impl Writer for Workspace {
    fn write(&mut self, resource: Resource) -> Result<()> {
        self.writer.write(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_write_takes_priority_over_source_reader() {
        let mut source = MemoryReader::new();
        source.insert(Resource::new("/a.js", b"source".to_vec()));
        let mut workspace = Workspace::new(ReaderCollection::new(vec![Box::new(source)]));

        assert_eq!(workspace.by_path("/a.js").unwrap().unwrap().bytes(), b"source");
        workspace.write(Resource::new("/a.js", b"written".to_vec())).unwrap();
        assert_eq!(workspace.by_path("/a.js").unwrap().unwrap().bytes(), b"written");
    }
}
