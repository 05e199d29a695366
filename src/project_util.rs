//! Throwaway project-tree builder for tests (feature `project-util`),
//! mirroring the teacher's own `project_util::TempProject` helper: a scratch
//! directory on disk that test cases populate with source files and then
//! read back through the same [`crate::vfs`] readers the engine itself uses.

use std::path::Path;

use tempfile::TempDir;

use crate::error::{IoResultExt, Result};
use crate::utils::to_posix;
use crate::vfs::reader::{MemoryReader, Reader};
use crate::vfs::resource::Resource;

/// A project source tree rooted in a unique temporary directory, torn down
/// when dropped. Tests populate it with [`TempProject::write_file`] calls and
/// then hand [`TempProject::root`] (or [`TempProject::read_sources`]) to the
/// engine under test.
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    /// Creates an empty scratch tree.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("layerbuild-project-{}", unique_suffix()))
            .tempdir()
            .map_err(|e| crate::error::BuildEngineError::io(std::env::temp_dir(), e))?;
        Ok(Self { dir })
    }

    /// Creates a scratch tree seeded by recursively copying `fixture_dir`
    /// into it, for tests that start from a canned project layout.
    pub fn from_fixture(fixture_dir: &Path) -> Result<Self> {
        let project = Self::new()?;
        let mut options = fs_extra::dir::CopyOptions::new();
        options.content_only = true;
        fs_extra::dir::copy(fixture_dir, project.root(), &options)
            .map_err(|e| crate::error::BuildEngineError::invalid_state(format!("seeding fixture: {e}")))?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` to `relative_path` under the project root, creating
    /// parent directories as needed.
    pub fn write_file(&self, relative_path: &str, contents: impl AsRef<[u8]>) -> Result<()> {
        let target = self.dir.path().join(relative_path.trim_start_matches('/'));
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }
        std::fs::write(&target, contents).with_path(&target)
    }

    /// Walks the whole tree back into a [`MemoryReader`] of
    /// namespace-rooted resources (`/<relative-path>`), as the orchestrator
    /// expects a project's [`crate::orchestrator::ProjectDescriptor::sources`]
    /// to be shaped.
    pub fn read_sources(&self) -> Result<MemoryReader> {
        let mut reader = MemoryReader::new();
        for entry in walkdir::WalkDir::new(self.root()).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(self.root()).unwrap_or(entry.path());
                let virtual_path = format!("/{}", to_posix(relative));
                let bytes = std::fs::read(entry.path()).with_path(entry.path())?;
                reader.insert(Resource::new(virtual_path, bytes));
            }
        }
        Ok(reader)
    }

    /// Same as [`Self::read_sources`], flattened to a `Vec<Resource>` for
    /// direct use as [`crate::orchestrator::ProjectDescriptor::sources`].
    pub fn sources(&self) -> Result<Vec<Resource>> {
        let reader = self.read_sources()?;
        Ok(reader.paths().into_iter().filter_map(|p| reader.by_path(&p).ok().flatten()).collect())
    }
}

/// A short random/process-derived suffix so concurrently-running tests never
/// collide on a directory name even when `tempfile` is asked for the same
/// prefix.
fn unique_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let n: u32 = rng.gen();
    format!("{}-{:08x}", std::process::id(), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_through_the_filesystem() {
        let project = TempProject::new().unwrap();
        project.write_file("webapp/manifest.json", b"{}").unwrap();
        project.write_file("webapp/controller/App.controller.js", b"sap.ui.define([]);").unwrap();

        let sources = project.sources().unwrap();
        let paths: Vec<&str> = sources.iter().map(|r| r.path()).collect();
        assert!(paths.contains(&"/webapp/manifest.json"));
        assert!(paths.contains(&"/webapp/controller/App.controller.js"));
    }

    #[test]
    fn distinct_projects_get_distinct_roots() {
        let a = TempProject::new().unwrap();
        let b = TempProject::new().unwrap();
        assert_ne!(a.root(), b.root());
    }
}
