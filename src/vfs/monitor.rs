//! Monitoring wrapper (§3, §4.1): records every path and glob pattern asked
//! of the wrapped reader/writer, and every path written, so the cache manager
//! can later ask the DAG whether this exact request set was seen before.

use std::collections::BTreeSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{BuildEngineError, Result};
use crate::vfs::reader::{GlobOptions, Reader};
use crate::vfs::resource::Resource;
use crate::vfs::writer::Writer;

/// A single recorded access: either an exact path or a glob pattern. The
/// canonical key string (`"path:<value>"` / `"patterns:<value>"`) is the sole
/// identity used by the request DAG (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Request {
    Path(String),
    Pattern(String),
}

impl Request {
    /// The canonical key string used as DAG node identity.
    pub fn key(&self) -> String {
        match self {
            Request::Path(p) => format!("path:{p}"),
            Request::Pattern(p) => format!("patterns:[{p}]"),
        }
    }
}

/// An unordered set of [`Request`], identified by the set of its keys.
pub type RequestSet = BTreeSet<Request>;

struct MonitorState {
    paths: BTreeSet<String>,
    patterns: BTreeSet<String>,
    paths_written: BTreeSet<String>,
    sealed: bool,
}

/// Decorates a reader (and optionally a writer) recording every access.
/// Once [`MonitoredReaderWriter::seal`] is called (directly, or implicitly
/// via [`MonitoredReaderWriter::resource_requests`]), any further read or
/// write returns [`BuildEngineError::InvalidState`].
pub struct MonitoredReaderWriter<R> {
    inner: R,
    state: Mutex<MonitorState>,
}

impl<R> MonitoredReaderWriter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: Mutex::new(MonitorState {
                paths: BTreeSet::new(),
                patterns: BTreeSet::new(),
                paths_written: BTreeSet::new(),
                sealed: false,
            }),
        }
    }

    fn check_not_sealed(&self, op: &str) -> Result<()> {
        if self.state.lock().unwrap().sealed {
            return Err(BuildEngineError::invalid_state(format!(
                "cannot {op}: monitor is sealed"
            )));
        }
        Ok(())
    }

    pub fn seal(&self) {
        self.state.lock().unwrap().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().unwrap().sealed
    }

    /// Seals the monitor and returns the accumulated request set: every
    /// `by_path` and `by_glob` call becomes a [`Request`] entry.
    pub fn resource_requests(&self) -> RequestSet {
        self.seal();
        let state = self.state.lock().unwrap();
        state
            .paths
            .iter()
            .cloned()
            .map(Request::Path)
            .chain(state.patterns.iter().cloned().map(Request::Pattern))
            .collect()
    }

    /// Every path written through this monitor since construction.
    pub fn written_paths(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().paths_written.clone()
    }

    /// Unwraps the monitor, discarding its recorded state. Callers that
    /// still need the request set should call [`Self::resource_requests`]
    /// first.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Reader> Reader for MonitoredReaderWriter<R> {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        self.check_not_sealed("read")?;
        trace!(path, "monitored read");
        self.state.lock().unwrap().paths.insert(path.to_string());
        self.inner.by_path(path)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        self.check_not_sealed("read")?;
        trace!(pattern, "monitored glob read");
        self.state.lock().unwrap().patterns.insert(pattern.to_string());
        self.inner.by_glob(pattern, options)
    }
}

impl<W: Writer> Writer for MonitoredReaderWriter<W> {
    fn write(&mut self, resource: Resource) -> Result<()> {
        self.check_not_sealed("write")?;
        trace!(path = resource.path(), "monitored write");
        self.state.lock().unwrap().paths_written.insert(resource.path().to_string());
        self.inner.write(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::reader::MemoryReader;
    use crate::vfs::writer::MemoryWriter;

    #[test]
    fn records_reads_and_seals_on_demand() {
        let mut source = MemoryReader::new();
        source.insert(Resource::new("/a.js", b"hi".to_vec()));
        let monitor = MonitoredReaderWriter::new(source);

        monitor.by_path("/a.js").unwrap();
        monitor.by_glob("/*.js", GlobOptions::default()).unwrap();

        let requests = monitor.resource_requests();
        assert!(requests.contains(&Request::Path("/a.js".into())));
        assert!(requests.contains(&Request::Pattern("/*.js".into())));
        assert!(monitor.is_sealed());
        assert!(monitor.by_path("/a.js").is_err());
    }

    #[test]
    fn records_writes_independently_of_reads() {
        let monitor = MonitoredReaderWriter::new(MemoryWriter::new());
        let mut monitor = monitor;
        monitor.write(Resource::new("/out.js", b"x".to_vec())).unwrap();
        assert!(monitor.written_paths().contains("/out.js"));
    }
}
