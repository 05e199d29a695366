use std::fmt;
use std::path::{Path, PathBuf};

/// Crate-wide result alias; every fallible core operation returns this.
pub type Result<T> = std::result::Result<T, BuildEngineError>;

/// The full error taxonomy for the build engine.
///
/// Cache and overlay errors ([`BuildEngineError::CacheCorruption`]) are meant
/// to be recovered in-engine by the caller (log, discard, rebuild cold); task
/// and configuration errors are meant to be surfaced to the orchestrator's
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum BuildEngineError {
    /// A caller-supplied argument was missing or conflicted with another.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An operation was attempted in a state that forbids it (e.g. a read
    /// through a sealed monitor, or a workspace requested after the result
    /// stage was activated).
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A resource was requested by path and does not exist in any reader.
    #[error("resource not found: {0}")]
    NotFound(ResourcePath),

    /// A requested combination of build options is not supported.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Persisted cache state could not be trusted (corrupt JSON, dangling
    /// stage reference, mismatched DAG `next_id`). Recoverable: the caller
    /// should discard the cache for the affected project and build cold.
    #[error("cache corrupted for project `{project}`: {message}")]
    CacheCorruption { project: String, message: String },

    /// A task returned an error during execution.
    #[error("task `{task}` failed: {source}")]
    TaskFailure {
        task: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// An I/O operation failed; the path being operated on is preserved
    /// alongside the underlying error.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildEngineError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState { message: message.into() }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration { message: message.into() }
    }

    pub fn cache_corruption(project: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CacheCorruption { project: project.into(), message: message.into() }
    }

    pub fn task_failure(
        task: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TaskFailure { task: task.into(), source: Box::new(source) }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Wrapper so [`BuildEngineError::NotFound`] prints a clean path without
/// dragging `Display` requirements onto `PathBuf` call sites.
#[derive(Debug, Clone)]
pub struct ResourcePath(pub String);

impl From<&Path> for ResourcePath {
    fn from(p: &Path) -> Self {
        Self(p.to_string_lossy().into_owned())
    }
}

impl From<String> for ResourcePath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extension trait mirroring the teacher's `SolcIoError` pairing of an
/// `io::Error` with the path it occurred on.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| BuildEngineError::io(path.into(), source))
    }
}
