//! Stage & cache manager (component C, §4.3): owns per-task output overlays
//! ("stages"), keys them by build signature, and persists/reconstitutes the
//! associated request DAG across runs.

pub mod manifest;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, instrument, warn};

use crate::dag::{NodeId, RequestDag};
use crate::error::{BuildEngineError, IoResultExt, Result};
use crate::signature::BuildSignature;
use crate::utils::{read_json_file, write_json_file};
use crate::vfs::monitor::RequestSet;
use crate::vfs::reader::{MemoryReader, Reader};
use crate::vfs::resource::Resource;
use crate::vfs::writer::{MemoryWriter, Writer};

pub use manifest::BuildManifest;

const DAG_FILE: &str = "dag.json";
const STAGE_METADATA_FILE: &str = "stage-metadata.json";
const LOCK_FILE: &str = "lock";

/// Exclusive per-(project, build-signature) write lock (§4.3, §5): created
/// with `create_new` so a second concurrent writer fails instead of
/// clobbering the first, and removed again on drop.
pub struct CacheLock {
    path: PathBuf,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Maps DAG node id to the stage (task id) whose output it describes, plus
/// the content hashes recorded for that stage's inputs at the time it was
/// cached — used to revalidate a hit (§4.3 "Change detection"). Also tracks,
/// per task id, which node is the most recent one recorded for it, so the
/// driver can find "the cache entry for this task" without re-running it.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct StageMetadata {
    entries: BTreeMap<NodeId, StageMetadataEntry>,
    latest_by_task: BTreeMap<String, NodeId>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StageMetadataEntry {
    task_id: String,
    content_hashes: BTreeMap<String, String>,
}

/// Owns the on-disk cache layout for one project, rooted at
/// `$UI5_DATA_DIR/cache/<project-name>/<build-signature>/`.
pub struct CacheManager {
    data_dir: PathBuf,
}

impl CacheManager {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Resolves the cache root from `UI5_DATA_DIR`, falling back to the OS
    /// cache directory (§6, §10).
    pub fn from_env() -> Self {
        let root = std::env::var_os("UI5_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("layerbuild")))
            .unwrap_or_else(|| PathBuf::from(".layerbuild-cache"));
        Self::new(root)
    }

    fn project_dir(&self, project: &str, signature: &BuildSignature) -> PathBuf {
        self.data_dir.join("cache").join(project).join(signature.as_str())
    }

    /// Acquires the write lock for this (project, build-signature). Fails
    /// with [`BuildEngineError::InvalidState`] if another writer holds it.
    pub fn acquire_lock(&self, project: &str, signature: &BuildSignature) -> Result<CacheLock> {
        let dir = self.project_dir(project, signature);
        std::fs::create_dir_all(&dir).with_path(&dir)?;
        let path = dir.join(LOCK_FILE);
        std::fs::OpenOptions::new().write(true).create_new(true).open(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                BuildEngineError::invalid_state(format!(
                    "cache for `{project}` at signature {signature} is locked by another build"
                ))
            } else {
                BuildEngineError::io(path.clone(), source)
            }
        })?;
        Ok(CacheLock { path })
    }

    /// Loads the persisted DAG for this (project, build-signature). Returns
    /// an empty DAG if none exists yet. On corruption, logs and returns an
    /// empty DAG rather than propagating — the caller proceeds with a cold
    /// build (§4.3 "Failure").
    #[instrument(skip(self), fields(project))]
    pub fn load_dag(&self, project: &str, signature: &BuildSignature) -> RequestDag {
        let path = self.project_dir(project, signature).join(DAG_FILE);
        if !path.exists() {
            return RequestDag::new();
        }
        match read_json_file(&path)
            .and_then(RequestDag::from_cache)
        {
            Ok(dag) => dag,
            Err(err) => {
                warn!(%err, "discarding corrupt request dag, falling back to a cold build");
                RequestDag::new()
            }
        }
    }

    pub fn save_dag(&self, project: &str, signature: &BuildSignature, dag: &RequestDag) -> Result<()> {
        let path = self.project_dir(project, signature).join(DAG_FILE);
        write_json_file(&path, &dag.to_cache_object())
    }

    fn load_stage_metadata(&self, project: &str, signature: &BuildSignature) -> StageMetadata {
        let path = self.project_dir(project, signature).join(STAGE_METADATA_FILE);
        if !path.exists() {
            return StageMetadata::default();
        }
        read_json_file(&path).unwrap_or_default()
    }

    fn save_stage_metadata(
        &self,
        project: &str,
        signature: &BuildSignature,
        metadata: &StageMetadata,
    ) -> Result<()> {
        let path = self.project_dir(project, signature).join(STAGE_METADATA_FILE);
        write_json_file(&path, metadata)
    }

    fn stage_dir(&self, project: &str, signature: &BuildSignature, task_id: &str) -> PathBuf {
        self.project_dir(project, signature).join("stages").join(task_id)
    }

    /// Checks whether `recorded_requests` exactly matches a DAG node *and*
    /// every recorded content hash for that node's resources still matches
    /// what `reader` returns today (§4.3 "Change detection"). Returns the
    /// matched node id only when both hold.
    pub fn find_valid_match(
        &self,
        dag: &RequestDag,
        project: &str,
        signature: &BuildSignature,
        recorded_requests: &RequestSet,
        reader: &dyn Reader,
    ) -> Option<NodeId> {
        let node_id = dag.find_exact_match(recorded_requests)?;
        self.revalidate_node(project, signature, node_id, reader)
    }

    /// Looks up the most recent cache entry recorded for `task_id` and
    /// revalidates its content hashes against `reader` (§4.3: "look up
    /// `findExactMatch` in the DAG using the previously recorded request
    /// set" — here the previously recorded set doesn't need re-discovering
    /// by re-running the task; it is exactly the materialized set of the
    /// node already on file for this task).
    pub fn find_valid_match_for_task(
        &self,
        project: &str,
        signature: &BuildSignature,
        task_id: &str,
        reader: &dyn Reader,
    ) -> Option<NodeId> {
        let metadata = self.load_stage_metadata(project, signature);
        let node_id = *metadata.latest_by_task.get(task_id)?;
        self.revalidate_node(project, signature, node_id, reader)
    }

    /// Every path recorded for `node_id` whose content hash (as reported by
    /// `reader` today) no longer matches what was recorded when the stage was
    /// cached. `None` if there is no recorded entry for `node_id` at all.
    fn mismatched_paths(
        &self,
        project: &str,
        signature: &BuildSignature,
        node_id: NodeId,
        reader: &dyn Reader,
    ) -> Option<Vec<String>> {
        let metadata = self.load_stage_metadata(project, signature);
        let entry = metadata.entries.get(&node_id)?;

        let mut mismatched = Vec::new();
        for (path, expected_hash) in &entry.content_hashes {
            let matches = matches!(reader.by_path(path), Ok(Some(current)) if current.integrity_hash_ref() == *expected_hash);
            if !matches {
                mismatched.push(path.clone());
            }
        }
        Some(mismatched)
    }

    fn revalidate_node(
        &self,
        project: &str,
        signature: &BuildSignature,
        node_id: NodeId,
        reader: &dyn Reader,
    ) -> Option<NodeId> {
        let mismatched = self.mismatched_paths(project, signature, node_id, reader)?;
        if mismatched.is_empty() {
            return Some(node_id);
        }
        debug!(count = mismatched.len(), "cache invalidated: content hash mismatch");
        None
    }

    /// The subset of a task's previously-read paths whose content no longer
    /// matches what was recorded on the last run that actually cached this
    /// task's output (§6 `changedProjectResourcePaths`). `None` when there is
    /// no prior cache entry for `task_id` to diff against.
    pub fn changed_paths_for_task(
        &self,
        project: &str,
        signature: &BuildSignature,
        task_id: &str,
        reader: &dyn Reader,
    ) -> Option<Vec<String>> {
        let metadata = self.load_stage_metadata(project, signature);
        let node_id = *metadata.latest_by_task.get(task_id)?;
        self.mismatched_paths(project, signature, node_id, reader)
    }

    /// Persists a stage's output and records it in the DAG under
    /// `node_id` obtained from [`RequestDag::add_request_set`], alongside the
    /// content hashes of the resources the task actually read (used by
    /// [`CacheManager::find_valid_match_for_task`] on the next run).
    pub fn persist_stage(
        &self,
        project: &str,
        signature: &BuildSignature,
        task_id: &str,
        node_id: NodeId,
        writer: &MemoryWriter,
        read_resources: &[Resource],
    ) -> Result<()> {
        let dir = self.stage_dir(project, signature, task_id);
        std::fs::create_dir_all(&dir).with_path(&dir)?;

        for path in writer.written_paths() {
            if let Some(resource) = writer.by_path(path)? {
                let target = dir.join(path.trim_start_matches('/'));
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).with_path(parent)?;
                }
                std::fs::write(&target, resource.bytes()).with_path(&target)?;
            }
        }

        let mut metadata = self.load_stage_metadata(project, signature);
        let content_hashes = read_resources
            .iter()
            .map(|r| (r.path().to_string(), r.integrity_hash_ref()))
            .collect();
        metadata
            .entries
            .insert(node_id, StageMetadataEntry { task_id: task_id.to_string(), content_hashes });
        metadata.latest_by_task.insert(task_id.to_string(), node_id);
        self.save_stage_metadata(project, signature, &metadata)
    }

    /// Reloads a previously persisted stage's output as a reader, for replay
    /// into a cache-hit stage's `cachedWriter` slot.
    pub fn load_stage(&self, project: &str, signature: &BuildSignature, task_id: &str) -> Result<MemoryReader> {
        let dir = self.stage_dir(project, signature, task_id);
        let mut reader = MemoryReader::new();
        if !dir.exists() {
            return Ok(reader);
        }
        for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                let relative = entry.path().strip_prefix(&dir).unwrap_or(entry.path());
                let virtual_path = format!("/{}", crate::utils::to_posix(relative));
                let bytes = std::fs::read(entry.path()).with_path(entry.path())?;
                reader.insert(Resource::new(virtual_path, bytes));
            }
        }
        Ok(reader)
    }
}
