//! Project build context (§3, §4.4): per-project state carried across one
//! build — its stages, reader/workspace caches by style, build signature,
//! tag collection, and the request DAG that backs its cache.

pub mod driver;

use std::collections::BTreeMap;

use crate::dag::RequestDag;
use crate::error::{BuildEngineError, Result};
use crate::signature::BuildSignature;
use crate::task::TaskUtil;
use crate::vfs::reader::{GlobOptions, MemoryReader, Reader, ReaderCollection};
use crate::vfs::resource::{Tag, TagSet};
use crate::vfs::writer::{MemoryWriter, Workspace};
use crate::vfs::Style;

/// Declared identity of a project being built — name, version, type, and its
/// direct dependencies by name (already resolved; package-lock resolution is
/// an external collaborator, §1).
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub name: String,
    pub version: String,
    pub project_type: String,
    pub namespace: String,
    pub dependencies: Vec<String>,
}

/// One task's output overlay (§3 "Stage"). Exactly one of `writer` /
/// `cached` is populated at a time.
pub enum StageOutput {
    Writer(MemoryWriter),
    Cached(MemoryReader),
}

pub struct Stage {
    pub task_id: String,
    pub output: StageOutput,
}

impl Stage {
    pub fn new_pending(task_id: impl Into<String>) -> Self {
        Self { task_id: task_id.into(), output: StageOutput::Writer(MemoryWriter::new()) }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.output, StageOutput::Cached(_))
    }

    pub fn reader(&self) -> &dyn Reader {
        match &self.output {
            StageOutput::Writer(w) => w,
            StageOutput::Cached(r) => r,
        }
    }
}

/// Per-project state during one build (§3 "Project build context").
pub struct ProjectBuildContext {
    pub metadata: ProjectMetadata,
    pub stages: Vec<Stage>,
    current_stage: Option<usize>,
    result_stage_active: bool,
    pub build_signature: BuildSignature,
    pub tags: BTreeMap<String, TagSet>,
    pub cleanup_queue: Vec<String>,
    pub request_dag: RequestDag,
    source_reader: MemoryReader,
}

impl ProjectBuildContext {
    pub fn new(metadata: ProjectMetadata, task_ids: &[String], build_signature: BuildSignature) -> Self {
        let stages = task_ids.iter().map(Stage::new_pending).collect();
        Self {
            metadata,
            stages,
            current_stage: None,
            result_stage_active: false,
            build_signature,
            tags: BTreeMap::new(),
            cleanup_queue: Vec::new(),
            request_dag: RequestDag::new(),
            source_reader: MemoryReader::new(),
        }
    }

    pub fn source_reader_mut(&mut self) -> &mut MemoryReader {
        &mut self.source_reader
    }

    /// Activates stage `index` as current: reads fall through all *previous*
    /// stages plus the project's own sources (§4.3).
    pub fn use_stage(&mut self, index: usize) -> Result<()> {
        if index >= self.stages.len() {
            return Err(BuildEngineError::invalid_argument(format!(
                "stage index {index} out of range for project `{}`",
                self.metadata.name
            )));
        }
        self.current_stage = Some(index);
        self.result_stage_active = false;
        Ok(())
    }

    /// Activates the result stage: reads see every stage including the
    /// last, but no writer is available any more (§4.3).
    pub fn use_result_stage(&mut self) {
        self.current_stage = None;
        self.result_stage_active = true;
    }

    fn projected_source_path(&self, path: &str, style: Style) -> String {
        let ns = &self.metadata.namespace;
        match style {
            Style::BuildTime | Style::Runtime => format!("/resources/{ns}/{}", path.trim_start_matches('/')),
            Style::Dist => path.to_string(),
            Style::Flat => {
                let prefix = format!("/resources/{ns}/");
                path.strip_prefix(prefix.as_str()).map(|s| format!("/{s}")).unwrap_or_else(|| path.to_string())
            }
        }
    }

    /// Builds the composed reader for the current (or result) stage: writer
    /// or cached replacement, then previous stages in reverse order, then
    /// the project's source reader under `style` (§4.3).
    pub fn reader(&self, style: Style) -> Result<ReaderCollection> {
        let mut readers: Vec<Box<dyn Reader>> = Vec::new();

        let visible_upto = if self.result_stage_active {
            self.stages.len()
        } else {
            self.current_stage.ok_or_else(|| {
                BuildEngineError::invalid_state("no stage active: call use_stage() or use_result_stage() first")
            })?
        };

        for stage in self.stages[..visible_upto.min(self.stages.len())].iter().rev() {
            readers.push(match &stage.output {
                StageOutput::Writer(w) => Box::new(snapshot(w)),
                StageOutput::Cached(r) => Box::new(snapshot(r)),
            });
        }

        let mut projected = MemoryReader::new();
        for path in self.source_reader.paths() {
            let resource = self.source_reader.by_path(&path)?.expect("path came from listing the reader itself");
            let projected_path = self.projected_source_path(&path, style);
            projected.insert(crate::vfs::Resource::new(projected_path, resource.bytes().to_vec()));
        }
        readers.push(Box::new(projected));

        Ok(ReaderCollection::new(readers))
    }

    /// A writable workspace over the current stage, or an error if the
    /// result stage is active (§4.1 "Invariants"). The workspace is built
    /// around the current stage's own writer — taken out of the stage for
    /// the duration of the borrow — so a task's writes land in that stage's
    /// overlay rather than a disconnected scratch writer. Callers must
    /// return the writer via [`ProjectBuildContext::return_stage_writer`]
    /// once the task finishes.
    pub fn workspace(&mut self, style: Style) -> Result<Workspace> {
        if self.result_stage_active {
            return Err(BuildEngineError::invalid_state(
                "workspace unavailable once the result stage is active",
            ));
        }
        let index = self.current_stage.ok_or_else(|| {
            BuildEngineError::invalid_state("no stage active: call use_stage() first")
        })?;
        let fallthrough = self.reader(style)?;
        let stage_task_id = self.stages[index].task_id.clone();
        let writer = match &mut self.stages[index].output {
            StageOutput::Writer(w) => std::mem::take(w),
            StageOutput::Cached(_) => {
                return Err(BuildEngineError::invalid_state(format!(
                    "stage `{stage_task_id}` is a cache replay, not writable"
                )))
            }
        };
        Ok(Workspace::with_writer(writer, fallthrough))
    }

    /// Returns a workspace's writer to the current stage after a task
    /// finishes running against it.
    pub fn return_stage_writer(&mut self, workspace: Workspace) {
        if let Some(index) = self.current_stage {
            self.stages[index].output = StageOutput::Writer(workspace.into_writer());
        }
    }

    pub fn current_stage_index(&self) -> Option<usize> {
        self.current_stage
    }
}

/// A [`TaskUtil`] implementation backed by a project build context's own
/// tag map, dependency list, and cleanup queue. Owns its state rather than
/// borrowing `ctx` for its lifetime, so the driver can hold `&mut ctx` and
/// `&mut dyn TaskUtil` at the same time: [`Self::new`] takes the relevant
/// fields out of `ctx` via [`std::mem::take`], and [`Self::return_to`] puts
/// them back once the driver is done with this project's tasks.
pub struct ProjectTaskUtil {
    tags: BTreeMap<String, TagSet>,
    dependencies: Vec<String>,
    cleanup_queue: Vec<String>,
    is_root: bool,
}

impl ProjectTaskUtil {
    pub fn new(ctx: &mut ProjectBuildContext, is_root: bool) -> Self {
        Self {
            tags: std::mem::take(&mut ctx.tags),
            dependencies: ctx.metadata.dependencies.clone(),
            cleanup_queue: std::mem::take(&mut ctx.cleanup_queue),
            is_root,
        }
    }

    pub fn return_to(self, ctx: &mut ProjectBuildContext) {
        ctx.tags = self.tags;
        ctx.cleanup_queue = self.cleanup_queue;
    }
}

impl TaskUtil for ProjectTaskUtil {
    fn get_tag(&self, resource_path: &str, tag: Tag) -> bool {
        self.tags.get(resource_path).map(|t| t.get(tag)).unwrap_or(false)
    }

    fn set_tag(&mut self, resource_path: &str, tag: Tag, value: bool) {
        self.tags.entry(resource_path.to_string()).or_default().set(tag, value);
    }

    fn is_root_project(&self) -> bool {
        self.is_root
    }

    fn get_dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn register_cleanup_task(&mut self, description: String) {
        self.cleanup_queue.push(description);
    }
}

/// Copies a reader's current contents into a standalone [`MemoryReader`], so
/// the composed collection in [`ProjectBuildContext::reader`] is a point-in-time
/// snapshot rather than holding a borrow across the call.
fn snapshot(reader: &dyn Reader) -> MemoryReader {
    let mut out = MemoryReader::new();
    if let Ok(hits) = reader.by_glob("**/*", GlobOptions { nodir: true }) {
        for resource in hits {
            out.insert(resource);
        }
    }
    out
}
