//! The project driver (component D, §4.4): orders projects leaves-first,
//! drives each project's tasks through the cache manager, and emits
//! lifecycle events for external consumers.

use std::collections::{BTreeMap, HashSet};

use tracing::info;

use crate::cache::CacheManager;
use crate::error::{BuildEngineError, Result};
use crate::events::{self, Event, Signal};
use crate::project::{ProjectBuildContext, StageOutput};
use crate::task::{DynTask, TaskContext, TaskUtil};
use crate::vfs::reader::Reader;
use crate::vfs::{MonitoredReaderWriter, Request};
use crate::vfs::Style;

/// Include/exclude selection for a build (§4.4). The two forms are mutually
/// exclusive; the root project always passes.
pub enum ProjectFilter {
    DependencyIncludes(Vec<String>),
    Explicit { includes: Vec<String>, excludes: Vec<String> },
}

impl ProjectFilter {
    pub fn passes(&self, project_name: &str, is_root: bool) -> bool {
        if is_root {
            return true;
        }
        match self {
            ProjectFilter::DependencyIncludes(includes) => includes.iter().any(|n| n == project_name),
            ProjectFilter::Explicit { includes, excludes } => {
                if excludes.iter().any(|n| n == project_name) {
                    return false;
                }
                includes.is_empty() || includes.iter().any(|n| n == project_name)
            }
        }
    }
}

/// A project node in the dependency graph the driver walks. Concrete
/// project-manifest parsing is an external collaborator (§1); the driver
/// only needs names, types, and a dependency edge list.
pub struct ProjectNode {
    pub name: String,
    pub project_type: String,
    pub is_root: bool,
    pub dependencies: Vec<String>,
}

/// Orders `projects` so that every project appears after all projects it
/// depends on (§4.4 "Ordering"). Returns an error if the dependency graph
/// has a cycle.
pub fn topological_order(projects: &[ProjectNode]) -> Result<Vec<usize>> {
    let index_by_name: BTreeMap<&str, usize> =
        projects.iter().enumerate().map(|(i, p)| (p.name.as_str(), i)).collect();

    let mut order = Vec::with_capacity(projects.len());
    let mut visited = vec![false; projects.len()];
    let mut in_progress = vec![false; projects.len()];

    fn visit(
        i: usize,
        projects: &[ProjectNode],
        index_by_name: &BTreeMap<&str, usize>,
        visited: &mut [bool],
        in_progress: &mut [bool],
        order: &mut Vec<usize>,
    ) -> Result<()> {
        if visited[i] {
            return Ok(());
        }
        if in_progress[i] {
            return Err(BuildEngineError::invalid_configuration(format!(
                "dependency cycle detected at project `{}`",
                projects[i].name
            )));
        }
        in_progress[i] = true;
        for dep in &projects[i].dependencies {
            if let Some(&dep_index) = index_by_name.get(dep.as_str()) {
                visit(dep_index, projects, index_by_name, visited, in_progress, order)?;
            }
        }
        in_progress[i] = false;
        visited[i] = true;
        order.push(i);
        Ok(())
    }

    for i in 0..projects.len() {
        visit(i, projects, &index_by_name, &mut visited, &mut in_progress, &mut order)?;
    }
    Ok(order)
}

#[derive(Debug)]
struct TaskRunFailed(String);

impl std::fmt::Display for TaskRunFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TaskRunFailed {}

/// Drives one or more projects' builds through the cache manager.
pub struct ProjectDriver<'a> {
    cache_manager: &'a CacheManager,
    aborted: std::sync::Arc<std::sync::atomic::AtomicBool>,
    use_workers: bool,
    pool: rayon::ThreadPool,
}

impl<'a> ProjectDriver<'a> {
    /// `use_workers` gates whether a [`crate::task::DynTask::is_parallelizable`]
    /// task is dispatched onto the driver's own `rayon` pool rather than run
    /// on the calling thread (§5 "Worker pool").
    pub fn new(cache_manager: &'a CacheManager, use_workers: bool) -> Self {
        Self {
            cache_manager,
            aborted: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            use_workers,
            pool: rayon::ThreadPoolBuilder::new().build().expect("failed to build worker pool"),
        }
    }

    /// Registers this driver run with the process-wide signal ref-count
    /// (§4.4). The host process is expected to call [`Self::notify_signal`]
    /// when it observes `HUP`/`INT`/`TERM`/`BREAK`.
    pub fn enter(&self) {
        events::SIGNAL_REFS.register();
    }

    pub fn exit(&self) {
        events::SIGNAL_REFS.deregister();
    }

    pub fn notify_signal(&self, _signal: Signal) {
        self.aborted.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Whether this project needs a build at all, independent of per-task
    /// cache validity — e.g. when the caller already knows which projects'
    /// source trees changed, every other project can be skipped wholesale.
    pub fn possibly_requires_build(&self, ctx: &ProjectBuildContext, changed_projects: &HashSet<String>) -> bool {
        changed_projects.is_empty() || changed_projects.contains(&ctx.metadata.name)
    }

    /// Drives every stage of `ctx` through its declared `tasks`, in order,
    /// consulting the cache manager before each and persisting its output
    /// after (§4.3, §4.4).
    pub fn build_project(
        &self,
        ctx: &mut ProjectBuildContext,
        tasks: &[&dyn DynTask],
        task_util: &mut dyn TaskUtil,
        style: Style,
    ) -> Result<()> {
        events::emit(Event::ProjectBuildMetadata {
            project: ctx.metadata.name.clone(),
            project_type: ctx.metadata.project_type.clone(),
        });

        for (index, task) in tasks.iter().enumerate() {
            if self.is_aborted() {
                return Err(BuildEngineError::invalid_state("build aborted by signal"));
            }

            ctx.use_stage(index)?;
            events::emit(Event::ProjectBuildStatus {
                project: ctx.metadata.name.clone(),
                task: Some(task.id().to_string()),
                status: "task-start".into(),
            });

            self.run_or_replay_task(ctx, *task, task_util, style)?;

            events::emit(Event::ProjectBuildStatus {
                project: ctx.metadata.name.clone(),
                task: Some(task.id().to_string()),
                status: "task-end".into(),
            });
        }

        self.cache_manager.save_dag(&ctx.metadata.name, &ctx.build_signature, &ctx.request_dag)?;

        events::emit(Event::ProjectBuildStatus {
            project: ctx.metadata.name.clone(),
            task: None,
            status: "project-end".into(),
        });
        info!(project = %ctx.metadata.name, "project build complete");
        Ok(())
    }

    fn run_or_replay_task(
        &self,
        ctx: &mut ProjectBuildContext,
        task: &dyn DynTask,
        task_util: &mut dyn TaskUtil,
        style: Style,
    ) -> Result<()> {
        let pre_task_reader = ctx.reader(style)?;
        let task_id = task.id().to_string();

        if let Some(node_id) = self.cache_manager.find_valid_match_for_task(
            &ctx.metadata.name,
            &ctx.build_signature,
            &task_id,
            &pre_task_reader,
        ) {
            let replay = self.cache_manager.load_stage(&ctx.metadata.name, &ctx.build_signature, &task_id)?;
            if let Some(index) = ctx.current_stage_index() {
                ctx.stages[index].output = StageOutput::Cached(replay);
            }
            events::emit(Event::ProjectBuildStatus {
                project: ctx.metadata.name.clone(),
                task: Some(task_id),
                status: "task-skip".into(),
            });
            return Ok(());
        }

        let changed_project_resource_paths =
            self.cache_manager.changed_paths_for_task(&ctx.metadata.name, &ctx.build_signature, &task_id, &pre_task_reader);

        let workspace = ctx.workspace(style)?;
        let mut monitor = MonitoredReaderWriter::new(workspace);
        let task_context =
            TaskContext { workspace: &mut monitor, task_util, changed_project_resource_paths };

        let run_result = if self.use_workers && task.is_parallelizable() {
            self.pool.install(|| task.run(task_context))
        } else {
            task.run(task_context)
        };
        run_result.map_err(|e| BuildEngineError::task_failure(task_id.as_str(), TaskRunFailed(e.to_string())))?;

        let requests = monitor.resource_requests();
        let workspace = monitor.into_inner();

        let mut read_resources = Vec::new();
        for request in &requests {
            if let Request::Path(path) = request {
                if let Some(resource) = pre_task_reader.by_path(path)? {
                    read_resources.push(resource);
                }
            }
        }

        let node_id = ctx.request_dag.find_exact_match(&requests).unwrap_or_else(|| {
            ctx.request_dag.add_request_set(requests, serde_json::json!({ "task": &task_id }))
        });

        self.cache_manager.persist_stage(
            &ctx.metadata.name,
            &ctx.build_signature,
            &task_id,
            node_id,
            workspace.writer(),
            &read_resources,
        )?;

        ctx.return_stage_writer(workspace);
        Ok(())
    }
}
