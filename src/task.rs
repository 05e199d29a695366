//! The external task contract (§6): deliberately narrow, since concrete
//! build tasks (minification, bundling, resource copy, …) are an external
//! collaborator this crate never implements itself.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::vfs::resource::Tag;
use crate::vfs::ReaderWriter;

/// Project-scoped operations a task needs beyond reading/writing resources:
/// tag manipulation, dependency lookup, and cleanup registration. Named
/// after the original system's `taskUtil` collaborator (§6). `Send` so a
/// `&mut dyn TaskUtil` can be moved into a `rayon` worker-pool closure when a
/// task is dispatched off the calling thread.
pub trait TaskUtil: Send {
    fn get_tag(&self, resource_path: &str, tag: Tag) -> bool;
    fn set_tag(&mut self, resource_path: &str, tag: Tag, value: bool);
    fn is_root_project(&self) -> bool;
    fn get_dependencies(&self) -> Vec<String>;
    fn register_cleanup_task(&mut self, description: String);
}

/// Everything a [`Task`] is invoked with.
pub struct TaskContext<'a> {
    pub workspace: &'a mut dyn ReaderWriter,
    pub task_util: &'a mut dyn TaskUtil,
    /// Set only when a cache hit narrowed execution to a subset of paths
    /// (§6); `None` means "treat every resource as potentially relevant".
    pub changed_project_resource_paths: Option<Vec<String>>,
}

/// One build task. `config` is serialized and hashed into the build
/// signature (§3) via [`crate::signature::hash_task_config`].
pub trait Task: Send + Sync {
    type Config: Serialize;

    fn id(&self) -> &str;
    fn config(&self) -> &Self::Config;
    fn run(&self, ctx: TaskContext<'_>) -> Result<()>;

    /// Whether this task's per-file work may be fanned out across the
    /// `rayon` worker pool (§5 "Worker pool"). Most tasks are not, and run
    /// on the calling thread.
    fn is_parallelizable(&self) -> bool {
        false
    }
}

/// Object-safe facade over [`Task`], used everywhere the driver needs to
/// hold a heterogeneous list of tasks (`Task::Config` varies per
/// implementor, so `dyn Task` itself cannot be formed).
pub trait DynTask: Send + Sync {
    fn id(&self) -> &str;
    fn config_hash(&self) -> Result<String>;
    fn run(&self, ctx: TaskContext<'_>) -> Result<()>;
    fn is_parallelizable(&self) -> bool;
}

impl<T: Task> DynTask for T {
    fn id(&self) -> &str {
        Task::id(self)
    }

    fn config_hash(&self) -> Result<String> {
        crate::signature::hash_task_config(self.config())
    }

    fn run(&self, ctx: TaskContext<'_>) -> Result<()> {
        Task::run(self, ctx)
    }

    fn is_parallelizable(&self) -> bool {
        Task::is_parallelizable(self)
    }
}

/// Per-project-type ordered task list plus the versions of contributing
/// components, consumed by the driver to build a project and by the
/// orchestrator to tag the build manifest (§6).
pub trait TaskRegistry {
    fn task_ids_for(&self, project_type: &str) -> Vec<String>;
    fn versions(&self) -> BTreeMap<String, String>;
}

/// A minimal, allocation-light [`TaskRegistry`] backed by a static table;
/// sufficient for tests and as a default when no external registry is wired
/// in.
#[derive(Debug, Clone, Default)]
pub struct StaticTaskRegistry {
    tasks_by_type: BTreeMap<String, Vec<String>>,
    versions: BTreeMap<String, String>,
}

impl StaticTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(mut self, project_type: impl Into<String>, task_ids: Vec<String>) -> Self {
        self.tasks_by_type.insert(project_type.into(), task_ids);
        self
    }

    pub fn with_version(mut self, component: impl Into<String>, version: impl Into<String>) -> Self {
        self.versions.insert(component.into(), version.into());
        self
    }
}

impl TaskRegistry for StaticTaskRegistry {
    fn task_ids_for(&self, project_type: &str) -> Vec<String> {
        self.tasks_by_type.get(project_type).cloned().unwrap_or_default()
    }

    fn versions(&self) -> BTreeMap<String, String> {
        self.versions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_registry_returns_registered_task_list() {
        let registry = StaticTaskRegistry::new()
            .with_tasks("application", vec!["replaceCopyright".into(), "minify".into()])
            .with_version("layerbuild", "0.1.0");

        assert_eq!(registry.task_ids_for("application"), vec!["replaceCopyright", "minify"]);
        assert!(registry.task_ids_for("library").is_empty());
        assert_eq!(registry.versions().get("layerbuild").map(String::as_str), Some("0.1.0"));
    }
}
