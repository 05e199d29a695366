//! Whole-build scenarios driving the orchestrator end to end, mirroring the
//! numbered scenarios used to seed the unit-test suite: a cold build runs
//! every task, a warm build with no source changes re-runs nothing, and a
//! warm build touching one file only re-runs the tasks whose recorded
//! request sets intersect the change.

#![cfg(feature = "full")]

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;

use layerbuild::error::Result;
use layerbuild::project_util::TempProject;
use layerbuild::task::{StaticTaskRegistry, Task, TaskContext};
use layerbuild::vfs::{Reader, Writer};
use layerbuild::{
    BuildConfig, BuildOrchestrator, BuildToTargetParams, CacheManager, OutputStyle, ProjectDescriptor,
    ProjectMetadata,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

/// Copies a single named resource through unchanged, recording its own
/// invocations in a shared counter so tests can assert on skip behavior.
struct TouchFileTask {
    id: String,
    path: String,
    runs: Arc<Mutex<Vec<String>>>,
}

impl Task for TouchFileTask {
    type Config = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn config(&self) -> &String {
        &self.path
    }

    fn run(&self, ctx: TaskContext<'_>) -> Result<()> {
        self.runs.lock().unwrap().push(self.id.clone());
        if let Some(resource) = ctx.workspace.by_path(&self.path)? {
            ctx.workspace.write(resource)?;
        }
        Ok(())
    }
}

fn metadata(name: &str, project_type: &str) -> ProjectMetadata {
    ProjectMetadata {
        name: name.to_string(),
        version: "1.0.0".into(),
        project_type: project_type.into(),
        namespace: name.replace('.', "/"),
        dependencies: Vec::new(),
    }
}

fn registry() -> StaticTaskRegistry {
    StaticTaskRegistry::new()
        .with_tasks("library", vec!["touchA".into(), "touchB".into()])
        .with_version("layerbuild", "0.1.0")
}

#[test]
fn cold_build_runs_every_task_and_writes_output() -> Result<()> {
    init_tracing();
    let project = TempProject::new()?;
    project.write_file("a.js", b"const a = 1;")?;
    project.write_file("b.js", b"const b = 2;")?;

    let runs = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<Box<dyn layerbuild::task::DynTask>> = vec![
        Box::new(TouchFileTask { id: "touchA".into(), path: "/a.js".into(), runs: runs.clone() }),
        Box::new(TouchFileTask { id: "touchB".into(), path: "/b.js".into(), runs: runs.clone() }),
    ];

    let descriptor =
        ProjectDescriptor { metadata: metadata("cold.app", "library"), is_root: true, tasks, sources: project.sources()? };

    let cache_dir = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let orchestrator = BuildOrchestrator::new(CacheManager::new(cache_dir.path().to_path_buf()));

    let params = BuildToTargetParams {
        dest_path: Some(dest.path().to_path_buf()),
        build_config: BuildConfig::new().output_style(OutputStyle::Default),
        ..BuildToTargetParams::default()
    };

    let report = orchestrator.build_to_target(params, &[descriptor], &registry())?;
    assert_eq!(report.built, vec!["cold.app".to_string()]);
    assert_eq!(runs.lock().unwrap().len(), 2);

    assert_eq!(std::fs::read_to_string(dest.path().join("a.js")).unwrap(), "const a = 1;");
    assert_eq!(std::fs::read_to_string(dest.path().join("b.js")).unwrap(), "const b = 2;");
    Ok(())
}

#[test]
fn warm_build_with_no_changes_reruns_nothing() -> Result<()> {
    let project = TempProject::new()?;
    project.write_file("a.js", b"const a = 1;")?;
    project.write_file("b.js", b"const b = 2;")?;

    let cache_dir = tempfile::tempdir().unwrap();
    let cache_manager = || CacheManager::new(cache_dir.path().to_path_buf());

    let build_once = |runs: Arc<Mutex<Vec<String>>>, dest: &std::path::Path| -> Result<()> {
        let tasks: Vec<Box<dyn layerbuild::task::DynTask>> = vec![
            Box::new(TouchFileTask { id: "touchA".into(), path: "/a.js".into(), runs: runs.clone() }),
            Box::new(TouchFileTask { id: "touchB".into(), path: "/b.js".into(), runs: runs.clone() }),
        ];
        let descriptor = ProjectDescriptor {
            metadata: metadata("warm.app", "library"),
            is_root: true,
            tasks,
            sources: project.sources()?,
        };
        let orchestrator = BuildOrchestrator::new(cache_manager());
        let params = BuildToTargetParams { dest_path: Some(dest.to_path_buf()), ..BuildToTargetParams::default() };
        orchestrator.build_to_target(params, &[descriptor], &registry())?;
        Ok(())
    };

    let first_dest = tempfile::tempdir().unwrap();
    let first_runs = Arc::new(Mutex::new(Vec::new()));
    build_once(first_runs.clone(), first_dest.path())?;
    assert_eq!(first_runs.lock().unwrap().len(), 2);

    let second_dest = tempfile::tempdir().unwrap();
    let second_runs = Arc::new(Mutex::new(Vec::new()));
    build_once(second_runs.clone(), second_dest.path())?;
    assert!(second_runs.lock().unwrap().is_empty(), "both tasks should have been cache hits");

    assert_eq!(
        std::fs::read_to_string(first_dest.path().join("a.js")).unwrap(),
        std::fs::read_to_string(second_dest.path().join("a.js")).unwrap(),
    );
    Ok(())
}

#[test]
fn warm_build_with_one_file_changed_only_reruns_the_affected_task() -> Result<()> {
    init_tracing();
    let project = TempProject::new()?;
    project.write_file("a.js", b"const a = 1;")?;
    project.write_file("b.js", b"const b = 2;")?;

    let cache_dir = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();

    let build_once = |runs: Arc<Mutex<Vec<String>>>| -> Result<()> {
        let tasks: Vec<Box<dyn layerbuild::task::DynTask>> = vec![
            Box::new(TouchFileTask { id: "touchA".into(), path: "/a.js".into(), runs: runs.clone() }),
            Box::new(TouchFileTask { id: "touchB".into(), path: "/b.js".into(), runs: runs.clone() }),
        ];
        let descriptor = ProjectDescriptor {
            metadata: metadata("partial.app", "library"),
            is_root: true,
            tasks,
            sources: project.sources()?,
        };
        let orchestrator = BuildOrchestrator::new(CacheManager::new(cache_dir.path().to_path_buf()));
        let params =
            BuildToTargetParams { dest_path: Some(dest.path().to_path_buf()), ..BuildToTargetParams::default() };
        orchestrator.build_to_target(params, &[descriptor], &registry())?;
        Ok(())
    };

    let first_runs = Arc::new(Mutex::new(Vec::new()));
    build_once(first_runs.clone())?;
    assert_eq!(first_runs.lock().unwrap().len(), 2);

    project.write_file("a.js", b"const a = 1; // line added")?;

    let second_runs = Arc::new(Mutex::new(Vec::new()));
    build_once(second_runs.clone())?;
    assert_eq!(*second_runs.lock().unwrap(), vec!["touchA".to_string()], "only the task touching the changed file should rerun");

    assert_eq!(std::fs::read_to_string(dest.path().join("a.js")).unwrap(), "const a = 1; // line added");
    assert_eq!(std::fs::read_to_string(dest.path().join("b.js")).unwrap(), "const b = 2;");
    Ok(())
}

#[test]
fn conflicting_dependency_filters_reject_the_whole_build_before_any_project_runs() {
    let project = TempProject::new().unwrap();
    project.write_file("a.js", b"const a = 1;").unwrap();

    let runs = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<Box<dyn layerbuild::task::DynTask>> =
        vec![Box::new(TouchFileTask { id: "touchA".into(), path: "/a.js".into(), runs: runs.clone() })];
    let descriptor = ProjectDescriptor {
        metadata: metadata("reject.app", "library"),
        is_root: true,
        tasks,
        sources: project.sources().unwrap(),
    };

    let cache_dir = tempfile::tempdir().unwrap();
    let orchestrator = BuildOrchestrator::new(CacheManager::new(cache_dir.path().to_path_buf()));

    let params = BuildToTargetParams {
        dest_path: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
        dependency_includes: Some(vec!["x".into()]),
        included_dependencies: Some(vec!["y".into()]),
        ..BuildToTargetParams::default()
    };

    let result = orchestrator.build_to_target(params, &[descriptor], &registry());
    assert!(result.is_err());
    assert!(runs.lock().unwrap().is_empty(), "no task should have run before the conflicting options were rejected");
}

#[test]
fn build_manifest_option_is_rejected_for_application_projects() {
    let project = TempProject::new().unwrap();
    project.write_file("a.js", b"const a = 1;").unwrap();

    let runs = Arc::new(Mutex::new(Vec::new()));
    let tasks: Vec<Box<dyn layerbuild::task::DynTask>> =
        vec![Box::new(TouchFileTask { id: "touchA".into(), path: "/a.js".into(), runs })];
    let descriptor = ProjectDescriptor {
        metadata: metadata("manifest.app", "application"),
        is_root: true,
        tasks,
        sources: project.sources().unwrap(),
    };

    let registry = StaticTaskRegistry::new()
        .with_tasks("application", vec!["touchA".into()])
        .with_version("layerbuild", "0.1.0");

    let cache_dir = tempfile::tempdir().unwrap();
    let orchestrator = BuildOrchestrator::new(CacheManager::new(cache_dir.path().to_path_buf()));
    let params = BuildToTargetParams {
        dest_path: Some(tempfile::tempdir().unwrap().path().to_path_buf()),
        build_config: BuildConfig::new().create_build_manifest(true),
        ..BuildToTargetParams::default()
    };

    let result = orchestrator.build_to_target(params, &[descriptor], &registry);
    assert!(result.is_err());
}

#[test]
fn multi_project_dependency_order_builds_leaves_before_dependents() -> Result<()> {
    let lib_project = TempProject::new()?;
    lib_project.write_file("lib.js", b"export const x = 1;")?;
    let app_project = TempProject::new()?;
    app_project.write_file("app.js", b"import { x } from 'lib';")?;

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_for_lib = order.clone();
    let order_for_app = order.clone();

    struct RecordOrderTask {
        id: String,
        path: String,
        order: Arc<Mutex<Vec<String>>>,
    }
    impl Task for RecordOrderTask {
        type Config = String;
        fn id(&self) -> &str {
            &self.id
        }
        fn config(&self) -> &String {
            &self.path
        }
        fn run(&self, ctx: TaskContext<'_>) -> Result<()> {
            self.order.lock().unwrap().push(ctx.task_util.is_root_project().to_string());
            if let Some(resource) = ctx.workspace.by_path(&self.path)? {
                ctx.workspace.write(resource)?;
            }
            Ok(())
        }
    }

    let lib_tasks: Vec<Box<dyn layerbuild::task::DynTask>> = vec![Box::new(RecordOrderTask {
        id: "touch".into(),
        path: "/lib.js".into(),
        order: order_for_lib,
    })];
    let app_tasks: Vec<Box<dyn layerbuild::task::DynTask>> = vec![Box::new(RecordOrderTask {
        id: "touch".into(),
        path: "/app.js".into(),
        order: order_for_app,
    })];

    let mut lib_metadata = metadata("dep.lib", "library");
    lib_metadata.dependencies = Vec::new();
    let mut app_metadata = metadata("dep.app", "application");
    app_metadata.dependencies = vec!["dep.lib".into()];

    let projects = vec![
        ProjectDescriptor { metadata: app_metadata, is_root: true, tasks: app_tasks, sources: app_project.sources()? },
        ProjectDescriptor { metadata: lib_metadata, is_root: false, tasks: lib_tasks, sources: lib_project.sources()? },
    ];

    let registry = StaticTaskRegistry::new()
        .with_tasks("application", vec!["touch".into()])
        .with_tasks("library", vec!["touch".into()])
        .with_version("layerbuild", "0.1.0");

    let cache_dir = tempfile::tempdir().unwrap();
    let dest = tempfile::tempdir().unwrap();
    let orchestrator = BuildOrchestrator::new(CacheManager::new(cache_dir.path().to_path_buf()));
    let params = BuildToTargetParams { dest_path: Some(dest.path().to_path_buf()), ..BuildToTargetParams::default() };

    let report = orchestrator.build_to_target(params, &projects, &registry)?;
    assert_eq!(report.built, vec!["dep.lib".to_string(), "dep.app".to_string()]);
    Ok(())
}
