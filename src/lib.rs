//! `layerbuild`: an incremental build engine for multi-project trees.
//!
//! Five components compose the system end to end:
//!
//! - [`vfs`] — a layered virtual filesystem: readers and writers compose
//!   into a project's logical source tree plus per-stage overlays.
//! - [`dag`] — a resource-request DAG recording, for each task run, the
//!   exact set of paths and glob patterns it asked for, deduplicated by
//!   storing only the delta relative to the closest existing node.
//! - [`cache`] — the stage & cache manager: persists task output overlays
//!   and the request DAG to disk, keyed by a deterministic build signature.
//! - [`project`] — the project build context and driver: walks a project's
//!   dependency graph leaves-first and drives each project's tasks through
//!   the cache manager.
//! - [`orchestrator`] — the top-level entry point: composes the project
//!   list, runs the driver, and writes final results to disk (or an
//!   in-memory overlay, for `serve`-style watch builds).
//!
//! Logging is never printed directly; every component emits `tracing`
//! events scoped with project/task/stage fields, bridged onto the
//! process-global [`events`] bus for non-Rust consumers.

#![warn(rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod error;

pub mod vfs;

pub mod dag;

pub mod filter;

pub mod signature;

pub mod cache;

pub mod task;

pub mod project;

pub mod orchestrator;

pub mod events;

mod utils;

#[cfg(feature = "project-util")]
pub mod project_util;

pub use cache::CacheManager;
pub use dag::RequestDag;
pub use error::{BuildEngineError, Result};
pub use orchestrator::{
    BuildConfig, BuildOrchestrator, BuildReport, BuildToTargetParams, OutputStyle, ProjectDescriptor,
};
pub use project::driver::ProjectDriver;
pub use project::{ProjectBuildContext, ProjectMetadata};
pub use signature::BuildSignature;
pub use task::{Task, TaskContext, TaskRegistry, TaskUtil};
