//! Layered virtual filesystem (component A): composable readers and writers
//! exposing a project's sources plus per-stage overlays as a single logical
//! tree, with monitoring wrappers recording every read and write.

pub mod monitor;
pub mod proxy;
pub mod reader;
pub mod resource;
pub mod switch;
pub mod writer;

pub use monitor::{MonitoredReaderWriter, Request, RequestSet};
pub use proxy::ProxyReader;
pub use reader::{GlobOptions, MemoryReader, Reader, ReaderCollection};
pub use resource::{Resource, ResourceFacade, Tag, TagSet};
pub use switch::SwitchReader;
pub use writer::{MemoryWriter, Workspace, Writer};

/// A reader that also accepts writes, object-safe so a task can be handed
/// either a plain [`Workspace`] or a [`MonitoredReaderWriter`] wrapping one
/// through the same `&mut dyn ReaderWriter` parameter (§6 "Task contract").
pub trait ReaderWriter: Reader + Writer {}

impl<T: Reader + Writer> ReaderWriter for T {}

/// Projection style a reader is requested in (§4.1). Orthogonal to overlay
/// composition: it only changes how a project's *source* reader maps paths,
/// not how stage overlays are layered on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// `/resources/<namespace>/` or `/test-resources/<namespace>/` prefix.
    BuildTime,
    /// Matches the runtime layout; no build-excludes applied.
    Dist,
    /// Same prefix as `BuildTime`; build-excludes are not applied.
    Runtime,
    /// Namespace prefix stripped entirely.
    Flat,
}
