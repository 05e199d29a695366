//! The process-global event bus (§6): `ui5.log`, `ui5.build-metadata`,
//! `ui5.project-build-metadata`, `ui5.build-status`, `ui5.project-build-status`.
//!
//! Consumers (a CLI, a watch-mode UI) subscribe without this crate depending
//! on them; signal notification is likewise a narrow entry point the host
//! process drives (see `DESIGN.md` for why this crate does not itself link a
//! signal-handling crate).

use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::Level;

/// Severity mirrored onto the `ui5.log` bus alongside each tracing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for Severity {
    fn from(level: Level) -> Self {
        match level {
            Level::TRACE => Severity::Trace,
            Level::DEBUG => Severity::Debug,
            Level::INFO => Severity::Info,
            Level::WARN => Severity::Warn,
            Level::ERROR => Severity::Error,
        }
    }
}

/// One of the five process-global event kinds (§6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum Event {
    Log { severity: Severity, message: String },
    BuildMetadata { versions: std::collections::BTreeMap<String, String> },
    ProjectBuildMetadata { project: String, project_type: String },
    BuildStatus { status: String },
    ProjectBuildStatus { project: String, task: Option<String>, status: String },
}

type Listener = Box<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct EventBus {
    listeners: Mutex<Vec<Listener>>,
}

static BUS: Lazy<EventBus> = Lazy::new(EventBus::default);

fn bus() -> &'static EventBus {
    &BUS
}

/// Registers a listener invoked on every emitted event, for the lifetime of
/// the process. There is no unsubscribe: event consumers in this system are
/// long-lived (a CLI process, a watch-mode server), not per-build.
pub fn subscribe(listener: impl Fn(&Event) + Send + Sync + 'static) {
    bus().listeners.lock().unwrap().push(Box::new(listener));
}

pub fn emit(event: Event) {
    for listener in bus().listeners.lock().unwrap().iter() {
        listener(&event);
    }
}

/// Bridges a `tracing` event onto the `ui5.log` bus, so non-Rust consumers
/// can observe engine logging without linking against `tracing` themselves.
pub fn emit_log(level: Level, message: impl Into<String>) {
    emit(Event::Log { severity: level.into(), message: message.into() });
}

/// Signals the driver's own entry points translate OS signals into (§4.4,
/// §6). The host process is responsible for registering actual OS signal
/// handlers and calling [`ProjectDriver::notify_signal`] — this crate does
/// not register OS-level handlers itself.
///
/// [`ProjectDriver::notify_signal`]: crate::project::driver::ProjectDriver::notify_signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hup,
    Int,
    Term,
    Break,
}

/// Reference-counts how many active driver runs care about signals, so the
/// host only needs to register its OS handlers once regardless of how many
/// concurrent `ProjectDriver`s exist in-process.
pub struct SignalRefCount {
    count: std::sync::atomic::AtomicUsize,
}

impl SignalRefCount {
    pub const fn new() -> Self {
        Self { count: std::sync::atomic::AtomicUsize::new(0) }
    }

    /// Returns `true` if this was the first registration (the host should
    /// install its OS handlers now).
    pub fn register(&self) -> bool {
        self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0
    }

    /// Returns `true` if this was the last deregistration (the host may tear
    /// its OS handlers down now).
    pub fn deregister(&self) -> bool {
        self.count.fetch_sub(1, std::sync::atomic::Ordering::SeqCst) == 1
    }
}

impl Default for SignalRefCount {
    fn default() -> Self {
        Self::new()
    }
}

pub static SIGNAL_REFS: SignalRefCount = SignalRefCount::new();

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn subscribers_receive_emitted_events() {
        let received: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_for_listener = received.clone();
        subscribe(move |event| {
            if let Event::BuildStatus { status } = event {
                received_for_listener.lock().unwrap().push(status.clone());
            }
        });

        emit(Event::BuildStatus { status: "ok".into() });
        assert!(received.lock().unwrap().contains(&"ok".to_string()));
    }

    #[test]
    fn signal_ref_count_reports_first_and_last() {
        let refs = SignalRefCount::new();
        assert!(refs.register());
        assert!(!refs.register());
        assert!(!refs.deregister());
        assert!(refs.deregister());
    }
}
