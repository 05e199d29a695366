//! A reader that can be installed (or uninstalled) after reads against it
//! have already been issued (§4.1). Used by the `serve()` watch-mode
//! orchestrator to swap in a freshly rebuilt reader while older reads are
//! still in flight.
//!
//! The engine core is synchronous (see `SPEC_FULL.md` §10), so "queued
//! pending reads resolved once a reader is installed" is implemented as a
//! blocking wait rather than a future: a thread calling `by_path`/`by_glob`
//! while no reader is installed blocks until [`SwitchReader::set_reader`] is
//! called from another thread. Ordering between multiple blocked readers is
//! best-effort (`Condvar` wake order is not a FIFO guarantee in `std`); see
//! `DESIGN.md`.

use std::sync::{Condvar, Mutex};

use crate::error::Result;
use crate::vfs::reader::{GlobOptions, Reader};
use crate::vfs::resource::Resource;

struct SwitchState {
    inner: Option<Box<dyn Reader>>,
}

pub struct SwitchReader {
    state: Mutex<SwitchState>,
    installed: Condvar,
}

impl SwitchReader {
    pub fn new(initial: Option<Box<dyn Reader>>) -> Self {
        Self { state: Mutex::new(SwitchState { inner: initial }), installed: Condvar::new() }
    }

    /// Installs a reader, waking any reads blocked waiting for one.
    pub fn set_reader(&self, reader: Box<dyn Reader>) {
        let mut state = self.state.lock().unwrap();
        state.inner = Some(reader);
        self.installed.notify_all();
    }

    /// Removes the installed reader; subsequent reads queue again.
    pub fn unset_reader(&self) {
        self.state.lock().unwrap().inner = None;
    }

    pub fn has_reader(&self) -> bool {
        self.state.lock().unwrap().inner.is_some()
    }

    fn wait_for_reader(&self) -> std::sync::MutexGuard<'_, SwitchState> {
        let guard = self.state.lock().unwrap();
        self.installed.wait_while(guard, |s| s.inner.is_none()).unwrap()
    }
}

impl Reader for SwitchReader {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        let guard = self.wait_for_reader();
        let reader = guard.inner.as_ref().expect("wait_for_reader guarantees Some");
        reader.by_path(path)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        let guard = self.wait_for_reader();
        let reader = guard.inner.as_ref().expect("wait_for_reader guarantees Some");
        reader.by_glob(pattern, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::reader::MemoryReader;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn read_issued_before_install_resolves_once_a_reader_is_set() {
        let switch = Arc::new(SwitchReader::new(None));
        let reader_thread = {
            let switch = switch.clone();
            thread::spawn(move || switch.by_path("/a.js").unwrap())
        };

        thread::sleep(Duration::from_millis(20));
        let mut source = MemoryReader::new();
        source.insert(Resource::new("/a.js", b"hi".to_vec()));
        switch.set_reader(Box::new(source));

        let resource = reader_thread.join().unwrap();
        assert_eq!(resource.unwrap().bytes(), b"hi");
    }

    #[test]
    fn unset_reader_causes_subsequent_reads_to_queue_again() {
        let mut source = MemoryReader::new();
        source.insert(Resource::new("/a.js", b"hi".to_vec()));
        let switch = SwitchReader::new(Some(Box::new(source)));
        assert!(switch.has_reader());
        switch.unset_reader();
        assert!(!switch.has_reader());
    }
}
