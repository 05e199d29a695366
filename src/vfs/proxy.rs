//! A reader built from callbacks rather than owned storage (§4.1), used to
//! expose computed or externally-owned resources (e.g. a task's in-memory
//! intermediate output) through the same `Reader` contract as a filesystem
//! tree.

use crate::error::Result;
use crate::vfs::reader::{GlobOptions, Reader};
use crate::vfs::resource::Resource;

type GetResource = Box<dyn Fn(&str) -> Result<Option<Resource>> + Send + Sync>;
type ListResourcePaths = Box<dyn Fn() -> Result<Vec<String>> + Send + Sync>;

/// Reader whose contents are produced by two injected closures. `by_glob` is
/// implemented by matching the glob pattern against the paths the injected
/// `list_resource_paths` closure returns (dotfiles included), then resolving
/// each match through `get_resource`.
///
/// The original implementation this is modeled on called
/// `this._listResourcePaths()` from within `_listResourcePaths` itself —
/// almost certainly a copy-paste bug that would recurse forever. This reader
/// always calls the *injected* closure, never itself.
pub struct ProxyReader {
    get_resource: GetResource,
    list_resource_paths: ListResourcePaths,
}

impl ProxyReader {
    pub fn new(
        get_resource: impl Fn(&str) -> Result<Option<Resource>> + Send + Sync + 'static,
        list_resource_paths: impl Fn() -> Result<Vec<String>> + Send + Sync + 'static,
    ) -> Self {
        Self { get_resource: Box::new(get_resource), list_resource_paths: Box::new(list_resource_paths) }
    }
}

impl Reader for ProxyReader {
    fn by_path(&self, path: &str) -> Result<Option<Resource>> {
        (self.get_resource)(path)
    }

    fn by_glob(&self, pattern: &str, options: GlobOptions) -> Result<Vec<Resource>> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| crate::error::BuildEngineError::invalid_argument(e.to_string()))?;
        let paths = (self.list_resource_paths)()?;
        let mut out = Vec::new();
        for path in paths {
            if options.nodir && path.ends_with('/') {
                continue;
            }
            if matcher.matches(&path) {
                if let Some(resource) = (self.get_resource)(&path)? {
                    out.push(resource);
                }
            }
        }
        out.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[test]
    fn glob_resolves_through_injected_callbacks_without_self_recursion() {
        let store: Mutex<HashMap<String, Vec<u8>>> = Mutex::new(
            [("/a.js".to_string(), b"a".to_vec()), ("/b.txt".to_string(), b"b".to_vec())]
                .into_iter()
                .collect(),
        );
        let store_for_get = std::sync::Arc::new(store);
        let store_for_list = store_for_get.clone();

        let reader = ProxyReader::new(
            move |path| {
                Ok(store_for_get
                    .lock()
                    .unwrap()
                    .get(path)
                    .map(|bytes| Resource::new(path, bytes.clone())))
            },
            move || Ok(store_for_list.lock().unwrap().keys().cloned().collect()),
        );

        let hits = reader.by_glob("/*.js", GlobOptions::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path(), "/a.js");
    }
}
