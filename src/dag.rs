//! The resource-request DAG (component B, §4.2): a tree of nodes, each
//! storing only the *delta* of requests relative to its parent, so that
//! semantically-overlapping request sets recorded by different task runs
//! share storage and can be looked up by subset/superset relationship.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{BuildEngineError, Result};
use crate::vfs::monitor::{Request, RequestSet};

pub type NodeId = u64;

/// One node in the request DAG. `added_requests` is the delta relative to
/// `parent`; `materialized(self) = union(added_requests along root..=self)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub added_requests: BTreeSet<Request>,
    pub metadata: serde_json::Value,
}

/// The resource-request DAG for one project build context.
///
/// Invariant (checked by every mutating operation): for a non-root node `N`
/// with parent `P`, `materialized(P)` is a proper subset of `materialized(N)`
/// and `added_requests(N) = materialized(N) \ materialized(P)`.
#[derive(Debug, Default)]
pub struct RequestDag {
    nodes: HashMap<NodeId, DagNode>,
    roots: Vec<NodeId>,
    next_id: NodeId,
    materialized_cache: std::cell::RefCell<HashMap<NodeId, RequestSet>>,
}

/// Wire format for [`RequestDag::to_cache_object`]/[`RequestDag::from_cache`].
#[derive(Debug, Serialize, Deserialize)]
pub struct DagCacheObject {
    pub nodes: Vec<DagNode>,
    pub next_id: NodeId,
}

impl RequestDag {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), roots: Vec::new(), next_id: 1, materialized_cache: Default::default() }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&DagNode> {
        self.nodes.get(&id)
    }

    /// Union of `added_requests` from the root down to `id`. Cached per node;
    /// the cache is keyed by id and never stale today because nodes are
    /// append-only (mutation would need to invalidate this cache, per §4.2).
    pub fn materialized(&self, id: NodeId) -> RequestSet {
        if let Some(cached) = self.materialized_cache.borrow().get(&id) {
            return cached.clone();
        }
        let node = match self.nodes.get(&id) {
            Some(n) => n,
            None => return RequestSet::new(),
        };
        let mut set = match node.parent {
            Some(parent_id) => self.materialized(parent_id),
            None => RequestSet::new(),
        };
        set.extend(node.added_requests.iter().cloned());
        self.materialized_cache.borrow_mut().insert(id, set.clone());
        set
    }

    /// Returns the node whose materialized set equals `requests` exactly, if
    /// any.
    pub fn find_exact_match(&self, requests: &RequestSet) -> Option<NodeId> {
        self.nodes.keys().copied().find(|&id| &self.materialized(id) == requests)
    }

    /// Returns the node whose materialized set is a subset of `requests` and
    /// of maximum cardinality, breaking ties by smallest id.
    pub fn find_best_parent(&self, requests: &RequestSet) -> Option<NodeId> {
        let mut best: Option<(NodeId, usize)> = None;
        for &id in self.nodes.keys() {
            let materialized = self.materialized(id);
            if !materialized.is_subset(requests) {
                continue;
            }
            let size = materialized.len();
            best = match best {
                Some((best_id, best_size)) if best_size > size || (best_size == size && best_id < id) => {
                    Some((best_id, best_size))
                }
                _ => Some((id, size)),
            };
        }
        best.map(|(id, _)| id)
    }

    /// Adds a new node for `requests`, parented under the best existing
    /// match (or as a new root if none subsets it). Does not deduplicate —
    /// callers wanting to avoid inserting a duplicate should call
    /// [`RequestDag::find_exact_match`] first.
    pub fn add_request_set(&mut self, requests: RequestSet, metadata: serde_json::Value) -> NodeId {
        let parent = self.find_best_parent(&requests);
        let parent_materialized = match parent {
            Some(id) => self.materialized(id),
            None => RequestSet::new(),
        };
        let added_requests: BTreeSet<Request> =
            requests.difference(&parent_materialized).cloned().collect();

        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, DagNode { id, parent, added_requests, metadata });
        if parent.is_none() {
            self.roots.push(id);
        }
        id
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> =
            self.nodes.values().filter(|n| n.parent == Some(id)).map(|n| n.id).collect();
        children.sort_unstable();
        children
    }

    /// Breadth-first `(id, depth, parent)` over the whole forest, roots
    /// first at depth 0, in non-decreasing depth order.
    pub fn traverse_by_depth(&self) -> Vec<(NodeId, usize, Option<NodeId>)> {
        let mut roots = self.roots.clone();
        roots.sort_unstable();
        let mut out = Vec::new();
        let mut queue: VecDeque<(NodeId, usize, Option<NodeId>)> =
            roots.into_iter().map(|id| (id, 0, None)).collect();
        while let Some((id, depth, parent)) = queue.pop_front() {
            out.push((id, depth, parent));
            for child in self.children(id) {
                queue.push_back((child, depth + 1, Some(id)));
            }
        }
        out
    }

    /// Breadth-first traversal restricted to the subtree rooted at `root_id`,
    /// `root_id` itself at depth 0.
    pub fn traverse_subtree(&self, root_id: NodeId) -> Vec<(NodeId, usize, Option<NodeId>)> {
        if !self.nodes.contains_key(&root_id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut queue: VecDeque<(NodeId, usize, Option<NodeId>)> = VecDeque::new();
        queue.push_back((root_id, 0, self.nodes[&root_id].parent));
        while let Some((id, depth, parent)) = queue.pop_front() {
            out.push((id, depth, parent));
            for child in self.children(id) {
                queue.push_back((child, depth + 1, Some(id)));
            }
        }
        out
    }

    pub fn to_cache_object(&self) -> DagCacheObject {
        let mut nodes: Vec<DagNode> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        DagCacheObject { nodes, next_id: self.next_id }
    }

    pub fn from_cache(object: DagCacheObject) -> Result<Self> {
        if object.nodes.iter().any(|n| n.id >= object.next_id) {
            return Err(BuildEngineError::cache_corruption(
                "unknown",
                format!(
                    "dag next_id {} does not exceed the highest stored node id",
                    object.next_id
                ),
            ));
        }

        let mut dag = Self::new();
        dag.next_id = object.next_id;
        for node in &object.nodes {
            if let Some(parent) = node.parent {
                if !object.nodes.iter().any(|n| n.id == parent) {
                    return Err(BuildEngineError::cache_corruption(
                        "unknown",
                        format!("dag node {} references missing parent {parent}", node.id),
                    ));
                }
            } else {
                dag.roots.push(node.id);
            }
        }
        for node in object.nodes {
            dag.nodes.insert(node.id, node);
        }
        Ok(dag)
    }

    pub fn average_requests_per_node(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let total: usize = self.nodes.keys().map(|&id| self.materialized(id).len()).sum();
        total as f64 / self.nodes.len() as f64
    }

    pub fn average_stored_delta_size(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let total: usize = self.nodes.values().map(|n| n.added_requests.len()).sum();
        total as f64 / self.nodes.len() as f64
    }

    pub fn max_depth(&self) -> usize {
        self.traverse_by_depth().into_iter().map(|(_, depth, _)| depth).max().unwrap_or(0)
    }

    /// `sum(|delta|) / sum(|materialized|)`; lower means the DAG is sharing
    /// more storage across nodes.
    pub fn compression_ratio(&self) -> f64 {
        let delta_total: usize = self.nodes.values().map(|n| n.added_requests.len()).sum();
        let materialized_total: usize = self.nodes.keys().map(|&id| self.materialized(id).len()).sum();
        if materialized_total == 0 {
            return 0.0;
        }
        delta_total as f64 / materialized_total as f64
    }
}
