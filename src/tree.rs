//! In-memory namespace of groups and commands.
//!
//! Nodes live in an arena owned by [`Tree`]; parents own their children
//! through the arena ids stored in `children`, and the `parent` field is only
//! a back-link used for `..` and for computing full paths.

use crate::command::CommandRef;
use crate::path::NamePath;
use crate::registry::{CommandRegistry, RegistryEvent, Subscription};
use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use thiserror::Error;

/// Structural errors. Duplicate and not-a-group errors indicate broken
/// registration and are never silently ignored by [`Tree::add`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("path already exists: {0}")]
    DuplicatePath(String),
    #[error("not a group: {0}")]
    NotAGroup(String),
    #[error("no such node: {0}")]
    NotFound(String),
    #[error("path has no name: {0}")]
    EmptyPath(String),
    #[error("path escapes the root: {0}")]
    OutsideRoot(String),
    #[error("the root group cannot be removed")]
    RootImmutable,
}

/// Index of a node in the arena.
///
/// Ids of removed nodes are reused, so an id is only meaningful while the
/// tree is not mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node stands for.
#[derive(Debug, Clone)]
pub enum Payload {
    Group,
    Command(CommandRef),
}

#[derive(Debug)]
pub struct Node {
    name: String,
    payload: Payload,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    /// Created only to hold a deeper registration; pruned once empty.
    implicit: bool,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_group(&self) -> bool {
        matches!(self.payload, Payload::Group)
    }

    pub fn command(&self) -> Option<&CommandRef> {
        match &self.payload {
            Payload::Command(c) => Some(c),
            Payload::Group => None,
        }
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.children.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

const ROOT: NodeId = NodeId(0);

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree holding only the root group.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                name: String::new(),
                payload: Payload::Group,
                parent: None,
                children: BTreeMap::new(),
                implicit: false,
            })],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.node(ROOT).is_none_or(|root| root.children.is_empty())
    }

    /// Look up one name relative to `from`.
    ///
    /// `/` is the root, `.` is `from` itself and `..` its parent (the root
    /// is its own parent). Anything else is a child name.
    pub fn get(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let node = self.node(from)?;
        match name {
            "/" => Some(ROOT),
            "." => Some(from),
            ".." => Some(node.parent.unwrap_or(from)),
            _ => node.children.get(name).copied(),
        }
    }

    /// Walk `path` from `from`, one [`Tree::get`] per segment.
    ///
    /// Absolute paths start at the root. `None` means "not here" and is not
    /// an error.
    pub fn find(&self, from: NodeId, path: &NamePath) -> Option<NodeId> {
        let start = if path.is_absolute() { ROOT } else { from };
        self.node(start)?;
        path.segments()
            .iter()
            .try_fold(start, |cur, segment| self.get(cur, segment))
    }

    /// Parse `path` and [`Tree::find`] it.
    pub fn find_str(&self, from: NodeId, path: &str) -> Option<NodeId> {
        self.find(from, &NamePath::parse(path).ok()?)
    }

    /// Absolute path of `id`, e.g. `/tool/build`.
    pub fn full_path(&self, id: NodeId) -> NamePath {
        let mut names = Vec::new();
        let mut cur = self.node(id);
        while let Some(node) = cur {
            match node.parent {
                Some(parent) => {
                    names.push(node.name.as_str());
                    cur = self.node(parent);
                }
                None => break,
            }
        }
        names
            .iter()
            .rev()
            .fold(NamePath::root(), |path, name| path.child(*name))
    }

    /// Insert `payload` at `path`, creating missing intermediate groups.
    ///
    /// Relative paths are taken from the root. On error the tree is left
    /// untouched.
    pub fn add(&mut self, path: &NamePath, payload: Payload) -> Result<NodeId, TreeError> {
        let path = absolute(path)?;
        let (leaf, parents) = path
            .segments()
            .split_last()
            .ok_or_else(|| TreeError::EmptyPath(path.to_string()))?;

        // Check everything before mutating.
        let mut cur = ROOT;
        let mut missing_from = None;
        for (i, segment) in parents.iter().enumerate() {
            match self.get(cur, segment) {
                Some(child) => {
                    if !self.node(child).is_some_and(Node::is_group) {
                        return Err(TreeError::NotAGroup(self.full_path(child).to_string()));
                    }
                    cur = child;
                }
                None => {
                    missing_from = Some(i);
                    break;
                }
            }
        }
        if missing_from.is_none() && self.get(cur, leaf).is_some() {
            return Err(TreeError::DuplicatePath(path.to_string()));
        }

        if let Some(start) = missing_from {
            for segment in &parents[start..] {
                cur = self.attach(cur, segment, Payload::Group, true);
            }
        }
        let id = self.attach(cur, leaf, payload, false);
        trace!("tree: added {path}");
        Ok(id)
    }

    /// Detach the node at `path` from its parent and drop its subtree.
    ///
    /// Implicit groups left empty by the removal are pruned as well.
    pub fn remove(&mut self, path: &NamePath) -> Result<Payload, TreeError> {
        let path = absolute(path)?;
        let id = self
            .find(ROOT, &path)
            .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        if id == ROOT {
            return Err(TreeError::RootImmutable);
        }

        let payload = self.detach(id);
        trace!("tree: removed {path}");
        Ok(payload)
    }

    fn attach(&mut self, parent: NodeId, name: &str, payload: Payload, implicit: bool) -> NodeId {
        let node = Node {
            name: name.to_string(),
            payload,
            parent: Some(parent),
            children: BTreeMap::new(),
            implicit,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.insert(name.to_string(), id);
        }
        id
    }

    /// Unlink `id` from its parent's children, free its subtree and prune
    /// empty implicit ancestors. Returns the payload of `id`.
    fn detach(&mut self, id: NodeId) -> Payload {
        let mut parent = None;
        if let Some(node) = self.node(id) {
            parent = node.parent;
            let name = node.name.clone();
            if let Some(p) = parent.and_then(|p| self.node_mut(p)) {
                p.children.remove(&name);
            }
        }

        let mut payload = Payload::Group;
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(cur.0).and_then(Option::take) {
                stack.extend(node.children.values().copied());
                if cur == id {
                    payload = node.payload;
                }
                self.free.push(cur);
            }
        }

        while let Some(p) = parent {
            let prunable = p != ROOT
                && self
                    .node(p)
                    .is_some_and(|n| n.implicit && n.children.is_empty());
            if !prunable {
                break;
            }
            parent = self.node(p).and_then(|n| n.parent);
            let name = self.node(p).map(|n| n.name.clone()).unwrap_or_default();
            if let Some(pp) = parent.and_then(|pp| self.node_mut(pp)) {
                pp.children.remove(&name);
            }
            self.nodes[p.0] = None;
            self.free.push(p);
        }

        payload
    }
}

fn absolute(path: &NamePath) -> Result<NamePath, TreeError> {
    let path = NamePath::root().join(path).normalize();
    if path.first() == Some("..") {
        return Err(TreeError::OutsideRoot(path.to_string()));
    }
    Ok(path)
}

/// The process-wide tree, kept in sync with a [`CommandRegistry`].
///
/// Registry events are queued per subscriber and applied under the tree's
/// write lock in publish order, so readers never see a half-applied
/// registration.
pub struct Namespace {
    tree: RwLock<Tree>,
    events: Mutex<Subscription>,
}

impl Namespace {
    /// Subscribe to `registry` and mirror its contents.
    pub fn attach(registry: &CommandRegistry) -> Self {
        let namespace = Self {
            tree: RwLock::new(Tree::new()),
            events: Mutex::new(registry.subscribe()),
        };
        namespace.sync();
        namespace
    }

    /// Apply every pending registry event.
    pub fn sync(&self) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(first) = events.try_next() else {
            return;
        };
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut tree, first);
        while let Some(event) = events.try_next() {
            apply(&mut tree, event);
        }
    }

    /// Read access to an up-to-date tree.
    pub fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.sync();
        self.tree.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Apply one event. Replays are harmless: re-adding the same descriptor or
/// removing a missing path is logged and skipped.
fn apply(tree: &mut Tree, event: RegistryEvent) {
    match event {
        RegistryEvent::CommandRegistered(descriptor) => {
            let path = descriptor.name().clone();
            if let Some(existing) = tree.find(tree.root(), &path).and_then(|id| tree.node(id)) {
                if existing.command().is_some_and(|c| Arc::ptr_eq(c, &descriptor)) {
                    debug!("namespace: {path} already present");
                    return;
                }
            }
            if let Err(err) = tree.add(&path, Payload::Command(descriptor)) {
                warn!("namespace: cannot add {path}: {err}");
            }
        }
        RegistryEvent::CommandRemoved(path) => match tree.remove(&path) {
            Ok(_) => {}
            Err(TreeError::NotFound(_)) => debug!("namespace: {path} already gone"),
            Err(err) => warn!("namespace: cannot remove {path}: {err}"),
        },
    }
}
