//! Directory nodes and path resolution over the tree.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use super::Shared;
use super::cell::ContentCell;
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::types::{Attributes, Entry, FileMode};

/// Name of the self entry every directory carries.
pub(crate) const DOT: &str = ".";

/// Identifier of a directory node, unique within one tree.
pub(crate) type DirId = u64;

/// A child of a directory.
#[derive(Clone)]
pub(crate) enum Node {
    Dir(Arc<DirNode>),
    File(Arc<ContentCell>),
}

impl Node {
    pub(crate) fn entry(&self) -> Entry {
        match self {
            Node::Dir(dir) => dir.entry(),
            Node::File(cell) => cell.entry(),
        }
    }
}

/// One directory: its metadata and its children, ordered by name.
pub(crate) struct DirNode {
    id: DirId,
    entry: RwLock<Entry>,
    children: RwLock<BTreeMap<String, Node>>,
}

impl DirNode {
    /// Build a directory with its `.` cell and register it in the lookup table.
    pub(crate) fn new(shared: &Shared, entry: Entry) -> Arc<Self> {
        let id = entry.attributes().inode();
        let dot = ContentCell::dot(id, entry.clone());
        let mut children = BTreeMap::new();
        children.insert(DOT.to_string(), Node::File(Arc::new(dot)));

        let node = Arc::new(Self {
            id,
            entry: RwLock::new(entry),
            children: RwLock::new(children),
        });
        shared.dirs.register(&node);
        tracing::trace!(id, path = node.entry.read().path(), "new directory node");
        node
    }

    pub(crate) fn id(&self) -> DirId {
        self.id
    }

    pub(crate) fn entry(&self) -> Entry {
        self.entry.read().clone()
    }

    pub(crate) fn path(&self) -> String {
        self.entry.read().path().to_string()
    }

    pub(crate) fn child(&self, name: &str) -> Option<Node> {
        self.children.read().get(name).cloned()
    }

    /// The `.` cell wrapping this directory.
    pub(crate) fn dot(&self) -> VfsResult<Arc<ContentCell>> {
        match self.child(DOT) {
            Some(Node::File(cell)) => Ok(cell),
            Some(Node::Dir(_)) => Err(VfsError::InvalidEntryType(path::join(&self.path(), DOT))),
            None => Err(VfsError::not_found(path::join(&self.path(), DOT))),
        }
    }

    /// Child names present right now, excluding `.`.
    pub(crate) fn child_names(&self) -> Vec<String> {
        self.children
            .read()
            .keys()
            .filter(|name| name.as_str() != DOT)
            .cloned()
            .collect()
    }

    /// Insert a child built by `make`, failing if `name` is taken.
    ///
    /// The check and the insert happen under one write lock.
    pub(crate) fn insert_with(
        &self,
        name: &str,
        make: impl FnOnce() -> VfsResult<Node>,
    ) -> VfsResult<Node> {
        let mut children = self.children.write();
        if children.contains_key(name) {
            return Err(VfsError::already_exists(path::join(&self.entry.read().path(), name)));
        }
        let node = make()?;
        children.insert(name.to_string(), node.clone());
        Ok(node)
    }

    /// Return the child at `name`, inserting one built by `make` if absent.
    pub(crate) fn get_or_insert_with(
        &self,
        name: &str,
        make: impl FnOnce() -> VfsResult<Node>,
    ) -> VfsResult<Node> {
        if let Some(node) = self.child(name) {
            return Ok(node);
        }
        let mut children = self.children.write();
        if let Some(node) = children.get(name) {
            return Ok(node.clone());
        }
        let node = make()?;
        children.insert(name.to_string(), node.clone());
        Ok(node)
    }

    /// Set the modification time to now. The clock is read under the lock.
    pub(crate) fn touch(&self) -> VfsResult<()> {
        let mut entry = self.entry.write();
        entry.set_mod_time(SystemTime::now())
    }
}

/// Non-owning lookup from directory id to node.
#[derive(Default)]
pub(crate) struct DirTable {
    nodes: DashMap<DirId, Weak<DirNode>>,
}

impl DirTable {
    fn register(&self, node: &Arc<DirNode>) {
        self.nodes.insert(node.id, Arc::downgrade(node));
    }

    pub(crate) fn lookup(&self, id: DirId) -> Option<Arc<DirNode>> {
        let weak = self.nodes.get(&id).map(|slot| Weak::clone(&slot))?;
        weak.upgrade()
    }
}

/// Find the node at `path` below `root`. `"."` segments stay put.
pub(crate) fn resolve(shared: &Shared, root: &Arc<DirNode>, path: &str) -> VfsResult<Node> {
    let segments = shared.rules.split(path)?;
    let mut current = Arc::clone(root);
    let mut remaining = segments.into_iter().filter(|s| *s != DOT).peekable();
    while let Some(segment) = remaining.next() {
        let child = current
            .child(segment)
            .ok_or_else(|| VfsError::not_found(path::join(&current.path(), segment)))?;
        if remaining.peek().is_none() {
            return Ok(child);
        }
        current = match child {
            Node::Dir(dir) => dir,
            Node::File(_) => {
                return Err(VfsError::not_a_directory(path::join(&current.path(), segment)));
            }
        };
    }
    Ok(Node::Dir(current))
}

/// Resolve `path` and require a directory.
pub(crate) fn resolve_dir(
    shared: &Shared,
    root: &Arc<DirNode>,
    path: &str,
) -> VfsResult<Arc<DirNode>> {
    match resolve(shared, root, path)? {
        Node::Dir(dir) => Ok(dir),
        Node::File(cell) => Err(VfsError::not_a_directory(cell.entry().path())),
    }
}

/// Create one directory named `name` inside `parent`.
pub(crate) fn mkdir_in(
    shared: &Shared,
    parent: &DirNode,
    name: &str,
    mode: FileMode,
) -> VfsResult<Arc<DirNode>> {
    if name == DOT {
        return Err(VfsError::invalid_path(name));
    }
    let full = path::join(&parent.path(), name);
    let node = parent.insert_with(name, || {
        let attrs = Attributes::new(mode.as_dir()).with_inode(shared.next_inode());
        let entry = Entry::new(full.as_str(), attrs, &shared.rules)?;
        Ok(Node::Dir(DirNode::new(shared, entry)))
    })?;
    parent.touch()?;
    match node {
        Node::Dir(dir) => Ok(dir),
        Node::File(_) => Err(VfsError::InvalidEntryType(full)),
    }
}

/// Create the directory at `path`. Its parent must already exist.
pub(crate) fn mkdir(
    shared: &Shared,
    root: &Arc<DirNode>,
    path: &str,
    mode: FileMode,
) -> VfsResult<Arc<DirNode>> {
    if shared.rules.ends_with_dot(path) {
        return Err(VfsError::invalid_path(path));
    }
    let segments = shared.rules.split(path)?;
    let Some((name, parents)) = segments.split_last() else {
        return Err(VfsError::invalid_path(path));
    };
    let parent = if parents.is_empty() {
        Arc::clone(root)
    } else {
        resolve_dir(shared, root, &parents.join("/"))?
    };
    mkdir_in(shared, &parent, name, mode)
}

/// Create every missing directory along `path`, reusing existing ones.
pub(crate) fn mkdir_all(
    shared: &Shared,
    root: &Arc<DirNode>,
    path: &str,
    mode: FileMode,
) -> VfsResult<Arc<DirNode>> {
    let mut current = Arc::clone(root);
    for segment in shared.rules.split(path)? {
        if segment == DOT {
            continue;
        }
        current = match current.child(segment) {
            Some(Node::Dir(dir)) => dir,
            Some(Node::File(_)) => {
                return Err(VfsError::not_a_directory(path::join(&current.path(), segment)));
            }
            None => match mkdir_in(shared, &current, segment, mode) {
                Ok(dir) => dir,
                // lost a race with another creator
                Err(VfsError::AlreadyExists(_)) => match current.child(segment) {
                    Some(Node::Dir(dir)) => dir,
                    _ => {
                        return Err(VfsError::not_a_directory(path::join(
                            &current.path(),
                            segment,
                        )));
                    }
                },
                Err(e) => return Err(e),
            },
        };
    }
    Ok(current)
}
