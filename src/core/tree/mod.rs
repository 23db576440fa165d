//! Directory tree
//!
//! The namespace is an arena of [`DirectoryItem`]s addressed by [`NodeId`].
//! Parents are stored as optional ids, never as references, so nodes can
//! move between directories without dangling pointers. Removed slots are
//! recycled.
//!
//! The tree knows nothing about clusters: callers release a node's chain
//! before detaching it.

pub mod item;

pub use item::{DirectoryItem, NodeId, MAX_CHILDREN};

use crate::core::error::{FsError, Result};
use crate::core::validation::{ItemName, MAX_NAME_LEN};

/// Arena-backed directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTree {
    nodes: Vec<Option<DirectoryItem>>,
    free_slots: Vec<usize>,
    live: usize,
}

impl DirectoryTree {
    /// Create a tree holding only the root directory
    pub fn new(root_start_cluster: i32) -> Self {
        Self::with_root(DirectoryItem::new(
            ItemName::root(),
            false,
            0,
            root_start_cluster,
        ))
    }

    /// Create a tree from a decoded root item
    pub fn with_root(mut root: DirectoryItem) -> Self {
        root.parent = None;
        root.children.clear();
        DirectoryTree {
            nodes: vec![Some(root)],
            free_slots: Vec::new(),
            live: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn get(&self, id: NodeId) -> Result<&DirectoryItem> {
        self.nodes
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| FsError::NotFound(format!("node {}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut DirectoryItem> {
        self.nodes
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| FsError::NotFound(format!("node {}", id)))
    }

    /// Find an immediate child by name
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let parent = self.get(parent).ok()?;
        parent.children.iter().copied().find(|&child| {
            self.get(child)
                .map(|item| item.name() == name)
                .unwrap_or(false)
        })
    }

    /// Resolve a path to a node
    ///
    /// Absolute paths start at root, relative ones at `from`. `.` stays put,
    /// `..` climbs to the parent (NoParent at root) and any other component
    /// must name an existing child.
    pub fn resolve(&self, path: &str, from: NodeId) -> Result<NodeId> {
        let components = split_components(path)?;
        let mut current = if path.starts_with('/') {
            self.root()
        } else {
            from
        };
        self.get(current)?;

        for component in components {
            current = match component {
                "." => current,
                ".." => self.get(current)?.parent.ok_or(FsError::NoParent)?,
                name => self
                    .find_child(current, name)
                    .ok_or_else(|| FsError::NotFound(name.to_string()))?,
            };
        }

        Ok(current)
    }

    /// Insert a new item under `parent` and update the aggregate size
    pub fn add(
        &mut self,
        parent: NodeId,
        name: ItemName,
        is_file: bool,
        size: u32,
        start_cluster: i32,
    ) -> Result<NodeId> {
        let id = self.attach(parent, DirectoryItem::new(name, is_file, size, start_cluster))?;
        if is_file {
            let parent_item = self.get_mut(parent)?;
            parent_item.size = parent_item.size.saturating_add(size);
        }
        Ok(id)
    }

    /// Check that `parent` can accept a child called `name`
    pub fn check_insert(&self, parent: NodeId, name: &str) -> Result<()> {
        let parent_item = self.get(parent)?;
        if parent_item.is_file {
            return Err(FsError::NotADirectory(parent_item.name().to_string()));
        }

        if parent_item.is_full() {
            return Err(FsError::DirectoryFull(parent_item.name().to_string()));
        }

        if self.find_child(parent, name).is_some() {
            return Err(FsError::NameConflict(name.to_string()));
        }

        Ok(())
    }

    /// Link an item under `parent` without touching sizes
    pub(crate) fn attach(&mut self, parent: NodeId, mut item: DirectoryItem) -> Result<NodeId> {
        self.check_insert(parent, item.name())?;

        item.parent = Some(parent);
        item.children.clear();

        let id = match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(item);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(item));
                NodeId(self.nodes.len() - 1)
            }
        };

        self.get_mut(parent)?.children.push(id);
        self.live += 1;

        Ok(id)
    }

    /// Remove `id` from its parent's child list (order-preserving)
    fn unlink(&mut self, id: NodeId) -> Result<()> {
        let (parent, is_file, size) = {
            let item = self.get(id)?;
            let parent = item
                .parent
                .ok_or_else(|| FsError::InvalidPath("cannot detach the root directory".to_string()))?;
            (parent, item.is_file, item.size)
        };

        let parent_item = self.get_mut(parent)?;
        if let Some(pos) = parent_item.children.iter().position(|&c| c == id) {
            parent_item.children.remove(pos);
        }
        if is_file {
            parent_item.size = parent_item.size.saturating_sub(size);
        }

        Ok(())
    }

    /// Detach a node and drop its whole subtree from the arena
    ///
    /// Clusters are not released here.
    pub fn remove(&mut self, id: NodeId) -> Result<DirectoryItem> {
        self.unlink(id)?;

        let subtree = self.preorder(id)?;
        let mut removed = None;
        for node in subtree {
            if let Some(item) = self.nodes[node.0].take() {
                self.free_slots.push(node.0);
                self.live -= 1;
                if node == id {
                    removed = Some(item);
                }
            }
        }

        removed.ok_or_else(|| FsError::NotFound(format!("node {}", id)))
    }

    /// Move `id` under `new_parent`
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        if self.is_ancestor(id, new_parent) {
            return Err(FsError::CyclicMove {
                src: self.path_of(id),
                dest: self.path_of(new_parent),
            });
        }

        let name = self.get(id)?.name.clone();
        self.check_insert(new_parent, name.as_str())?;

        self.unlink(id)?;

        let (is_file, size) = {
            let item = self.get_mut(id)?;
            item.parent = Some(new_parent);
            (item.is_file, item.size)
        };

        let parent_item = self.get_mut(new_parent)?;
        parent_item.children.push(id);
        if is_file {
            parent_item.size = parent_item.size.saturating_add(size);
        }

        Ok(())
    }

    /// Rename a node in place
    pub fn rename(&mut self, id: NodeId, name: ItemName) -> Result<()> {
        if let Some(parent) = self.get(id)?.parent {
            if let Some(existing) = self.find_child(parent, name.as_str()) {
                if existing != id {
                    return Err(FsError::NameConflict(name.to_string()));
                }
            }
        }

        self.get_mut(id)?.name = name;
        Ok(())
    }

    /// True when `ancestor` is `node` or lies on its path to root
    ///
    /// The ascent is bounded by the live node count.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        let mut steps = 0;

        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if steps > self.live {
                return false;
            }
            steps += 1;
            current = self.get(id).ok().and_then(|item| item.parent);
        }

        false
    }

    /// Render the absolute path of a node (`/` for root)
    pub fn path_of(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);

        while let Some(node) = current {
            let Ok(item) = self.get(node) else {
                return "/".to_string();
            };
            if names.len() > self.live {
                return "/".to_string();
            }
            match item.parent {
                Some(parent) => {
                    names.push(item.name().to_string());
                    current = Some(parent);
                }
                None => current = None,
            }
        }

        if names.is_empty() {
            return "/".to_string();
        }

        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Preorder listing of the subtree rooted at `id`
    ///
    /// Uses an explicit stack; children appear in their stored order.
    pub fn preorder(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut stack = vec![id];

        while let Some(node) = stack.pop() {
            if order.len() > self.live {
                return Err(FsError::CorruptImage(
                    "directory tree contains a cycle".to_string(),
                ));
            }
            let item = self.get(node)?;
            order.push(node);
            stack.extend(item.children.iter().rev().copied());
        }

        Ok(order)
    }

    pub(crate) fn set_start_cluster(&mut self, id: NodeId, start_cluster: i32) -> Result<()> {
        self.get_mut(id)?.start_cluster = start_cluster;
        Ok(())
    }
}

/// Split a path into components, dropping empty ones
fn split_components(path: &str) -> Result<Vec<&str>> {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

    if components.len() > MAX_CHILDREN {
        return Err(FsError::InvalidPath(format!(
            "too many components ({}, max {})",
            components.len(),
            MAX_CHILDREN
        )));
    }

    if let Some(long) = components.iter().find(|c| c.len() > MAX_NAME_LEN) {
        return Err(FsError::InvalidPath(format!(
            "component '{}...' exceeds {} bytes",
            long.chars().take(16).collect::<String>(),
            MAX_NAME_LEN
        )));
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::FAT_CHAIN_END;

    fn name(s: &str) -> ItemName {
        ItemName::new(s).unwrap()
    }

    fn sample_tree() -> (DirectoryTree, NodeId, NodeId, NodeId) {
        let mut tree = DirectoryTree::new(0);
        let a = tree.add(tree.root(), name("a"), false, 0, 1).unwrap();
        let b = tree.add(a, name("b"), false, 0, 2).unwrap();
        let f = tree.add(b, name("f.bin"), true, 9000, 3).unwrap();
        (tree, a, b, f)
    }

    #[test]
    fn test_resolve_root_and_dots() {
        let (tree, a, b, _) = sample_tree();
        assert_eq!(tree.resolve("/", b).unwrap(), tree.root());
        assert_eq!(tree.resolve(".", a).unwrap(), a);
        assert_eq!(tree.resolve("..", b).unwrap(), a);
        assert_eq!(tree.resolve("", b).unwrap(), b);
        assert!(matches!(
            tree.resolve("..", tree.root()),
            Err(FsError::NoParent)
        ));
    }

    #[test]
    fn test_resolve_paths() {
        let (tree, a, b, f) = sample_tree();
        assert_eq!(tree.resolve("/a/b/f.bin", tree.root()).unwrap(), f);
        assert_eq!(tree.resolve("b/f.bin", a).unwrap(), f);
        assert_eq!(tree.resolve("/a/./b/../b", f).unwrap(), b);
        assert_eq!(tree.resolve("a//b/", tree.root()).unwrap(), b);
    }

    #[test]
    fn test_resolve_reports_first_missing_component() {
        let (tree, _, _, _) = sample_tree();
        match tree.resolve("/a/missing/deeper", tree.root()) {
            Err(FsError::NotFound(component)) => assert_eq!(component, "missing"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_through_file_fails() {
        let (tree, _, _, _) = sample_tree();
        assert!(matches!(
            tree.resolve("/a/b/f.bin/x", tree.root()),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_oversized_paths() {
        let tree = DirectoryTree::new(0);
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            tree.resolve(&long, tree.root()),
            Err(FsError::InvalidPath(_))
        ));

        let deep = "a/".repeat(MAX_CHILDREN + 1);
        assert!(matches!(
            tree.resolve(&deep, tree.root()),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_add_updates_aggregate_size() {
        let (tree, _, b, _) = sample_tree();
        assert_eq!(tree.get(b).unwrap().size(), 9000);
        assert_eq!(tree.get(tree.root()).unwrap().size(), 0);
    }

    #[test]
    fn test_add_name_conflict() {
        let (mut tree, a, _, _) = sample_tree();
        assert!(matches!(
            tree.add(a, name("b"), true, 0, FAT_CHAIN_END),
            Err(FsError::NameConflict(_))
        ));
    }

    #[test]
    fn test_add_directory_full() {
        let mut tree = DirectoryTree::new(0);
        let root = tree.root();
        for i in 0..MAX_CHILDREN {
            tree.add(root, name(&format!("f{}", i)), true, 0, FAT_CHAIN_END)
                .unwrap();
        }
        assert!(matches!(
            tree.add(root, name("overflow"), true, 0, FAT_CHAIN_END),
            Err(FsError::DirectoryFull(_))
        ));
    }

    #[test]
    fn test_add_under_file_fails() {
        let (mut tree, _, _, f) = sample_tree();
        assert!(matches!(
            tree.add(f, name("x"), true, 0, FAT_CHAIN_END),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_remove_preserves_sibling_order() {
        let mut tree = DirectoryTree::new(0);
        let root = tree.root();
        let ids: Vec<_> = ["one", "two", "three", "four"]
            .iter()
            .map(|n| tree.add(root, name(n), true, 10, FAT_CHAIN_END).unwrap())
            .collect();

        tree.remove(ids[1]).unwrap();

        let names: Vec<_> = tree
            .get(root)
            .unwrap()
            .children()
            .iter()
            .map(|&c| tree.get(c).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["one", "three", "four"]);
        assert_eq!(tree.get(root).unwrap().size(), 30);
    }

    #[test]
    fn test_remove_drops_subtree_and_recycles_slots() {
        let (mut tree, a, b, f) = sample_tree();
        assert_eq!(tree.len(), 4);

        let removed = tree.remove(a).unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(tree.len(), 1);
        assert!(tree.get(b).is_err());
        assert!(tree.get(f).is_err());

        let c = tree.add(tree.root(), name("c"), false, 0, 5).unwrap();
        assert!(c.index() <= 3);
    }

    #[test]
    fn test_remove_root_fails() {
        let mut tree = DirectoryTree::new(0);
        assert!(matches!(
            tree.remove(tree.root()),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_reparent_moves_sizes() {
        let (mut tree, a, b, f) = sample_tree();
        tree.reparent(f, a).unwrap();

        assert_eq!(tree.get(f).unwrap().parent(), Some(a));
        assert_eq!(tree.get(a).unwrap().size(), 9000);
        assert_eq!(tree.get(b).unwrap().size(), 0);
        assert_eq!(tree.resolve("/a/f.bin", tree.root()).unwrap(), f);
    }

    #[test]
    fn test_reparent_into_own_subtree() {
        let (mut tree, a, b, _) = sample_tree();
        let before = tree.clone();
        assert!(matches!(
            tree.reparent(a, b),
            Err(FsError::CyclicMove { .. })
        ));
        assert!(matches!(
            tree.reparent(a, a),
            Err(FsError::CyclicMove { .. })
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_rename() {
        let (mut tree, a, b, f) = sample_tree();
        tree.add(b, name("other"), true, 1, FAT_CHAIN_END).unwrap();

        assert!(matches!(
            tree.rename(f, name("other")),
            Err(FsError::NameConflict(_))
        ));
        tree.rename(f, name("g.bin")).unwrap();
        assert_eq!(tree.resolve("b/g.bin", a).unwrap(), f);
    }

    #[test]
    fn test_path_of() {
        let (tree, a, _, f) = sample_tree();
        assert_eq!(tree.path_of(tree.root()), "/");
        assert_eq!(tree.path_of(a), "/a");
        assert_eq!(tree.path_of(f), "/a/b/f.bin");
    }

    #[test]
    fn test_preorder() {
        let (mut tree, a, b, f) = sample_tree();
        let c = tree.add(tree.root(), name("c"), false, 0, 4).unwrap();
        assert_eq!(
            tree.preorder(tree.root()).unwrap(),
            vec![tree.root(), a, b, f, c]
        );
    }

    #[test]
    fn test_is_ancestor() {
        let (tree, a, b, f) = sample_tree();
        assert!(tree.is_ancestor(a, f));
        assert!(tree.is_ancestor(b, b));
        assert!(!tree.is_ancestor(f, a));
        assert!(tree.is_ancestor(tree.root(), f));
    }
}
