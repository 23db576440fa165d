use crate::core::validation::ItemName;

/// Maximum number of children per directory
pub const MAX_CHILDREN: usize = 128;

/// Stable identifier of a node in the directory tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root directory always occupies slot 0
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file or directory in the namespace
///
/// The parent is a non-owning back-reference by id; children are owned by
/// the tree and listed here in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryItem {
    pub(crate) name: ItemName,
    pub(crate) is_file: bool,
    /// Bytes for a file; sum of immediate file children for a directory
    pub(crate) size: u32,
    /// Chain head, or CHAIN-END for an empty chain
    pub(crate) start_cluster: i32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl DirectoryItem {
    pub fn new(name: ItemName, is_file: bool, size: u32, start_cluster: i32) -> Self {
        DirectoryItem {
            name,
            is_file,
            size,
            start_cluster,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    pub fn is_dir(&self) -> bool {
        !self.is_file
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn start_cluster(&self) -> i32 {
        self.start_cluster
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_full(&self) -> bool {
        self.children.len() >= MAX_CHILDREN
    }
}
