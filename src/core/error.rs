use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Not found: '{0}'")]
    NotFound(String),

    #[error("Not a file: '{0}'")]
    NotAFile(String),

    #[error("Not a directory: '{0}'")]
    NotADirectory(String),

    #[error("Already exists: '{0}'")]
    AlreadyExists(String),

    #[error("Name conflict: an item named '{0}' already exists")]
    NameConflict(String),

    #[error("Directory full: '{0}' already holds the maximum number of items")]
    DirectoryFull(String),

    #[error("Out of clusters: no free cluster available")]
    OutOfClusters,

    #[error("Invalid cluster index: {0}")]
    InvalidCluster(i64),

    #[error("Corrupt cluster chain starting at {start}: {reason}")]
    CorruptChain { start: i64, reason: String },

    #[error("Data size {size} exceeds cluster size {cluster_size}")]
    SizeExceedsCluster { size: usize, cluster_size: u32 },

    #[error("No data supplied for cluster write")]
    NullData,

    #[error("No parent directory available")]
    NoParent,

    #[error("Cannot move '{src}' into its own subtree '{dest}'")]
    CyclicMove { src: String, dest: String },

    #[error("Directory not empty: '{0}'")]
    NotEmpty(String),

    #[error("Invalid start cluster for '{name}': {cluster}")]
    InvalidStartCluster { name: String, cluster: i64 },

    #[error("Invalid item name: {0}")]
    InvalidName(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid disk size: {0}")]
    InvalidDiskSize(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Corrupt image: {0}")]
    CorruptImage(String),

    #[error("Filesystem not formatted. Use 'format' first")]
    NotFormatted,

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Destination not found: '{0}'")]
    DestNotFound(String),

    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("Invalid command syntax. Usage: {0}")]
    InvalidCommand(&'static str),

    #[error("Script nesting too deep (max {0})")]
    ScriptDepth(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),
}

impl FsError {
    pub(crate) fn corrupt_chain(start: impl Into<i64>, reason: impl Into<String>) -> Self {
        FsError::CorruptChain {
            start: start.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
