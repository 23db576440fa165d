//! Filesystem engine
//!
//! Leaf-first: [`arena`] and [`allocator`] hold cluster bytes and chains,
//! [`tree`] holds the namespace, [`image`] snapshots everything, and
//! [`filesystem`] composes them into the command operations.

pub mod allocator;
pub mod arena;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod filesystem;
pub mod image;
pub mod tree;
pub mod validation;


pub use filesystem::FileSystem;
