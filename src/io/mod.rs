//! I/O layer
//!
//! - **File system**: trait-based file access used by every parser

pub mod file_system;

pub use file_system::{FileSystemTrait, RealFileSystem};
