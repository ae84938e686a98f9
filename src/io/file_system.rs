//! File system abstraction layer
//!
//! Parsers read build files through `FileSystemTrait` so they can be driven
//! from disk in production and from an in-memory tree in tests.

use std::path::Path;

// ============================================================================
// File System Trait
// ============================================================================

/// Trait for the file system operations the parsers need
#[cfg_attr(test, mockall::automock)]
pub trait FileSystemTrait: Clone + Send + Sync {
    /// Check if a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Read file contents as UTF-8 text
    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error>;
}

// ============================================================================
// Real File System Implementation
// ============================================================================

/// Real file system implementation using std::fs
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystemTrait for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error> {
        // Build files from older trees are occasionally Latin-1; decode lossily
        // rather than dropping the whole file.
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

// ============================================================================
// Test File System Implementation
// ============================================================================


#[cfg(test)]
pub use test_filesystem::TestFileSystem;

// MockFileSystemTrait Clone implementation for dependency injection patterns
#[cfg(test)]
impl Clone for MockFileSystemTrait {
    fn clone(&self) -> Self {
        MockFileSystemTrait::new()
    }
}
