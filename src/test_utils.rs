//! Test utilities and global setup
//!
//! Provides centralized test logging configuration and a temporary workspace
//! builder for EDK2 source trees.

/// Test logging utilities
#[cfg(feature = "test-logging")]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG`; defaults to debug for this crate.
    ///
    /// ```bash
    /// RUST_LOG=edk2_index=trace cargo test --features test-logging
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok();
        });
    }
}

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Temporary directory laid out like an EDK2 workspace
pub struct TestWorkspace {
    _temp_dir: TempDir, // Underscore prefix keeps it alive until drop
    pub root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Write `content` to `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create fixture directory");
        }
        fs::write(&path, content).expect("Failed to write fixture file");
        path
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root.join(relative)).expect("Failed to remove fixture file");
    }

    /// Minimal MdePkg: a package with one include directory and a BaseLib
    /// module that depends on it
    pub fn with_mde_pkg(self) -> Self {
        self.write(
            "MdePkg/MdePkg.dec",
            "[Defines]\n  DEC_SPECIFICATION = 0x00010005\n  PACKAGE_NAME = MdePkg\n\n[Includes]\n  Include\n\n[LibraryClasses]\n  BaseLib|Include/Library/BaseLib.h\n",
        );
        self.write(
            "MdePkg/Library/BaseLib/BaseLib.inf",
            "[Defines]\n  INF_VERSION = 0x00010005\n  BASE_NAME = BaseLib\n  MODULE_TYPE = BASE\n  LIBRARY_CLASS = BaseLib\n\n[Sources]\n  BaseLib.c\n\n[Packages]\n  MdePkg/MdePkg.dec\n",
        );
        self.write("MdePkg/Library/BaseLib/BaseLib.c", "// BaseLib\n");
        self
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
