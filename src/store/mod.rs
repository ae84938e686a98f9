//! In-memory indices over parsed build files
//!
//! Stores are plain data owned by one [`Stores`] snapshot. The workspace
//! index builds a fresh snapshot per scan and swaps it in whole.

pub mod dec_store;
pub mod inf_store;
pub mod library_store;
pub mod package_store;
pub mod platform_store;

pub use dec_store::DecStore;
pub use inf_store::{InfStore, SourceConfiguration};
pub use library_store::{LibraryRecord, LibraryStore};
pub use package_store::{Package, PackageStore};
pub use platform_store::PlatformStore;

use std::collections::HashMap;
use std::path::PathBuf;

/// Every index for one workspace root
#[derive(Debug, Clone, Default)]
pub struct Stores {
    pub infs: InfStore,
    pub decs: DecStore,
    pub packages: PackageStore,
    pub libraries: LibraryStore,
    pub platforms: PlatformStore,
    /// SHA-256 of each parsed file's content at the time it was indexed
    pub fingerprints: HashMap<PathBuf, String>,
}
