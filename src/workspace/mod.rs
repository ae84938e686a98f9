//! Workspace discovery and the cross-reference index
//!
//! [`WorkspaceIndex`] walks an EDK2 tree, parses every `.inf`, `.dec` and
//! `.dsc` file it finds and answers queries against the resulting stores.

pub mod config;
pub mod error;
pub mod events;
pub mod index;

pub use config::IndexConfig;
pub use error::IndexError;
pub use events::{IndexEvent, ScanSummary};
pub use index::{WorkspaceIndex, fingerprint};
