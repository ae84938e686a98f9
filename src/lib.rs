//! Parser and cross-reference index for EDK2 build descriptions
//!
//! - [`parser`]: `.inf`/`.dec` module parsing and the `.dsc` platform parser
//! - [`store`]: lookup tables built from parsed files
//! - [`workspace`]: repository scanning, rescans and queries

pub mod io;
pub mod logging;
pub mod parser;
pub mod path;
pub mod store;
pub mod workspace;

#[cfg(test)]
mod test_utils;

pub use parser::{DscDocument, DscParser, InfParser, ModuleRecord, PlatformData};
pub use path::EdkPath;
pub use workspace::{IndexConfig, IndexError, IndexEvent, ScanSummary, WorkspaceIndex};

