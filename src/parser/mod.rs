//! Build description parsers
//!
//! - **Section tokenizer**: shared lexer for `[Section.Arch]` formatted files
//! - **INF/DEC**: module and package records
//! - **DSC**: platform descriptions with includes and diagnostics

pub mod dsc;
pub mod inf;
pub mod location;
pub mod section;

pub use dsc::{
    ComponentEntry, DscDocument, DscParser, DscSection, LibraryOverride, PcdEntry, PlatformData,
};
pub use inf::{DecParser, GuidEntry, InfParser, LibraryClassEntry, LibraryRole, ModuleRecord};
pub use location::{DscError, Severity, SourceLocation};
pub use section::{COMMON_ARCH, Sections, tokenize};
