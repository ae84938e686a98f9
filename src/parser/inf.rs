//! INF and DEC parsing
//!
//! Module (`.inf`) and package (`.dec`) files share one grammar for the
//! purposes of this index, so both produce a [`ModuleRecord`]. Parsing is
//! best effort: an unreadable file yields an empty record and malformed
//! lines are skipped, so one bad file never aborts a repository scan.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::io::FileSystemTrait;
use crate::parser::section::{Sections, tokenize};
use crate::path::EdkPath;

static COMPONENT_INF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w/]+\.inf").expect("component pattern is valid"));

const DEFINE_PREFIX: &str = "DEFINE ";

/// Sections whose lines are collected verbatim as PCD references
const PCD_SECTIONS: &[&str] = &[
    "Pcd",
    "PcdEx",
    "FixedPcd",
    "FeaturePcd",
    "PatchPcd",
    "PcdsFeatureFlag",
    "PcdsFixedAtBuild",
    "PcdsPatchableInModule",
    "PcdsDynamic",
    "PcdsDynamicEx",
];

/// `name = guid` pair from a `[Protocols]`, `[Guids]` or `[Ppis]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidEntry {
    pub name: String,
    pub guid: String,
}

/// `ClassName|Path` pair from a `[LibraryClasses]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryClassEntry {
    pub class_name: String,
    pub path: String,
}

/// Library class an INF implements, from `LIBRARY_CLASS = Name|Types`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRole {
    pub class_name: String,
    pub module_types: Vec<String>,
}

/// Structured contents of one INF or DEC file
///
/// Records are immutable once parsed; a rescan produces a new record that
/// replaces this one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub path: EdkPath,
    pub directory: EdkPath,
    pub defines: BTreeMap<String, String>,
    pub sources: Vec<EdkPath>,
    pub includes: Vec<EdkPath>,
    pub packages: Vec<String>,
    pub protocols: Vec<GuidEntry>,
    pub guids: Vec<GuidEntry>,
    pub ppis: Vec<GuidEntry>,
    pub pcds: Vec<String>,
    pub components: Vec<String>,
    pub library_classes: Vec<LibraryClassEntry>,
    pub library_roles: Vec<LibraryRole>,
}

impl ModuleRecord {
    /// Record with identity fields set and everything else empty
    pub fn empty(path: &Path) -> Self {
        let path = EdkPath::from(path);
        let directory = path.parent();
        Self {
            path,
            directory,
            ..Default::default()
        }
    }

    /// `BASE_NAME` define, falling back to the file stem
    pub fn base_name(&self) -> String {
        self.defines
            .get("BASE_NAME")
            .cloned()
            .unwrap_or_else(|| self.path.stem())
    }

    pub fn module_type(&self) -> Option<&str> {
        self.defines.get("MODULE_TYPE").map(String::as_str)
    }

    /// Whether the module lists `source` among its sources
    pub fn owns_source(&self, source: &Path) -> bool {
        self.sources.iter().any(|s| s.as_path() == source)
    }
}

/// Build a record from already-loaded file text
pub fn parse_module_text(path: &Path, text: &str) -> ModuleRecord {
    let mut record = ModuleRecord::empty(path);
    let sections = tokenize(text);
    populate(&mut record, &sections);
    debug!(
        "Parsed {}: {} sources, {} packages, {} library classes",
        record.path,
        record.sources.len(),
        record.packages.len(),
        record.library_classes.len()
    );
    record
}

fn populate(record: &mut ModuleRecord, sections: &Sections) {
    if let Some(lines) = sections.get("Defines") {
        for line in lines {
            if let Some(role) = parse_library_role(line) {
                record.library_roles.push(role);
            }
            if let Some((key, value)) = parse_define(line) {
                record.defines.insert(key, value);
            }
        }
    }

    if let Some(lines) = sections.get("Sources") {
        for line in lines {
            // `Foo.c | GCC` restricts a source to one tool chain family
            let relative = line.split('|').next().unwrap_or_default().trim();
            push_unique(&mut record.sources, record.directory.join(relative));
        }
    }

    if let Some(lines) = sections.get("Includes") {
        for line in lines {
            push_unique(&mut record.includes, record.directory.join(line));
        }
    }

    if let Some(lines) = sections.get("Packages") {
        record.packages.extend(lines.iter().map(|line| line.trim().to_string()));
    }

    if let Some(lines) = sections.get("Protocols") {
        record.protocols.extend(lines.iter().filter_map(|l| parse_guid_entry(l)));
    }
    if let Some(lines) = sections.get("Guids") {
        record.guids.extend(lines.iter().filter_map(|l| parse_guid_entry(l)));
    }
    if let Some(lines) = sections.get("Ppis") {
        record.ppis.extend(lines.iter().filter_map(|l| parse_guid_entry(l)));
    }

    for name in PCD_SECTIONS {
        if let Some(lines) = sections.get(name) {
            record.pcds.extend(lines.iter().map(|line| line.trim().to_string()));
        }
    }

    if let Some(lines) = sections.get("Components") {
        record.components.extend(
            lines
                .iter()
                .filter_map(|line| COMPONENT_INF.find(line).map(|m| m.as_str().to_string())),
        );
    }

    if let Some(lines) = sections.get("LibraryClasses") {
        record
            .library_classes
            .extend(lines.iter().filter_map(|l| parse_library_class(l)));
    }
}

fn push_unique(paths: &mut Vec<EdkPath>, path: EdkPath) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// `KEY = VALUE` or `DEFINE KEY = VALUE`
///
/// The `DEFINE ` keyword is removed by fixed width; the tokenizer has
/// already collapsed whitespace runs, so the keyword is always followed by
/// exactly one space.
pub fn parse_define(line: &str) -> Option<(String, String)> {
    let body = line.strip_prefix(DEFINE_PREFIX).unwrap_or(line);
    let (key, value) = body.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

fn parse_library_role(line: &str) -> Option<LibraryRole> {
    let (key, value) = parse_define(line)?;
    if key != "LIBRARY_CLASS" {
        return None;
    }
    let mut parts = value.splitn(2, '|');
    let class_name = parts.next()?.trim().to_string();
    if class_name.is_empty() {
        return None;
    }
    let module_types = parts
        .next()
        .map(|types| types.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Some(LibraryRole {
        class_name,
        module_types,
    })
}

/// `Name = Value`, both sides required
pub fn parse_guid_entry(line: &str) -> Option<GuidEntry> {
    let (name, guid) = line.split_once('=')?;
    let (name, guid) = (name.trim(), guid.trim());
    if name.is_empty() || guid.is_empty() {
        return None;
    }
    Some(GuidEntry {
        name: name.to_string(),
        guid: guid.to_string(),
    })
}

/// `ClassName|Path/To/Lib.inf`, both sides required
pub fn parse_library_class(line: &str) -> Option<LibraryClassEntry> {
    let (class_name, path) = line.split_once('|')?;
    let (class_name, path) = (class_name.trim(), path.trim());
    if class_name.is_empty() || path.is_empty() {
        return None;
    }
    Some(LibraryClassEntry {
        class_name: class_name.to_string(),
        path: path.to_string(),
    })
}

/// Parser for module description (`.inf`) files
#[derive(Debug, Clone)]
pub struct InfParser<F: FileSystemTrait> {
    fs: F,
}

impl<F: FileSystemTrait> InfParser<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Parse the file at `path`; never fails
    pub fn parse(&self, path: &Path) -> ModuleRecord {
        match self.fs.read_to_string(path) {
            Ok(text) => parse_module_text(path, &text),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                ModuleRecord::empty(path)
            }
        }
    }
}

/// Parser for package declaration (`.dec`) files
///
/// DEC files are parsed with the INF grammar; this wrapper exists so call
/// sites say which kind of file they expect.
#[derive(Debug, Clone)]
pub struct DecParser<F: FileSystemTrait> {
    inner: InfParser<F>,
}

impl<F: FileSystemTrait> DecParser<F> {
    pub fn new(fs: F) -> Self {
        Self {
            inner: InfParser::new(fs),
        }
    }

    pub fn parse(&self, path: &Path) -> ModuleRecord {
        self.inner.parse(path)
    }
}
