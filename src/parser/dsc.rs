//! Platform description (`.dsc`) parsing
//!
//! A DSC file is parsed over a stack of frames, one per open file, so an
//! `!include` is expanded depth-first while every line keeps the position it
//! has in its own file. Conditional directives are recognized but never
//! evaluated: every branch is visible. Problems are collected into
//! [`DscDocument::errors`] and parsing always runs to the end of input.

use lsp_types::Diagnostic;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, trace, warn};

use crate::io::FileSystemTrait;
use crate::parser::inf::{LibraryClassEntry, parse_define, parse_library_class};
use crate::parser::location::{DscError, Severity, SourceLocation};
use crate::parser::section::{COMMON_ARCH, PositionedLine, header_body, positioned_lines};
use crate::path::EdkPath;

static MACRO_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((\w+)\)").expect("macro pattern is valid"));

/// Closed set of section names a DSC file may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DscSection {
    Defines,
    SkuIds,
    LibraryClasses,
    Components,
    BuildOptions,
    UserExtensions,
    DefaultStores,
    PcdsFeatureFlag,
    PcdsFixedAtBuild,
    PcdsPatchableInModule,
    PcdsDynamic,
    PcdsDynamicDefault,
    PcdsDynamicEx,
    PcdsDynamicExDefault,
    PcdsDynamicHii,
    PcdsDynamicExHii,
    PcdsDynamicVpd,
    PcdsDynamicExVpd,
}

impl DscSection {
    pub const ALL: [DscSection; 18] = [
        DscSection::Defines,
        DscSection::SkuIds,
        DscSection::LibraryClasses,
        DscSection::Components,
        DscSection::BuildOptions,
        DscSection::UserExtensions,
        DscSection::DefaultStores,
        DscSection::PcdsFeatureFlag,
        DscSection::PcdsFixedAtBuild,
        DscSection::PcdsPatchableInModule,
        DscSection::PcdsDynamic,
        DscSection::PcdsDynamicDefault,
        DscSection::PcdsDynamicEx,
        DscSection::PcdsDynamicExDefault,
        DscSection::PcdsDynamicHii,
        DscSection::PcdsDynamicExHii,
        DscSection::PcdsDynamicVpd,
        DscSection::PcdsDynamicExVpd,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DscSection::Defines => "Defines",
            DscSection::SkuIds => "SkuIds",
            DscSection::LibraryClasses => "LibraryClasses",
            DscSection::Components => "Components",
            DscSection::BuildOptions => "BuildOptions",
            DscSection::UserExtensions => "UserExtensions",
            DscSection::DefaultStores => "DefaultStores",
            DscSection::PcdsFeatureFlag => "PcdsFeatureFlag",
            DscSection::PcdsFixedAtBuild => "PcdsFixedAtBuild",
            DscSection::PcdsPatchableInModule => "PcdsPatchableInModule",
            DscSection::PcdsDynamic => "PcdsDynamic",
            DscSection::PcdsDynamicDefault => "PcdsDynamicDefault",
            DscSection::PcdsDynamicEx => "PcdsDynamicEx",
            DscSection::PcdsDynamicExDefault => "PcdsDynamicExDefault",
            DscSection::PcdsDynamicHii => "PcdsDynamicHii",
            DscSection::PcdsDynamicExHii => "PcdsDynamicExHii",
            DscSection::PcdsDynamicVpd => "PcdsDynamicVpd",
            DscSection::PcdsDynamicExVpd => "PcdsDynamicExVpd",
        }
    }

    /// Case-insensitive lookup
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|section| section.name().eq_ignore_ascii_case(name))
    }

    pub fn is_pcd(&self) -> bool {
        self.name().starts_with("Pcds")
    }
}

impl fmt::Display for DscSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefineEntry {
    pub name: String,
    pub value: String,
    pub location: SourceLocation,
}

/// Library class override from `[LibraryClasses]` or a component block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryOverride {
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_type: Option<String>,
    pub class_name: String,
    pub path: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcdEntry {
    pub section: DscSection,
    pub arch: String,
    pub token_space: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub location: SourceLocation,
}

impl PcdEntry {
    /// `TokenSpace.Name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.token_space, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEntry {
    pub arch: String,
    pub path: String,
    /// Overrides from a `{ <LibraryClasses> ... }` block, scoped to this component
    pub library_overrides: Vec<LibraryOverride>,
    pub pcds: Vec<PcdEntry>,
    pub build_options: Vec<String>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptionEntry {
    pub arch: String,
    pub text: String,
    pub location: SourceLocation,
}

/// Everything parsed from a DSC file and the files it includes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DscDocument {
    pub file_path: PathBuf,
    pub defines: Vec<DefineEntry>,
    pub libraries: Vec<LibraryOverride>,
    pub components: Vec<ComponentEntry>,
    pub pcds: Vec<PcdEntry>,
    pub build_options: Vec<BuildOptionEntry>,
    pub sku_ids: Vec<String>,
    /// Files pulled in through `!include`, in visit order
    pub included_files: Vec<PathBuf>,
    pub errors: Vec<DscError>,
}

impl DscDocument {
    pub fn fatal_errors(&self) -> impl Iterator<Item = &DscError> {
        self.errors.iter().filter(|e| e.is_fatal())
    }

    /// Errors as editor diagnostics, grouped by the file they occurred in
    pub fn diagnostics(&self) -> BTreeMap<PathBuf, Vec<Diagnostic>> {
        let mut grouped: BTreeMap<PathBuf, Vec<Diagnostic>> = BTreeMap::new();
        for error in &self.errors {
            grouped
                .entry(error.location.file.clone())
                .or_default()
                .push(error.to_diagnostic());
        }
        grouped
    }

    /// Location-free view; the first value seen for any key wins
    pub fn reduce(&self) -> PlatformData {
        let mut data = PlatformData {
            file_path: self.file_path.clone(),
            ..Default::default()
        };

        for define in &self.defines {
            data.defines
                .entry(define.name.clone())
                .or_insert_with(|| define.value.clone());
        }

        for library in &self.libraries {
            data.libraries
                .entry(library.arch.clone())
                .or_default()
                .entry(library.class_name.clone())
                .or_insert_with(|| library.path.clone());
            data.library_classes
                .entry(library.class_name.clone())
                .or_insert_with(|| library.path.clone());
        }

        for component in &self.components {
            let paths = data.components.entry(component.arch.clone()).or_default();
            if !paths.contains(&component.path) {
                paths.push(component.path.clone());
            }
        }

        for pcd in &self.pcds {
            data.pcds
                .entry(pcd.qualified_name())
                .or_insert_with(|| pcd.value.clone().unwrap_or_default());
        }

        data
    }
}

/// Reduced platform model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformData {
    pub file_path: PathBuf,
    pub defines: BTreeMap<String, String>,
    /// arch -> class -> INF path
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
    /// class -> INF path across all architectures
    pub library_classes: BTreeMap<String, String>,
    /// arch -> INF paths
    pub components: BTreeMap<String, Vec<String>>,
    /// `TokenSpace.Name` -> value
    pub pcds: BTreeMap<String, String>,
}

/// How a logical line is handled
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind<'a> {
    SectionHeader,
    Define(&'a str),
    Conditional(ConditionalDirective, &'a str),
    Include(&'a str),
    OtherDirective(&'a str),
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionalDirective {
    Open,
    Branch,
    Close,
}

fn classify(text: &str) -> LineKind<'_> {
    if text.starts_with('[') {
        return LineKind::SectionHeader;
    }
    if text.starts_with("DEFINE ") {
        return LineKind::Define(text);
    }
    if let Some(directive) = text.strip_prefix('!') {
        let (keyword, rest) = directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, ""));
        let rest = rest.trim();
        return match keyword.to_ascii_lowercase().as_str() {
            "if" | "ifdef" | "ifndef" => LineKind::Conditional(ConditionalDirective::Open, text),
            "elseif" | "else" => LineKind::Conditional(ConditionalDirective::Branch, text),
            "endif" => LineKind::Conditional(ConditionalDirective::Close, text),
            "include" => LineKind::Include(rest),
            _ => LineKind::OtherDirective(keyword),
        };
    }
    LineKind::Content
}

/// Replace `$(NAME)` references with known macro values; unknown ones stay
pub fn expand_macros(text: &str, macros: &HashMap<String, String>) -> String {
    MACRO_REFERENCE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            macros
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// `TokenSpace.Name|Value[|...]`
fn parse_pcd_line(text: &str) -> Option<(String, String, Option<String>)> {
    let (qualified, value) = match text.split_once('|') {
        Some((qualified, value)) => (qualified.trim(), Some(value.trim().to_string())),
        None => (text.trim(), None),
    };
    let (token_space, name) = qualified.split_once('.')?;
    let (token_space, name) = (token_space.trim(), name.trim());
    if token_space.is_empty() || name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((token_space.to_string(), name.to_string(), value))
}

struct ParseFrame {
    file: PathBuf,
    lines: Vec<PositionedLine>,
    cursor: usize,
}

impl ParseFrame {
    fn advance(&mut self) -> Option<PositionedLine> {
        let line = self.lines.get(self.cursor).cloned();
        self.cursor += 1;
        line
    }
}

struct ActiveSection {
    section: DscSection,
    /// (arch, module type) per qualifier
    scopes: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockSubsection {
    None,
    LibraryClasses,
    Pcds(DscSection),
    BuildOptions,
}

struct ComponentBlock {
    path: String,
    location: SourceLocation,
    subsection: BlockSubsection,
    library_overrides: Vec<LibraryClassEntry>,
    pcds: Vec<(String, String, Option<String>, DscSection, SourceLocation)>,
    build_options: Vec<String>,
}

/// Mutable state carried across all frames of one parse
struct ParseState<'a> {
    document: DscDocument,
    section: Option<ActiveSection>,
    conditions: Vec<String>,
    macros: HashMap<String, String>,
    block: Option<ComponentBlock>,
    workspace_root: Option<&'a Path>,
}

impl ParseState<'_> {
    fn location(&self, file: &Path, line: &PositionedLine) -> SourceLocation {
        SourceLocation {
            file: file.to_path_buf(),
            line: line.line,
            column: None,
            conditional_context: if self.conditions.is_empty() {
                None
            } else {
                Some(self.conditions.join(" && "))
            },
        }
    }

    fn error(
        &mut self,
        file: &Path,
        line: &PositionedLine,
        severity: Severity,
        message: impl Into<String>,
        offending: &str,
    ) {
        let location = self.location(file, line);
        let error = DscError {
            location,
            message: message.into(),
            severity,
            offending_text: offending.to_string(),
            line_text: line.raw.clone(),
        };
        trace!("DSC error: {}", error);
        self.document.errors.push(error);
    }

    fn enter_section(&mut self, file: &Path, line: &PositionedLine) {
        self.close_block_unterminated(file, line);

        let body = header_body(&line.text).trim();
        if body.is_empty() {
            self.error(file, line, Severity::Fatal, "Empty section header", &line.text);
            self.section = None;
            return;
        }

        let mut bases: Vec<&str> = Vec::new();
        let mut scopes = Vec::new();
        for qualifier in body.split(',') {
            let mut parts = qualifier.trim().split('.');
            let base = parts.next().unwrap_or_default().trim();
            let arch = parts
                .next()
                .map(str::trim)
                .filter(|arch| !arch.is_empty())
                .map(str::to_ascii_uppercase)
                .unwrap_or_else(|| COMMON_ARCH.to_string());
            let module_type = parts
                .next()
                .map(str::trim)
                .filter(|module_type| !module_type.is_empty())
                .map(str::to_string);
            bases.push(base);
            scopes.push((arch, module_type));
        }

        if let Some(mismatch) = bases
            .iter()
            .find(|base| !base.eq_ignore_ascii_case(bases[0]))
        {
            let message = format!(
                "Section qualifiers name different sections: '{}' and '{}'",
                bases[0], mismatch
            );
            let offending = mismatch.to_string();
            self.error(file, line, Severity::Warning, message, &offending);
        }

        let mut unknown: Vec<String> = Vec::new();
        for base in &bases {
            if DscSection::from_name(base).is_none()
                && !unknown.iter().any(|u| u.eq_ignore_ascii_case(base))
            {
                unknown.push(base.to_string());
            }
        }
        if !unknown.is_empty() {
            for name in &unknown {
                self.error(
                    file,
                    line,
                    Severity::Fatal,
                    format!("Unknown section '{name}'"),
                    name,
                );
            }
            self.section = None;
            return;
        }

        match DscSection::from_name(bases[0]) {
            Some(section) => {
                trace!("Entering section {} {:?}", section, scopes);
                self.section = Some(ActiveSection { section, scopes });
            }
            None => self.section = None,
        }
    }

    fn define(&mut self, file: &Path, line: &PositionedLine, text: &str) {
        match parse_define(text) {
            Some((name, value)) => {
                let value = expand_macros(&value, &self.macros);
                self.macros.insert(name.clone(), value.clone());
                let location = self.location(file, line);
                self.document.defines.push(DefineEntry {
                    name,
                    value,
                    location,
                });
            }
            None => self.error(
                file,
                line,
                Severity::Warning,
                "Expected NAME = VALUE",
                &line.text,
            ),
        }
    }

    fn conditional(
        &mut self,
        file: &Path,
        line: &PositionedLine,
        directive: ConditionalDirective,
        text: &str,
    ) {
        match directive {
            ConditionalDirective::Open => self.conditions.push(text.to_string()),
            ConditionalDirective::Branch => {
                if self.conditions.is_empty() {
                    self.error(
                        file,
                        line,
                        Severity::Warning,
                        "Conditional branch without a matching !if",
                        text,
                    );
                } else if let Some(top) = self.conditions.last_mut() {
                    *top = text.to_string();
                }
            }
            ConditionalDirective::Close => {
                if self.conditions.pop().is_none() {
                    self.error(
                        file,
                        line,
                        Severity::Warning,
                        "!endif without a matching !if",
                        text,
                    );
                }
            }
        }
    }

    fn content(&mut self, file: &Path, line: &PositionedLine) {
        let Some(active) = self.section.as_ref() else {
            self.error(
                file,
                line,
                Severity::Fatal,
                "Line doesn't correspond to a section",
                &line.text,
            );
            return;
        };
        let section = active.section;
        let scopes = active.scopes.clone();
        let text = line.text.as_str();

        match section {
            DscSection::Defines => self.define(file, line, text),
            DscSection::LibraryClasses => match parse_library_class(text) {
                Some(entry) => {
                    let path = expand_macros(&entry.path, &self.macros);
                    for (arch, module_type) in scopes {
                        let location = self.location(file, line);
                        self.document.libraries.push(LibraryOverride {
                            arch,
                            module_type,
                            class_name: entry.class_name.clone(),
                            path: path.clone(),
                            location,
                        });
                    }
                }
                None => self.error(
                    file,
                    line,
                    Severity::Warning,
                    "Expected ClassName|Path/To/Library.inf",
                    text,
                ),
            },
            DscSection::Components => self.component_line(file, line, &scopes),
            DscSection::BuildOptions => {
                for (arch, _) in scopes {
                    let location = self.location(file, line);
                    self.document.build_options.push(BuildOptionEntry {
                        arch,
                        text: text.to_string(),
                        location,
                    });
                }
            }
            DscSection::SkuIds => self.document.sku_ids.push(text.to_string()),
            DscSection::UserExtensions | DscSection::DefaultStores => {}
            pcd_section => match parse_pcd_line(text) {
                Some((token_space, name, value)) => {
                    for (arch, _) in scopes {
                        let location = self.location(file, line);
                        self.document.pcds.push(PcdEntry {
                            section: pcd_section,
                            arch,
                            token_space: token_space.clone(),
                            name: name.clone(),
                            value: value.clone(),
                            location,
                        });
                    }
                }
                None => self.error(
                    file,
                    line,
                    Severity::Warning,
                    "Expected TokenSpaceGuid.PcdName|Value",
                    text,
                ),
            },
        }
    }

    fn component_line(
        &mut self,
        file: &Path,
        line: &PositionedLine,
        scopes: &[(String, Option<String>)],
    ) {
        let text = line.text.as_str();

        if self.block.is_some() {
            if text.starts_with('}') {
                self.close_block(scopes);
                return;
            }
            if text.starts_with('<') {
                let name = text.trim_start_matches('<');
                let name = name.split('>').next().unwrap_or_default().trim();
                let subsection = if name.eq_ignore_ascii_case("LibraryClasses") {
                    BlockSubsection::LibraryClasses
                } else if name.eq_ignore_ascii_case("BuildOptions") {
                    BlockSubsection::BuildOptions
                } else {
                    match DscSection::from_name(name) {
                        Some(section) if section.is_pcd() => BlockSubsection::Pcds(section),
                        _ => {
                            let offending = name.to_string();
                            self.error(
                                file,
                                line,
                                Severity::Warning,
                                format!("Unknown component subsection '<{name}>'"),
                                &offending,
                            );
                            BlockSubsection::None
                        }
                    }
                };
                if let Some(block) = self.block.as_mut() {
                    block.subsection = subsection;
                }
                return;
            }
            self.block_entry(file, line);
            return;
        }

        let path_end = text
            .find(|c: char| c.is_whitespace() || c == '{')
            .unwrap_or(text.len());
        let raw_path = &text[..path_end];
        if raw_path.is_empty() {
            self.error(
                file,
                line,
                Severity::Warning,
                "Expected a component INF path",
                text,
            );
            return;
        }
        let path = expand_macros(raw_path, &self.macros);
        if !path.to_ascii_lowercase().ends_with(".inf") {
            self.error(
                file,
                line,
                Severity::Warning,
                "Component is not an INF file",
                raw_path,
            );
        }

        let location = self.location(file, line);
        let rest = &text[path_end..];
        if rest.contains('{') {
            self.block = Some(ComponentBlock {
                path,
                location,
                subsection: BlockSubsection::None,
                library_overrides: Vec::new(),
                pcds: Vec::new(),
                build_options: Vec::new(),
            });
            if rest.contains('}') {
                self.close_block(scopes);
            }
            return;
        }

        for (arch, _) in scopes {
            self.document.components.push(ComponentEntry {
                arch: arch.clone(),
                path: path.clone(),
                library_overrides: Vec::new(),
                pcds: Vec::new(),
                build_options: Vec::new(),
                location: location.clone(),
            });
        }
    }

    fn block_entry(&mut self, file: &Path, line: &PositionedLine) {
        let text = line.text.as_str();
        let subsection = self
            .block
            .as_ref()
            .map(|block| block.subsection)
            .unwrap_or(BlockSubsection::None);

        match subsection {
            BlockSubsection::LibraryClasses => match parse_library_class(text) {
                Some(mut entry) => {
                    entry.path = expand_macros(&entry.path, &self.macros);
                    if let Some(block) = self.block.as_mut() {
                        block.library_overrides.push(entry);
                    }
                }
                None => self.error(
                    file,
                    line,
                    Severity::Warning,
                    "Expected ClassName|Path/To/Library.inf",
                    text,
                ),
            },
            BlockSubsection::Pcds(section) => match parse_pcd_line(text) {
                Some((token_space, name, value)) => {
                    let location = self.location(file, line);
                    if let Some(block) = self.block.as_mut() {
                        block
                            .pcds
                            .push((token_space, name, value, section, location));
                    }
                }
                None => self.error(
                    file,
                    line,
                    Severity::Warning,
                    "Expected TokenSpaceGuid.PcdName|Value",
                    text,
                ),
            },
            BlockSubsection::BuildOptions => {
                if let Some(block) = self.block.as_mut() {
                    block.build_options.push(text.to_string());
                }
            }
            BlockSubsection::None => self.error(
                file,
                line,
                Severity::Warning,
                "Component block entry outside a <Section>",
                text,
            ),
        }
    }

    fn close_block(&mut self, scopes: &[(String, Option<String>)]) {
        let Some(block) = self.block.take() else {
            return;
        };
        for (arch, _) in scopes {
            let library_overrides = block
                .library_overrides
                .iter()
                .map(|entry| LibraryOverride {
                    arch: arch.clone(),
                    module_type: None,
                    class_name: entry.class_name.clone(),
                    path: entry.path.clone(),
                    location: block.location.clone(),
                })
                .collect();
            let pcds = block
                .pcds
                .iter()
                .map(|(token_space, name, value, section, location)| PcdEntry {
                    section: *section,
                    arch: arch.clone(),
                    token_space: token_space.clone(),
                    name: name.clone(),
                    value: value.clone(),
                    location: location.clone(),
                })
                .collect();
            self.document.components.push(ComponentEntry {
                arch: arch.clone(),
                path: block.path.clone(),
                library_overrides,
                pcds,
                build_options: block.build_options.clone(),
                location: block.location.clone(),
            });
        }
    }

    /// Flush a component block that was never closed with `}`
    fn close_block_unterminated(&mut self, file: &Path, line: &PositionedLine) {
        if self.block.is_none() {
            return;
        }
        let path = self
            .block
            .as_ref()
            .map(|block| block.path.clone())
            .unwrap_or_default();
        self.error(
            file,
            line,
            Severity::Warning,
            format!("Component block for '{path}' is not closed"),
            &line.text,
        );
        let scopes = self
            .section
            .as_ref()
            .map(|active| active.scopes.clone())
            .unwrap_or_else(|| vec![(COMMON_ARCH.to_string(), None)]);
        self.close_block(&scopes);
    }

    /// Candidate locations for an `!include` target, in lookup order
    fn include_candidates(&self, including_file: &Path, target: &str) -> Vec<PathBuf> {
        let target = expand_macros(target.trim_matches('"'), &self.macros);
        let as_path = Path::new(&target);
        if as_path.is_absolute() {
            return vec![as_path.to_path_buf()];
        }
        let mut candidates = Vec::new();
        let including_dir = EdkPath::from(including_file).parent();
        candidates.push(including_dir.join(&target).into_path_buf());
        if let Some(root) = self.workspace_root {
            let from_root = EdkPath::from(root).join(&target).into_path_buf();
            if !candidates.contains(&from_root) {
                candidates.push(from_root);
            }
        }
        candidates
    }
}

/// Parser for platform description files
#[derive(Debug, Clone)]
pub struct DscParser<F: FileSystemTrait> {
    fs: F,
    workspace_root: Option<PathBuf>,
}

impl<F: FileSystemTrait> DscParser<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            workspace_root: None,
        }
    }

    /// Resolve `!include` targets against `root` when they are not found
    /// next to the including file, and expose it as `$(WORKSPACE)`
    pub fn with_workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = Some(root);
        self
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.fs.exists(path)
    }

    /// Parse the platform file at `path` and everything it includes
    pub fn parse(&self, path: &Path) -> DscDocument {
        match self.fs.read_to_string(path) {
            Ok(text) => self.parse_text(path, &text),
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                let mut document = DscDocument {
                    file_path: path.to_path_buf(),
                    ..Default::default()
                };
                let target = path.display().to_string();
                document.errors.push(DscError {
                    location: SourceLocation::new(path.to_path_buf(), 0),
                    message: format!("Unable to open file: {e}"),
                    severity: Severity::Fatal,
                    offending_text: target,
                    line_text: String::new(),
                });
                document
            }
        }
    }

    /// Parse already-loaded text of the root platform file
    pub fn parse_text(&self, path: &Path, text: &str) -> DscDocument {
        let mut state = ParseState {
            document: DscDocument {
                file_path: path.to_path_buf(),
                ..Default::default()
            },
            section: None,
            conditions: Vec::new(),
            macros: HashMap::new(),
            block: None,
            workspace_root: self.workspace_root.as_deref(),
        };
        if let Some(root) = &self.workspace_root {
            state
                .macros
                .insert("WORKSPACE".to_string(), root.to_string_lossy().to_string());
        }

        let mut stack = vec![ParseFrame {
            file: path.to_path_buf(),
            lines: positioned_lines(text),
            cursor: 0,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let Some(line) = frame.advance() else {
                if let Some(done) = stack.pop() {
                    trace!("Finished {}", done.file.display());
                }
                continue;
            };
            let file = frame.file.clone();

            match classify(&line.text) {
                LineKind::SectionHeader => state.enter_section(&file, &line),
                LineKind::Define(text) => state.define(&file, &line, text),
                LineKind::Conditional(directive, text) => {
                    state.conditional(&file, &line, directive, text)
                }
                LineKind::Include(target) => {
                    if let Some(frame) = self.open_include(&mut state, &stack, &file, &line, target)
                    {
                        stack.push(frame);
                    }
                }
                LineKind::OtherDirective(keyword) => {
                    trace!("Ignoring !{} directive in {}", keyword, file.display());
                }
                LineKind::Content => state.content(&file, &line),
            }
        }

        if let Some(block) = state.block.as_ref() {
            let origin = PositionedLine {
                line: block.location.line,
                text: block.path.clone(),
                raw: block.path.clone(),
            };
            let file = block.location.file.clone();
            state.close_block_unterminated(&file, &origin);
        }
        if !state.conditions.is_empty() {
            debug!(
                "{} conditional blocks left open in {}",
                state.conditions.len(),
                path.display()
            );
        }

        debug!(
            "Parsed {}: {} components, {} library overrides, {} errors",
            path.display(),
            state.document.components.len(),
            state.document.libraries.len(),
            state.document.errors.len()
        );
        state.document
    }

    fn open_include(
        &self,
        state: &mut ParseState<'_>,
        stack: &[ParseFrame],
        file: &Path,
        line: &PositionedLine,
        target: &str,
    ) -> Option<ParseFrame> {
        if target.is_empty() {
            state.error(file, line, Severity::Fatal, "!include without a path", &line.text);
            return None;
        }

        let candidates = state.include_candidates(file, target);
        let resolved = candidates
            .iter()
            .find(|candidate| self.fs.exists(candidate))
            .cloned()
            .unwrap_or_else(|| candidates[0].clone());

        if stack.iter().any(|frame| frame.file == resolved) {
            state.error(
                file,
                line,
                Severity::Fatal,
                format!("Recursive include of {}", resolved.display()),
                target,
            );
            return None;
        }

        match self.fs.read_to_string(&resolved) {
            Ok(text) => {
                debug!("Including {}", resolved.display());
                state.document.included_files.push(resolved.clone());
                Some(ParseFrame {
                    file: resolved,
                    lines: positioned_lines(&text),
                    cursor: 0,
                })
            }
            Err(e) => {
                state.error(
                    file,
                    line,
                    Severity::Fatal,
                    format!("Unable to open included file {}: {e}", resolved.display()),
                    target,
                );
                None
            }
        }
    }
}
