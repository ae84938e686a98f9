//! Line-oriented section tokenizer shared by the INF, DEC and DSC parsers
//!
//! EDK2 build files are INI-like: `[Section.Arch]` headers followed by one
//! entry per line, `#` comments and `\` line continuations. `tokenize` turns
//! a whole file into per-section buckets of clean lines; `positioned_lines`
//! produces the same logical lines but keeps their source line numbers for
//! callers that report diagnostics.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// Architecture bucket used for unqualified section headers
pub const COMMON_ARCH: &str = "common";

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("whitespace pattern is valid"));

/// Canonical lookup key for a section name (case-insensitive)
pub fn canonical_section_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Sections of a tokenized build file
///
/// The merged view keys every line by its base section name only, so
/// `[LibraryClasses.X64]` and `[LibraryClasses.IA32]` share one bucket. The
/// per-architecture view keeps the qualifier for callers that group by it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    merged: HashMap<String, Vec<String>>,
    by_arch: HashMap<String, BTreeMap<String, Vec<String>>>,
}

impl Sections {
    /// Lines of a section across all architectures, in file order
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.merged
            .get(&canonical_section_name(name))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.merged.contains_key(&canonical_section_name(name))
    }

    /// Canonical names of all sections present
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.merged.keys().map(String::as_str)
    }

    /// Lines of a section grouped by architecture qualifier
    pub fn by_arch(&self, name: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        self.by_arch.get(&canonical_section_name(name))
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }
}

/// Parsed `[...]` header: base section key plus architecture qualifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub key: String,
    pub arches: Vec<String>,
}

/// Parse the contents of a header line that starts with `[`.
///
/// The key is the text before the first `.` of the first qualifier; a
/// missing `]` is tolerated and the header runs to end of line.
pub fn parse_header(line: &str) -> SectionHeader {
    let inner = header_body(line);
    let key_end = inner.find(['.', ',']).unwrap_or(inner.len());
    let key = canonical_section_name(&inner[..key_end]);

    let mut arches = Vec::new();
    for qualifier in inner.split(',') {
        let arch = qualifier
            .split('.')
            .nth(1)
            .map(str::trim)
            .filter(|arch| !arch.is_empty())
            .map(|arch| arch.to_ascii_uppercase())
            .unwrap_or_else(|| COMMON_ARCH.to_string());
        if !arches.contains(&arch) {
            arches.push(arch);
        }
    }

    SectionHeader { key, arches }
}

/// Text between `[` and `]` (or end of line)
pub fn header_body(line: &str) -> &str {
    let body = line.trim().trim_start_matches('[');
    match body.find(']') {
        Some(end) => &body[..end],
        None => body,
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

fn normalize_line(line: &str) -> String {
    WHITESPACE_RUN
        .replace_all(strip_comment(line), " ")
        .trim()
        .to_string()
}

/// Split raw file text into sections
pub fn tokenize(text: &str) -> Sections {
    let joined = text.replace("\\\r\n", "").replace("\\\n", "");
    let normalized = joined.replace("\r\n", "\n").replace('\r', "\n");

    let mut sections = Sections::default();
    let mut current: Option<SectionHeader> = None;

    for raw in normalized.split('\n') {
        let line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') {
            let header = parse_header(&line);
            sections.merged.entry(header.key.clone()).or_default();
            current = Some(header);
            continue;
        }

        // Lines before the first header have no section to live in
        let Some(header) = current.as_ref() else {
            continue;
        };

        sections
            .merged
            .entry(header.key.clone())
            .or_default()
            .push(line.clone());

        let arch_map = sections.by_arch.entry(header.key.clone()).or_default();
        for arch in &header.arches {
            arch_map.entry(arch.clone()).or_default().push(line.clone());
        }
    }

    sections
}

/// A logical line with its position in the source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedLine {
    /// 0-based line number of the first physical line
    pub line: u32,
    /// Comment-stripped, whitespace-collapsed, trimmed content
    pub text: String,
    /// Original text of the first physical line, for diagnostic columns
    pub raw: String,
}

/// Logical lines of a file, each tagged with its starting line number
///
/// Continuation lines are joined onto the line that started them; blank
/// and comment-only lines are dropped.
pub fn positioned_lines(text: &str) -> Vec<PositionedLine> {
    let mut result = Vec::new();
    let mut pending: Option<(u32, String, String)> = None;

    for (index, physical) in text.split('\n').enumerate() {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        let (start, mut buffer, raw) = pending
            .take()
            .unwrap_or_else(|| (index as u32, String::new(), physical.to_string()));

        if let Some(continued) = physical.strip_suffix('\\') {
            buffer.push_str(continued);
            pending = Some((start, buffer, raw));
            continue;
        }

        buffer.push_str(physical);
        let text = normalize_line(&buffer);
        if !text.is_empty() {
            result.push(PositionedLine {
                line: start,
                text,
                raw,
            });
        }
    }

    if let Some((start, buffer, raw)) = pending {
        let text = normalize_line(&buffer);
        if !text.is_empty() {
            result.push(PositionedLine {
                line: start,
                text,
                raw,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("\n  \n\t\n").is_empty());
    }

    #[test]
    fn test_continuation_and_comment_stripping() {
        let sections = tokenize("[Sources]\nFoo.c \\\nBar.c # comment\n");
        assert_eq!(sections.get("Sources").unwrap(), ["Foo.c Bar.c"]);
    }

    #[test]
    fn test_crlf_continuation() {
        let sections = tokenize("[Sources]\r\nFoo.c \\\r\nBar.c\r\nBaz.c\r\n");
        assert_eq!(sections.get("sources").unwrap(), ["Foo.c Bar.c", "Baz.c"]);
    }

    #[test]
    fn test_whitespace_collapse_and_blank_lines() {
        let sections = tokenize("[Defines]\n  BASE_NAME   =\t\tFoo  \n\n\n   \n  MODULE_TYPE = BASE\n");
        assert_eq!(
            sections.get("Defines").unwrap(),
            ["BASE_NAME = Foo", "MODULE_TYPE = BASE"]
        );
    }

    #[test]
    fn test_arch_qualifiers_share_base_key() {
        let text = "[LibraryClasses.X64]\nA|a.inf\n[LibraryClasses.IA32]\nB|b.inf\n[LibraryClasses]\nC|c.inf\n";
        let sections = tokenize(text);

        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections.get("LibraryClasses").unwrap(),
            ["A|a.inf", "B|b.inf", "C|c.inf"]
        );

        let by_arch = sections.by_arch("LibraryClasses").unwrap();
        assert_eq!(by_arch["X64"], ["A|a.inf"]);
        assert_eq!(by_arch["IA32"], ["B|b.inf"]);
        assert_eq!(by_arch[COMMON_ARCH], ["C|c.inf"]);
    }

    #[test]
    fn test_multi_qualifier_header_lands_in_each_arch() {
        let sections = tokenize("[Sources.X64, Sources.AARCH64]\nArch.c\n");
        assert_eq!(sections.get("Sources").unwrap(), ["Arch.c"]);
        let by_arch = sections.by_arch("Sources").unwrap();
        assert_eq!(by_arch["X64"], ["Arch.c"]);
        assert_eq!(by_arch["AARCH64"], ["Arch.c"]);
    }

    #[test]
    fn test_lines_before_first_header_are_discarded() {
        let sections = tokenize("Orphan.c\n[Sources]\nKept.c\n");
        assert_eq!(sections.get("Sources").unwrap(), ["Kept.c"]);
    }

    #[test]
    fn test_unterminated_header() {
        let sections = tokenize("[Sources\nFoo.c\n");
        assert_eq!(sections.get("Sources").unwrap(), ["Foo.c"]);
    }

    #[test]
    fn test_parse_header_qualifiers() {
        let header = parse_header("[LibraryClasses.X64.DXE_DRIVER, LibraryClasses.ia32]");
        assert_eq!(header.key, "libraryclasses");
        assert_eq!(header.arches, vec!["X64".to_string(), "IA32".to_string()]);

        let plain = parse_header("[Defines]");
        assert_eq!(plain.key, "defines");
        assert_eq!(plain.arches, vec![COMMON_ARCH.to_string()]);
    }

    #[test]
    fn test_positioned_lines_keep_line_numbers() {
        let text = "# header comment\n[Defines]\n  A = 1 \\\n  2\n\n[Components]\n  Foo/Foo.inf # trailing\n";
        let lines = positioned_lines(text);

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].line, 1);
        assert_eq!(lines[0].text, "[Defines]");
        assert_eq!(lines[1].line, 2);
        assert_eq!(lines[1].text, "A = 1 2");
        assert_eq!(lines[1].raw, "  A = 1 \\");
        assert_eq!(lines[3].line, 6);
        assert_eq!(lines[3].text, "Foo/Foo.inf");
        assert_eq!(lines[3].raw, "  Foo/Foo.inf # trailing");
    }
}
