//! Parsed platform descriptions and their diagnostics

use lsp_types::Diagnostic;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::parser::{COMMON_ARCH, DscDocument, LibraryOverride};
use crate::store::{LibraryRecord, LibraryStore};

#[derive(Debug, Clone, Default)]
pub struct PlatformStore {
    platforms: BTreeMap<PathBuf, Arc<DscDocument>>,
}

impl PlatformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, document: DscDocument) -> Arc<DscDocument> {
        let document = Arc::new(document);
        self.platforms
            .insert(document.file_path.clone(), Arc::clone(&document));
        document
    }

    pub fn remove(&mut self, path: &Path) -> Option<Arc<DscDocument>> {
        self.platforms.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<DscDocument>> {
        self.platforms.get(path).cloned()
    }

    pub fn platforms(&self) -> impl Iterator<Item = &Arc<DscDocument>> {
        self.platforms.values()
    }

    /// Platforms whose parse visited `path`, either as the root file or
    /// through an include
    pub fn platforms_including(&self, path: &Path) -> Vec<Arc<DscDocument>> {
        self.platforms
            .values()
            .filter(|doc| doc.file_path == path || doc.included_files.iter().any(|f| f == path))
            .cloned()
            .collect()
    }

    /// Diagnostics located in `path`, from every platform that reached it
    pub fn diagnostics_for(&self, path: &Path) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        for document in self.platforms.values() {
            for error in document.errors.iter().filter(|e| e.location.file == path) {
                let diagnostic = error.to_diagnostic();
                if !diagnostics.contains(&diagnostic) {
                    diagnostics.push(diagnostic);
                }
            }
        }
        diagnostics
    }

    /// Implementation a platform selects for `class_name` on `arch`.
    ///
    /// An override for the exact architecture wins over a `common` one;
    /// within each, the first in file order wins.
    pub fn resolve_library_override(
        &self,
        dsc: &Path,
        class_name: &str,
        arch: &str,
        libraries: &LibraryStore,
    ) -> Option<Arc<LibraryRecord>> {
        let document = self.platforms.get(dsc)?;
        let selected = select_override(&document.libraries, class_name, arch)?;
        libraries.find(class_name, &selected.path)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

fn select_override<'a>(
    overrides: &'a [LibraryOverride],
    class_name: &str,
    arch: &str,
) -> Option<&'a LibraryOverride> {
    overrides
        .iter()
        .find(|o| o.class_name == class_name && o.arch.eq_ignore_ascii_case(arch))
        .or_else(|| {
            overrides
                .iter()
                .find(|o| o.class_name == class_name && o.arch == COMMON_ARCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file_system::TestFileSystem;
    use crate::parser::DscParser;
    use crate::parser::inf::parse_module_text;

    const PLATFORM: &str = "[LibraryClasses]\n  DebugLib|MdePkg/Library/BaseDebugLibNull/BaseDebugLibNull.inf\n[LibraryClasses.X64]\n  DebugLib|MdePkg/Library/UefiDebugLibConOut/UefiDebugLibConOut.inf\n[Bogus]\n";

    fn store() -> PlatformStore {
        let fs = TestFileSystem::new().with_file("/ws/Plat/Plat.dsc", PLATFORM);
        let mut store = PlatformStore::new();
        store.insert(DscParser::new(fs).parse(Path::new("/ws/Plat/Plat.dsc")));
        store
    }

    fn libraries() -> LibraryStore {
        let mut libraries = LibraryStore::new();
        for name in ["BaseDebugLibNull", "UefiDebugLibConOut"] {
            let path = format!("/ws/MdePkg/Library/{name}/{name}.inf");
            let module = parse_module_text(Path::new(&path), "[Defines]\n  LIBRARY_CLASS = DebugLib\n");
            libraries.index_module(&Arc::new(module));
        }
        libraries
    }

    #[test]
    fn test_override_prefers_exact_arch() {
        let store = store();
        let libraries = libraries();
        let dsc = Path::new("/ws/Plat/Plat.dsc");

        let x64 = store
            .resolve_library_override(dsc, "DebugLib", "X64", &libraries)
            .unwrap();
        assert!(x64.inf_path.has_suffix("UefiDebugLibConOut.inf"));

        let ia32 = store
            .resolve_library_override(dsc, "DebugLib", "IA32", &libraries)
            .unwrap();
        assert!(ia32.inf_path.has_suffix("BaseDebugLibNull.inf"));

        assert!(store.resolve_library_override(dsc, "BaseLib", "X64", &libraries).is_none());
        assert!(
            store
                .resolve_library_override(Path::new("/ws/Other.dsc"), "DebugLib", "X64", &libraries)
                .is_none()
        );
    }

    #[test]
    fn test_diagnostics_for_file() {
        let store = store();
        let diagnostics = store.diagnostics_for(Path::new("/ws/Plat/Plat.dsc"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.start.line, 4);
        assert!(store.diagnostics_for(Path::new("/ws/Elsewhere.dsc")).is_empty());
        assert_eq!(store.platforms_including(Path::new("/ws/Plat/Plat.dsc")).len(), 1);
    }
}
