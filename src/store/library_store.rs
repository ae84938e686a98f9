//! Library class implementations
//!
//! Implementations are learned two ways: from the library class mappings of
//! each package (the per-package sub-scan), and from INF files that declare
//! a `LIBRARY_CLASS` of their own.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::io::FileSystemTrait;
use crate::parser::{COMMON_ARCH, DscParser, ModuleRecord};
use crate::path::EdkPath;
use crate::store::{InfStore, Package};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryRecord {
    pub class_name: String,
    pub inf_path: EdkPath,
    pub arch: String,
    /// Name of the package whose mappings named this implementation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Parsed implementation, when its INF has been indexed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<Arc<ModuleRecord>>,
}

#[derive(Debug, Clone, Default)]
pub struct LibraryStore {
    all: Vec<Arc<LibraryRecord>>,
    by_class: HashMap<String, BTreeMap<EdkPath, Arc<LibraryRecord>>>,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an implementation, deduplicated by class and INF path.
    ///
    /// A record without a parsed module does not discard one that has it.
    pub fn add(&mut self, record: LibraryRecord) -> Arc<LibraryRecord> {
        let implementations = self.by_class.entry(record.class_name.clone()).or_default();
        let record = match implementations.get(&record.inf_path) {
            Some(existing) => {
                let merged = LibraryRecord {
                    module: record.module.or_else(|| existing.module.clone()),
                    package: record.package.or_else(|| existing.package.clone()),
                    ..record
                };
                let existing = Arc::clone(existing);
                self.all.retain(|r| !Arc::ptr_eq(r, &existing));
                Arc::new(merged)
            }
            None => Arc::new(record),
        };
        implementations.insert(record.inf_path.clone(), Arc::clone(&record));
        self.all.push(Arc::clone(&record));
        record
    }

    /// Sub-scan of one package: register every library class mapping it
    /// carries and resolve each against the parsed modules.
    ///
    /// INF paths are relative to the workspace root; header paths from a
    /// DEC fallback are relative to the package root. Returns the number of
    /// mappings registered.
    pub fn scan_libraries<F: FileSystemTrait>(
        &mut self,
        package: &Package,
        parser: &DscParser<F>,
        modules: &InfStore,
        workspace_root: &Path,
    ) -> usize {
        let mut count = 0;
        for (arch, entries) in package.library_classes(parser) {
            for entry in entries {
                let base = if entry.path.to_ascii_lowercase().ends_with(".inf") {
                    EdkPath::from(workspace_root)
                } else {
                    package.package_root.clone()
                };
                let inf_path = base.join(&entry.path);
                let module = modules.get(inf_path.as_path());
                self.add(LibraryRecord {
                    class_name: entry.class_name,
                    inf_path,
                    arch: arch.clone(),
                    package: Some(package.name.clone()),
                    module,
                });
                count += 1;
            }
        }
        debug!("Package {}: {} library class mappings", package.name, count);
        count
    }

    /// Register the classes a module declares it implements
    pub fn index_module(&mut self, module: &Arc<ModuleRecord>) {
        for role in &module.library_roles {
            trace!("{} implements {}", module.path, role.class_name);
            self.add(LibraryRecord {
                class_name: role.class_name.clone(),
                inf_path: module.path.clone(),
                arch: COMMON_ARCH.to_string(),
                package: None,
                module: Some(Arc::clone(module)),
            });
        }
    }

    /// Implementations of a class, ordered by INF path
    pub fn implementations(&self, class_name: &str) -> Vec<Arc<LibraryRecord>> {
        self.by_class
            .get(class_name)
            .map(|implementations| implementations.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every class with its implementations
    pub fn grouped(&self) -> BTreeMap<String, Vec<Arc<LibraryRecord>>> {
        self.by_class
            .iter()
            .map(|(class, implementations)| {
                (class.clone(), implementations.values().cloned().collect())
            })
            .collect()
    }

    pub fn all(&self) -> &[Arc<LibraryRecord>] {
        &self.all
    }

    /// First implementation of `class_name` whose INF path ends with
    /// `path_suffix` on a component boundary
    pub fn find(&self, class_name: &str, path_suffix: &str) -> Option<Arc<LibraryRecord>> {
        self.all
            .iter()
            .find(|record| record.class_name == class_name && record.inf_path.has_suffix(path_suffix))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file_system::TestFileSystem;
    use crate::parser::inf::parse_module_text;

    fn module(path: &str, text: &str) -> Arc<ModuleRecord> {
        Arc::new(parse_module_text(Path::new(path), text))
    }

    #[test]
    fn test_sub_scan_resolves_modules() {
        let fs = TestFileSystem::new().with_file(
            "/ws/FooPkg/FooPkg.dsc",
            "[LibraryClasses]\n  FooLib|FooPkg/Library/FooLib/FooLib.inf\n  BarLib|FooPkg/Library/BarLib/BarLib.inf\n",
        );
        let parser = DscParser::new(fs);
        let package = Package::new(module("/ws/FooPkg/FooPkg.dec", "[Defines]\n  PACKAGE_NAME = FooPkg\n"));

        let mut modules = InfStore::new();
        modules.insert(module(
            "/ws/FooPkg/Library/FooLib/FooLib.inf",
            "[Defines]\n  LIBRARY_CLASS = FooLib\n[Sources]\n  FooLib.c\n",
        ));

        let mut store = LibraryStore::new();
        let count = store.scan_libraries(&package, &parser, &modules, Path::new("/ws"));
        assert_eq!(count, 2);

        let foo = store.implementations("FooLib");
        assert_eq!(foo.len(), 1);
        assert_eq!(foo[0].inf_path, EdkPath::from("/ws/FooPkg/Library/FooLib/FooLib.inf"));
        assert_eq!(foo[0].package.as_deref(), Some("FooPkg"));
        assert!(foo[0].module.is_some());

        let bar = store.implementations("BarLib");
        assert!(bar[0].module.is_none());
        assert!(store.implementations("Missing").is_empty());
    }

    #[test]
    fn test_dec_fallback_paths_are_package_relative() {
        let parser = DscParser::new(TestFileSystem::new());
        let package = Package::new(module(
            "/ws/FooPkg/FooPkg.dec",
            "[LibraryClasses]\n  FooLib|Include/Library/FooLib.h\n",
        ));

        let mut store = LibraryStore::new();
        store.scan_libraries(&package, &parser, &InfStore::new(), Path::new("/ws"));
        assert_eq!(
            store.all()[0].inf_path,
            EdkPath::from("/ws/FooPkg/Include/Library/FooLib.h")
        );
    }

    #[test]
    fn test_dedup_keeps_parsed_module() {
        let mut store = LibraryStore::new();
        let lib = module("/ws/MdePkg/Library/BaseLib/BaseLib.inf", "[Defines]\n  LIBRARY_CLASS = BaseLib\n");
        store.index_module(&lib);
        store.add(LibraryRecord {
            class_name: "BaseLib".to_string(),
            inf_path: EdkPath::from("/ws/MdePkg/Library/BaseLib/BaseLib.inf"),
            arch: "X64".to_string(),
            package: Some("MdePkg".to_string()),
            module: None,
        });

        assert_eq!(store.len(), 1);
        let record = &store.all()[0];
        assert_eq!(record.arch, "X64");
        assert!(record.module.is_some());
        assert_eq!(record.package.as_deref(), Some("MdePkg"));
    }

    #[test]
    fn test_find_by_class_and_suffix() {
        let mut store = LibraryStore::new();
        store.index_module(&module(
            "/ws/MdePkg/Library/BaseDebugLibNull/BaseDebugLibNull.inf",
            "[Defines]\n  LIBRARY_CLASS = DebugLib\n",
        ));
        store.index_module(&module(
            "/ws/MdePkg/Library/UefiDebugLibConOut/UefiDebugLibConOut.inf",
            "[Defines]\n  LIBRARY_CLASS = DebugLib|DXE_DRIVER UEFI_APPLICATION\n",
        ));

        let found = store
            .find("DebugLib", "MdePkg/Library/UefiDebugLibConOut/UefiDebugLibConOut.inf")
            .unwrap();
        assert!(found.inf_path.has_suffix("UefiDebugLibConOut.inf"));
        assert!(store.find("DebugLib", "Other/Lib.inf").is_none());
        assert!(store.find("BaseLib", "BaseDebugLibNull.inf").is_none());
        assert_eq!(store.grouped()["DebugLib"].len(), 2);
    }
}
