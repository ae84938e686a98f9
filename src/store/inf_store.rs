//! Module store with a reverse index from source files to owning modules

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::io::FileSystemTrait;
use crate::parser::{InfParser, ModuleRecord};
use crate::store::DecStore;

/// Build configuration of one source file as seen through one owning module
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceConfiguration {
    pub module: Arc<ModuleRecord>,
    /// Include directories declared by the module's packages
    pub include_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct InfStore {
    files: Vec<PathBuf>,
    modules: HashMap<PathBuf, Arc<ModuleRecord>>,
    by_source: HashMap<PathBuf, Vec<Arc<ModuleRecord>>>,
}

impl InfStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list of known INF files without parsing any of them
    pub fn set_files(&mut self, files: Vec<PathBuf>) {
        self.files = files;
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn files_under<'a>(&'a self, root: &'a Path) -> impl Iterator<Item = &'a PathBuf> + 'a {
        self.files.iter().filter(move |file| file.starts_with(root))
    }

    pub fn get(&self, path: &Path) -> Option<Arc<ModuleRecord>> {
        self.modules.get(path).cloned()
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<ModuleRecord>> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Store a parsed record, replacing any previous record for the same file.
    ///
    /// The record is placed at the front of every source's owner list so the
    /// most recently scanned module wins lookups that take the first entry.
    pub fn insert(&mut self, record: Arc<ModuleRecord>) -> Option<Arc<ModuleRecord>> {
        let path = record.path.as_path().to_path_buf();
        let previous = self.remove(&path);

        for source in &record.sources {
            self.by_source
                .entry(source.as_path().to_path_buf())
                .or_default()
                .insert(0, Arc::clone(&record));
        }
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        trace!("Indexed module {} ({} sources)", path.display(), record.sources.len());
        self.modules.insert(path, record);
        previous
    }

    /// Drop a module and its reverse-index entries; the file stays listed
    pub fn remove(&mut self, path: &Path) -> Option<Arc<ModuleRecord>> {
        let previous = self.modules.remove(path)?;
        for source in &previous.sources {
            if let Some(owners) = self.by_source.get_mut(source.as_path()) {
                owners.retain(|owner| owner.path.as_path() != path);
                if owners.is_empty() {
                    self.by_source.remove(source.as_path());
                }
            }
        }
        Some(previous)
    }

    /// Forget a file entirely, e.g. after it was deleted from disk
    pub fn forget(&mut self, path: &Path) -> Option<Arc<ModuleRecord>> {
        self.files.retain(|file| file != path);
        self.remove(path)
    }

    /// Modules whose INF lives under `root`, parsing any not yet cached
    pub fn modules_under_path<F: FileSystemTrait>(
        &mut self,
        root: &Path,
        parser: &InfParser<F>,
    ) -> Vec<Arc<ModuleRecord>> {
        let pending: Vec<PathBuf> = self
            .files_under(root)
            .filter(|file| !self.modules.contains_key(*file))
            .cloned()
            .collect();

        if !pending.is_empty() {
            debug!("Parsing {} modules under {}", pending.len(), root.display());
        }
        for file in pending {
            self.insert(Arc::new(parser.parse(&file)));
        }

        self.files_under(root)
            .filter_map(|file| self.modules.get(file).cloned())
            .collect()
    }

    /// Every module that lists `source`, most recently scanned first
    pub fn modules_for_source(&self, source: &Path) -> Vec<Arc<ModuleRecord>> {
        self.by_source.get(source).cloned().unwrap_or_default()
    }

    pub fn has_configuration_for(&self, source: &Path) -> bool {
        self.by_source
            .get(source)
            .is_some_and(|owners| !owners.is_empty())
    }

    /// One configuration per owning module, with its include directories
    /// resolved through the module's package references
    pub fn configurations_for(&self, source: &Path, decs: &DecStore) -> Vec<SourceConfiguration> {
        self.modules_for_source(source)
            .into_iter()
            .map(|module| {
                let include_paths = module_include_paths(&module, decs);
                SourceConfiguration {
                    module,
                    include_paths,
                }
            })
            .collect()
    }

    /// Union of include directories across every owning module, deduplicated
    pub fn include_paths_for(&self, source: &Path, decs: &DecStore) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for configuration in self.configurations_for(source, decs) {
            for path in configuration.include_paths {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }
}

fn module_include_paths(module: &ModuleRecord, decs: &DecStore) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for package in &module.packages {
        let declarations = decs.resolve(package);
        if declarations.is_empty() {
            trace!("{}: package {} is not indexed", module.path, package);
        }
        for declaration in declarations {
            for include in &declaration.includes {
                let include = include.as_path().to_path_buf();
                if !paths.contains(&include) {
                    paths.push(include);
                }
            }
        }
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file_system::TestFileSystem;
    use crate::parser::inf::parse_module_text;

    fn module(path: &str, text: &str) -> Arc<ModuleRecord> {
        Arc::new(parse_module_text(Path::new(path), text))
    }

    fn mde_decs() -> DecStore {
        let mut decs = DecStore::new();
        decs.insert(module(
            "/repo/MdePkg/MdePkg.dec",
            "[Includes]\n  Include\n[Includes.X64]\n  Include/X64\n",
        ));
        decs
    }

    #[test]
    fn test_include_paths_through_packages() {
        let mut store = InfStore::new();
        store.insert(module(
            "/repo/Pkg/A/A.inf",
            "[Sources]\n  A.c\n[Packages]\n  MdePkg/MdePkg.dec\n",
        ));

        let source = Path::new("/repo/Pkg/A/A.c");
        assert!(store.has_configuration_for(source));

        let configurations = store.configurations_for(source, &mde_decs());
        assert_eq!(configurations.len(), 1);
        assert_eq!(
            configurations[0].include_paths,
            vec![
                PathBuf::from("/repo/MdePkg/Include"),
                PathBuf::from("/repo/MdePkg/Include/X64"),
            ]
        );
    }

    #[test]
    fn test_shared_source_newest_first_and_union() {
        let mut store = InfStore::new();
        let mut decs = mde_decs();
        decs.insert(module("/repo/OtherPkg/OtherPkg.dec", "[Includes]\n  Inc\n"));

        store.insert(module(
            "/repo/Pkg/A/A.inf",
            "[Sources]\n  ../Common/Shared.c\n[Packages]\n  MdePkg/MdePkg.dec\n",
        ));
        store.insert(module(
            "/repo/Pkg/B/B.inf",
            "[Sources]\n  ../Common/Shared.c\n[Packages]\n  MdePkg/MdePkg.dec\n  OtherPkg/OtherPkg.dec\n",
        ));

        let shared = Path::new("/repo/Pkg/Common/Shared.c");
        let owners = store.modules_for_source(shared);
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].path.as_path(), Path::new("/repo/Pkg/B/B.inf"));

        assert_eq!(
            store.include_paths_for(shared, &decs),
            vec![
                PathBuf::from("/repo/MdePkg/Include"),
                PathBuf::from("/repo/MdePkg/Include/X64"),
                PathBuf::from("/repo/OtherPkg/Inc"),
            ]
        );
    }

    #[test]
    fn test_reinsert_replaces_reverse_entries() {
        let mut store = InfStore::new();
        store.insert(module("/repo/Pkg/A/A.inf", "[Sources]\n  Old.c\n"));
        let previous = store.insert(module("/repo/Pkg/A/A.inf", "[Sources]\n  New.c\n"));

        assert!(previous.is_some());
        assert!(!store.has_configuration_for(Path::new("/repo/Pkg/A/Old.c")));
        assert_eq!(store.modules_for_source(Path::new("/repo/Pkg/A/New.c")).len(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.files().len(), 1);
    }

    #[test]
    fn test_unknown_source_is_empty() {
        let store = InfStore::new();
        let unknown = Path::new("/nowhere.c");
        assert!(store.modules_for_source(unknown).is_empty());
        assert!(store.include_paths_for(unknown, &DecStore::new()).is_empty());
        assert!(!store.has_configuration_for(unknown));
    }

    #[test]
    fn test_modules_under_path_parses_on_demand() {
        let fs = TestFileSystem::new()
            .with_file("/repo/PkgA/A/A.inf", "[Sources]\n  A.c\n")
            .with_file("/repo/PkgB/B/B.inf", "[Sources]\n  B.c\n");
        let parser = InfParser::new(fs);

        let mut store = InfStore::new();
        store.set_files(vec![
            PathBuf::from("/repo/PkgA/A/A.inf"),
            PathBuf::from("/repo/PkgB/B/B.inf"),
        ]);
        assert!(store.is_empty());

        let under_a = store.modules_under_path(Path::new("/repo/PkgA"), &parser);
        assert_eq!(under_a.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.has_configuration_for(Path::new("/repo/PkgA/A/A.c")));
        assert!(!store.has_configuration_for(Path::new("/repo/PkgB/B/B.c")));

        let all = store.modules_under_path(Path::new("/repo"), &parser);
        assert_eq!(all.len(), 2);
    }
}
