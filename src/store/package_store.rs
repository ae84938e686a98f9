//! DEC-backed packages
//!
//! A package's library classes and components come from the platform file
//! that sits next to its declaration (`FooPkg.dec` -> `FooPkg.dsc`). That
//! file is parsed at most once per package, on first request.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

use crate::io::FileSystemTrait;
use crate::parser::{COMMON_ARCH, DscParser, LibraryClassEntry, ModuleRecord, PlatformData};
use crate::path::EdkPath;

#[derive(Debug, Serialize)]
pub struct Package {
    pub name: String,
    pub file_path: EdkPath,
    pub package_root: EdkPath,
    #[serde(skip)]
    pub declaration: Arc<ModuleRecord>,
    #[serde(skip)]
    platform: OnceLock<Option<PlatformData>>,
}

impl Package {
    /// Package named by `PACKAGE_NAME`, or the DEC file stem
    pub fn new(declaration: Arc<ModuleRecord>) -> Self {
        let name = declaration
            .defines
            .get("PACKAGE_NAME")
            .cloned()
            .unwrap_or_else(|| declaration.path.stem());
        Self {
            name,
            file_path: declaration.path.clone(),
            package_root: declaration.directory.clone(),
            declaration,
            platform: OnceLock::new(),
        }
    }

    /// Sibling platform description, whether or not it exists
    pub fn platform_path(&self) -> EdkPath {
        self.file_path.with_extension_replaced("dsc")
    }

    /// Supply the sibling platform when it was already parsed elsewhere.
    /// Has no effect once the platform has been loaded.
    pub fn preload_platform(&self, platform: PlatformData) {
        let _ = self.platform.set(Some(platform));
    }

    fn platform<F: FileSystemTrait>(&self, parser: &DscParser<F>) -> Option<&PlatformData> {
        self.platform
            .get_or_init(|| {
                let dsc = self.platform_path();
                if !parser.exists(dsc.as_path()) {
                    trace!("{} has no platform file", self.name);
                    return None;
                }
                debug!("Loading platform {} for package {}", dsc, self.name);
                Some(parser.parse(dsc.as_path()).reduce())
            })
            .as_ref()
    }

    /// Library class mappings grouped by architecture
    ///
    /// Without a sibling platform file the package's own `[LibraryClasses]`
    /// declarations are reported under `common`.
    pub fn library_classes<F: FileSystemTrait>(
        &self,
        parser: &DscParser<F>,
    ) -> BTreeMap<String, Vec<LibraryClassEntry>> {
        match self.platform(parser) {
            Some(platform) => platform
                .libraries
                .iter()
                .map(|(arch, classes)| {
                    let entries = classes
                        .iter()
                        .map(|(class_name, path)| LibraryClassEntry {
                            class_name: class_name.clone(),
                            path: path.clone(),
                        })
                        .collect();
                    (arch.clone(), entries)
                })
                .collect(),
            None if self.declaration.library_classes.is_empty() => BTreeMap::new(),
            None => BTreeMap::from([(
                COMMON_ARCH.to_string(),
                self.declaration.library_classes.clone(),
            )]),
        }
    }

    /// Component INF paths grouped by architecture
    pub fn components<F: FileSystemTrait>(
        &self,
        parser: &DscParser<F>,
    ) -> BTreeMap<String, Vec<String>> {
        self.platform(parser)
            .map(|platform| platform.components.clone())
            .unwrap_or_default()
    }

    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(self.package_root.as_path())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PackageStore {
    packages: Vec<Arc<Package>>,
}

impl PackageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package, replacing one declared by the same file
    pub fn add(&mut self, package: Package) -> Arc<Package> {
        let package = Arc::new(package);
        match self
            .packages
            .iter_mut()
            .find(|existing| existing.file_path == package.file_path)
        {
            Some(existing) => *existing = Arc::clone(&package),
            None => self.packages.push(Arc::clone(&package)),
        }
        package
    }

    pub fn remove(&mut self, dec: &Path) -> Option<Arc<Package>> {
        let index = self
            .packages
            .iter()
            .position(|package| package.file_path.as_path() == dec)?;
        Some(self.packages.remove(index))
    }

    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    /// Packages with the given name; more than one when a name is reused
    pub fn get(&self, name: &str) -> Vec<Arc<Package>> {
        self.packages
            .iter()
            .filter(|package| package.name == name)
            .cloned()
            .collect()
    }

    pub fn by_path(&self, dec: &Path) -> Option<Arc<Package>> {
        self.packages
            .iter()
            .find(|package| package.file_path.as_path() == dec)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::file_system::{MockFileSystemTrait, TestFileSystem};
    use crate::parser::inf::parse_module_text;

    const DEC: &str = "[Defines]\n  PACKAGE_NAME = FooPkg\n[LibraryClasses]\n  FooLib|Include/Library/FooLib.h\n";

    fn package(path: &str, text: &str) -> Package {
        Package::new(Arc::new(parse_module_text(Path::new(path), text)))
    }

    #[test]
    fn test_identity_fields() {
        let pkg = package("/ws/FooPkg/FooPkg.dec", DEC);
        assert_eq!(pkg.name, "FooPkg");
        assert_eq!(pkg.package_root, EdkPath::from("/ws/FooPkg"));
        assert_eq!(pkg.platform_path(), EdkPath::from("/ws/FooPkg/FooPkg.dsc"));
        assert!(pkg.owns(Path::new("/ws/FooPkg/Library/Foo.c")));

        let unnamed = package("/ws/BarPkg/BarPkg.dec", "[Includes]\n  Include\n");
        assert_eq!(unnamed.name, "BarPkg");
    }

    #[test]
    fn test_library_classes_from_sibling_dsc() {
        let fs = TestFileSystem::new().with_file(
            "/ws/FooPkg/FooPkg.dsc",
            "[LibraryClasses]\n  FooLib|FooPkg/Library/FooLib/FooLib.inf\n[LibraryClasses.X64]\n  FooLib|FooPkg/Library/FooLibX64/FooLib.inf\n[Components]\n  FooPkg/App/App.inf\n",
        );
        let parser = DscParser::new(fs);
        let pkg = package("/ws/FooPkg/FooPkg.dec", DEC);

        let classes = pkg.library_classes(&parser);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[COMMON_ARCH][0].path, "FooPkg/Library/FooLib/FooLib.inf");
        assert_eq!(classes["X64"][0].path, "FooPkg/Library/FooLibX64/FooLib.inf");
        assert_eq!(pkg.components(&parser)[COMMON_ARCH], vec!["FooPkg/App/App.inf"]);
    }

    #[test]
    fn test_falls_back_to_declared_classes() {
        let parser = DscParser::new(TestFileSystem::new());
        let pkg = package("/ws/FooPkg/FooPkg.dec", DEC);

        let classes = pkg.library_classes(&parser);
        assert_eq!(classes[COMMON_ARCH][0].class_name, "FooLib");
        assert!(pkg.components(&parser).is_empty());
    }

    #[test]
    fn test_platform_parsed_once() {
        let mut fs = MockFileSystemTrait::new();
        fs.expect_exists().times(1).returning(|_| true);
        fs.expect_read_to_string()
            .times(1)
            .returning(|_| Ok("[Components]\n  A/A.inf\n".to_string()));
        let parser = DscParser::new(fs);
        let pkg = package("/ws/FooPkg/FooPkg.dec", DEC);

        assert_eq!(pkg.components(&parser)[COMMON_ARCH].len(), 1);
        assert_eq!(pkg.components(&parser)[COMMON_ARCH].len(), 1);
        assert!(pkg.library_classes(&parser).is_empty());
    }

    #[test]
    fn test_store_replaces_same_file() {
        let mut store = PackageStore::new();
        store.add(package("/ws/FooPkg/FooPkg.dec", DEC));
        store.add(package("/ws/FooPkg/FooPkg.dec", DEC));
        store.add(package("/other/FooPkg/FooPkg.dec", DEC));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("FooPkg").len(), 2);
        assert!(store.get("Missing").is_empty());
        assert!(store.by_path(Path::new("/ws/FooPkg/FooPkg.dec")).is_some());
        assert!(store.remove(Path::new("/ws/FooPkg/FooPkg.dec")).is_some());
        assert_eq!(store.len(), 1);
    }
}
