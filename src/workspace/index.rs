//! Workspace index: discovery, parallel parsing and snapshot publication
//!
//! A scan builds a complete [`Stores`] value off to the side and swaps it
//! in only when every file has been processed, so readers always see either
//! the previous index or the new one. Scans and incremental rescans are
//! serialized by one async mutex; a caller that arrives while a scan is
//! running waits for it and then performs its own full rebuild.

use chrono::Utc;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use lsp_types::Diagnostic;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{Level, debug, info, trace, warn};
use walkdir::WalkDir;

use crate::io::{FileSystemTrait, RealFileSystem};
use crate::parser::inf::parse_module_text;
use crate::parser::{DscDocument, DscParser, InfParser, ModuleRecord, PlatformData};
use crate::store::{LibraryRecord, LibraryStore, Package, SourceConfiguration, Stores};
use crate::workspace::{IndexConfig, IndexError, IndexEvent, ScanSummary};

const MODULE_PATTERN: &str = "**/*.inf";
const DECLARATION_PATTERN: &str = "**/*.dec";
const PLATFORM_PATTERN: &str = "**/*.dsc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FileKind {
    Module,
    Declaration,
    Platform,
}

impl FileKind {
    fn of(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match extension.as_str() {
            "inf" => Some(FileKind::Module),
            "dec" => Some(FileKind::Declaration),
            "dsc" => Some(FileKind::Platform),
            _ => None,
        }
    }
}

/// Build files found under the workspace root, sorted by path
#[derive(Debug, Default)]
struct DiscoveredFiles {
    modules: Vec<PathBuf>,
    declarations: Vec<PathBuf>,
    platforms: Vec<PathBuf>,
}

fn discovery_globs() -> Result<[GlobSet; 3], IndexError> {
    let build = |pattern: &str| -> Result<GlobSet, IndexError> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()?;
        Ok(GlobSetBuilder::new().add(glob).build()?)
    };
    Ok([
        build(MODULE_PATTERN)?,
        build(DECLARATION_PATTERN)?,
        build(PLATFORM_PATTERN)?,
    ])
}

/// Walk the workspace and classify build files by pattern
fn discover(root: &Path, config: &IndexConfig) -> Result<DiscoveredFiles, IndexError> {
    if !root.exists() {
        return Err(IndexError::PathNotFound {
            path: root.to_string_lossy().to_string(),
        });
    }
    if !root.is_dir() {
        return Err(IndexError::NotADirectory {
            path: root.to_string_lossy().to_string(),
        });
    }

    let [modules, declarations, platforms] = discovery_globs()?;
    let mut found = DiscoveredFiles::default();

    let walker = WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !config.is_excluded(&entry.file_name().to_string_lossy())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // The root itself being unreadable means nothing can be indexed
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Failed to access directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if modules.is_match(relative) {
            found.modules.push(path.to_path_buf());
        } else if declarations.is_match(relative) {
            found.declarations.push(path.to_path_buf());
        } else if platforms.is_match(relative) {
            found.platforms.push(path.to_path_buf());
        }
    }

    found.modules.sort();
    found.declarations.sort();
    found.platforms.sort();
    Ok(found)
}

/// SHA-256 of file content, hex encoded
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

enum ParsedFile {
    Module(ModuleRecord),
    Declaration(ModuleRecord),
    Platform(DscDocument),
}

struct ParseOutcome {
    path: PathBuf,
    fingerprint: Option<String>,
    parsed: ParsedFile,
}

fn read_text<F: FileSystemTrait>(fs: &F, path: &Path) -> Option<String> {
    match fs.read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// Parse one file from its already-read text; never fails
fn parse_file<F: FileSystemTrait>(
    dsc_parser: &DscParser<F>,
    kind: FileKind,
    path: &Path,
    text: Option<String>,
) -> ParseOutcome {
    let fingerprint = text.as_deref().map(fingerprint);
    let parsed = match (kind, text) {
        (FileKind::Module, Some(text)) => ParsedFile::Module(parse_module_text(path, &text)),
        (FileKind::Module, None) => ParsedFile::Module(ModuleRecord::empty(path)),
        (FileKind::Declaration, Some(text)) => {
            ParsedFile::Declaration(parse_module_text(path, &text))
        }
        (FileKind::Declaration, None) => ParsedFile::Declaration(ModuleRecord::empty(path)),
        (FileKind::Platform, Some(text)) => ParsedFile::Platform(dsc_parser.parse_text(path, &text)),
        // Produces the fatal "unable to open" diagnostic
        (FileKind::Platform, None) => ParsedFile::Platform(dsc_parser.parse(path)),
    };
    ParseOutcome {
        path: path.to_path_buf(),
        fingerprint,
        parsed,
    }
}

/// Put one parse result into the stores, replacing any previous state for
/// the same file. Returns the discovery event to publish, if any.
fn apply(stores: &mut Stores, outcome: ParseOutcome) -> Option<IndexEvent> {
    // Unreadable files keep their empty record or fatal diagnostic but are
    // not announced as discovered
    let readable = outcome.fingerprint.is_some();
    match outcome.fingerprint {
        Some(fingerprint) => {
            stores.fingerprints.insert(outcome.path.clone(), fingerprint);
        }
        None => {
            stores.fingerprints.remove(&outcome.path);
        }
    }

    match outcome.parsed {
        ParsedFile::Module(record) => {
            stores.infs.insert(Arc::new(record));
            None
        }
        ParsedFile::Declaration(record) => {
            let record = Arc::new(record);
            stores.decs.insert(Arc::clone(&record));
            let package = stores.packages.add(Package::new(record));
            readable.then_some(IndexEvent::PackageDiscovered(package))
        }
        ParsedFile::Platform(document) => {
            let errors = document.errors.len();
            let document = stores.platforms.insert(document);
            refresh_sibling_package(stores, &document.file_path);
            readable.then(|| IndexEvent::ProjectDiscovered {
                path: document.file_path.clone(),
                errors,
            })
        }
    }
}

/// Replace the package next to `dsc` so its platform view is reloaded
fn refresh_sibling_package(stores: &mut Stores, dsc: &Path) {
    let dec = dsc.with_extension("dec");
    if let Some(package) = stores.packages.by_path(&dec) {
        stores
            .packages
            .add(Package::new(Arc::clone(&package.declaration)));
    }
}

/// Drop every trace of a file that no longer exists
fn forget(stores: &mut Stores, path: &Path, kind: FileKind) -> bool {
    stores.fingerprints.remove(path);
    match kind {
        FileKind::Module => stores.infs.forget(path).is_some(),
        FileKind::Declaration => {
            let removed = stores.decs.remove(path).is_some();
            stores.packages.remove(path).is_some() || removed
        }
        FileKind::Platform => {
            let removed = stores.platforms.remove(path).is_some();
            refresh_sibling_package(stores, path);
            removed
        }
    }
}

/// Recompute library implementations from modules and package mappings
fn rebuild_libraries<F: FileSystemTrait>(
    stores: &mut Stores,
    dsc_parser: &DscParser<F>,
    root: &Path,
) {
    for package in stores.packages.packages() {
        if let Some(document) = stores.platforms.get(package.platform_path().as_path()) {
            package.preload_platform(document.reduce());
        }
    }

    let mut modules: Vec<&Arc<ModuleRecord>> = stores.infs.modules().collect();
    modules.sort_by(|a, b| a.path.cmp(&b.path));

    let mut libraries = LibraryStore::new();
    for module in modules {
        libraries.index_module(module);
    }
    for package in stores.packages.packages() {
        libraries.scan_libraries(package, dsc_parser, &stores.infs, root);
    }
    stores.libraries = libraries;
}

/// Index of one EDK2 workspace root
pub struct WorkspaceIndex<F: FileSystemTrait = RealFileSystem> {
    root: PathBuf,
    config: IndexConfig,
    fs: F,
    scan_lock: Mutex<()>,
    stores: RwLock<Arc<Stores>>,
    subscribers: StdMutex<Vec<UnboundedSender<IndexEvent>>>,
}

impl WorkspaceIndex<RealFileSystem> {
    pub fn new(root: PathBuf, config: IndexConfig) -> Self {
        Self::with_file_system(root, config, RealFileSystem)
    }
}

impl<F: FileSystemTrait + 'static> WorkspaceIndex<F> {
    pub fn with_file_system(root: PathBuf, config: IndexConfig, fs: F) -> Self {
        Self {
            root,
            config,
            fs,
            scan_lock: Mutex::new(()),
            stores: RwLock::new(Arc::new(Stores::default())),
            subscribers: StdMutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Receive discovery events from now on, in the order they are raised
    pub fn subscribe(&self) -> UnboundedReceiver<IndexEvent> {
        let (sender, receiver) = unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    fn publish(&self, events: Vec<IndexEvent>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for event in events {
            trace!("Publishing {}", event.kind());
            // Receivers that were dropped are pruned
            subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
        }
    }

    fn dsc_parser(&self) -> DscParser<F> {
        DscParser::new(self.fs.clone()).with_workspace_root(self.root.clone())
    }

    /// Current stores; cheap to take and unaffected by later scans
    pub async fn snapshot(&self) -> Arc<Stores> {
        Arc::clone(&*self.stores.read().await)
    }

    async fn publish_stores(&self, stores: Stores) {
        let mut current = self.stores.write().await;
        *current = Arc::new(stores);
    }

    /// Discover and parse every build file, then replace the whole index
    pub async fn scan(&self) -> Result<ScanSummary, IndexError> {
        let _guard = self.scan_lock.lock().await;
        let started = Instant::now();
        info!("Scanning EDK2 workspace {}", self.root.display());

        let root = self.root.clone();
        let config = self.config.clone();
        let files = tokio::task::spawn_blocking(move || discover(&root, &config)).await??;
        debug!(
            "Discovered {} modules, {} packages, {} platforms",
            files.modules.len(),
            files.declarations.len(),
            files.platforms.len()
        );

        let mut work: Vec<(FileKind, PathBuf)> = Vec::new();
        if self.config.eager_modules {
            work.extend(files.modules.iter().map(|p| (FileKind::Module, p.clone())));
        }
        work.extend(
            files
                .declarations
                .iter()
                .map(|p| (FileKind::Declaration, p.clone())),
        );
        work.extend(files.platforms.iter().map(|p| (FileKind::Platform, p.clone())));

        let mut tasks = JoinSet::new();
        for (kind, path) in work {
            let fs = self.fs.clone();
            let dsc_parser = self.dsc_parser();
            tasks.spawn_blocking(move || {
                let text = read_text(&fs, &path);
                (kind, parse_file(&dsc_parser, kind, &path, text))
            });
        }

        let mut outcomes = Vec::new();
        let mut failed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    failed += 1;
                    warn!("Parse task failed, file skipped: {}", e);
                }
            }
        }
        // Join order is arbitrary; apply and report in a stable order
        outcomes.sort_by(|(a_kind, a), (b_kind, b)| {
            a_kind.cmp(b_kind).then_with(|| a.path.cmp(&b.path))
        });

        let dsc_parser = self.dsc_parser();
        let root = self.root.clone();
        let module_files = files.modules;
        let (stores, events) = tokio::task::spawn_blocking(move || {
            let mut stores = Stores::default();
            stores.infs.set_files(module_files);
            let events: Vec<IndexEvent> = outcomes
                .into_iter()
                .filter_map(|(_, outcome)| apply(&mut stores, outcome))
                .collect();
            rebuild_libraries(&mut stores, &dsc_parser, &root);
            (stores, events)
        })
        .await?;

        let elapsed = started.elapsed();
        let summary = ScanSummary {
            root: self.root.clone(),
            modules: stores.infs.len(),
            packages: stores.packages.len(),
            platforms: stores.platforms.len(),
            library_classes: stores.libraries.grouped().len(),
            failed,
            duration_ms: elapsed.as_millis() as u64,
            completed_at: Utc::now(),
        };
        let total_files = summary.modules + summary.packages + summary.platforms;

        self.publish_stores(stores).await;

        crate::log_timing!(Level::INFO, "workspace_scan", elapsed, total_files);
        info!(
            "Indexed {} modules, {} packages, {} platforms",
            summary.modules, summary.packages, summary.platforms
        );

        let mut events = events;
        events.push(IndexEvent::ScanCompleted(summary.clone()));
        self.publish(events);
        Ok(summary)
    }

    /// Re-index a single file after it changed on disk.
    ///
    /// A DSC include (`.dsc.inc` and similar) re-parses every platform that
    /// pulled it in. Unchanged content is detected by fingerprint and
    /// skipped. Build files in directories that discovery excludes are
    /// ignored. Returns whether the index changed.
    pub async fn rescan_file(&self, path: &Path) -> Result<bool, IndexError> {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return Err(IndexError::OutsideWorkspace {
                path: path.to_string_lossy().to_string(),
            });
        };
        if FileKind::of(path).is_some() && self.config.excludes_path(relative) {
            debug!("{} is in an excluded directory", path.display());
            return Ok(false);
        }

        let _guard = self.scan_lock.lock().await;
        let current = self.snapshot().await;

        let targets: Vec<(PathBuf, FileKind)> = match FileKind::of(path) {
            Some(kind) => vec![(path.to_path_buf(), kind)],
            None => current
                .platforms
                .platforms_including(path)
                .iter()
                .map(|document| (document.file_path.clone(), FileKind::Platform))
                .collect(),
        };
        if targets.is_empty() {
            debug!("{} is not part of the index", path.display());
            return Ok(false);
        }

        let fs = self.fs.clone();
        let dsc_parser = self.dsc_parser();
        let root = self.root.clone();
        let changed_path = path.to_path_buf();

        let update = tokio::task::spawn_blocking(move || {
            let mut stores = Stores::clone(&current);
            let mut events = Vec::new();
            let mut changed = false;

            for (target, kind) in targets {
                if !fs.exists(&target) {
                    debug!("{} no longer exists", target.display());
                    changed |= forget(&mut stores, &target, kind);
                    continue;
                }

                let text = read_text(&fs, &target);
                let new_fingerprint = text.as_deref().map(fingerprint);
                if target == changed_path
                    && new_fingerprint.is_some()
                    && stores.fingerprints.get(&target) == new_fingerprint.as_ref()
                {
                    debug!("{} is unchanged", target.display());
                    continue;
                }

                events.extend(apply(&mut stores, parse_file(&dsc_parser, kind, &target, text)));
                changed = true;
            }

            if changed {
                rebuild_libraries(&mut stores, &dsc_parser, &root);
                Some((stores, events))
            } else {
                None
            }
        })
        .await?;

        match update {
            Some((stores, events)) => {
                self.publish_stores(stores).await;
                info!("Re-indexed {}", path.display());
                self.publish(events);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Modules whose INF lives under `root`, parsing any the scan skipped
    pub async fn modules_under_path(
        &self,
        root: &Path,
    ) -> Result<Vec<Arc<ModuleRecord>>, IndexError> {
        let _guard = self.scan_lock.lock().await;
        let current = self.snapshot().await;
        if current.infs.files_under(root).all(|file| current.infs.get(file).is_some()) {
            return Ok(current
                .infs
                .files_under(root)
                .filter_map(|file| current.infs.get(file))
                .collect());
        }

        let parser = InfParser::new(self.fs.clone());
        let dsc_parser = self.dsc_parser();
        let workspace_root = self.root.clone();
        let root = root.to_path_buf();
        let (stores, modules) = tokio::task::spawn_blocking(move || {
            let mut stores = Stores::clone(&current);
            let modules = stores.infs.modules_under_path(&root, &parser);
            rebuild_libraries(&mut stores, &dsc_parser, &workspace_root);
            (stores, modules)
        })
        .await?;

        self.publish_stores(stores).await;
        Ok(modules)
    }

    pub async fn modules_for_source(&self, source: &Path) -> Vec<Arc<ModuleRecord>> {
        self.snapshot().await.infs.modules_for_source(source)
    }

    pub async fn has_configuration_for(&self, source: &Path) -> bool {
        self.snapshot().await.infs.has_configuration_for(source)
    }

    pub async fn configurations_for(&self, source: &Path) -> Vec<SourceConfiguration> {
        let stores = self.snapshot().await;
        stores.infs.configurations_for(source, &stores.decs)
    }

    pub async fn include_paths_for(&self, source: &Path) -> Vec<PathBuf> {
        let stores = self.snapshot().await;
        stores.infs.include_paths_for(source, &stores.decs)
    }

    pub async fn library_implementations(&self, class_name: &str) -> Vec<Arc<LibraryRecord>> {
        self.snapshot().await.libraries.implementations(class_name)
    }

    pub async fn library_classes(&self) -> BTreeMap<String, Vec<Arc<LibraryRecord>>> {
        self.snapshot().await.libraries.grouped()
    }

    pub async fn packages(&self) -> Vec<Arc<Package>> {
        self.snapshot().await.packages.packages().to_vec()
    }

    /// Reduced view of a parsed platform
    pub async fn platform(&self, dsc: &Path) -> Option<PlatformData> {
        self.snapshot()
            .await
            .platforms
            .get(dsc)
            .map(|document| document.reduce())
    }

    pub async fn platform_document(&self, dsc: &Path) -> Option<Arc<DscDocument>> {
        self.snapshot().await.platforms.get(dsc)
    }

    /// Diagnostics located in `path`, which may be a platform or an included file
    pub async fn diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        self.snapshot().await.platforms.diagnostics_for(path)
    }

    pub async fn resolve_library_override(
        &self,
        dsc: &Path,
        class_name: &str,
        arch: &str,
    ) -> Option<Arc<LibraryRecord>> {
        let stores = self.snapshot().await;
        stores
            .platforms
            .resolve_library_override(dsc, class_name, arch, &stores.libraries)
    }
}
