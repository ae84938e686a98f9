//! Path value type shared by parsers and stores
//!
//! EDK2 build files reference paths with forward slashes regardless of host
//! platform. `EdkPath` wraps a `PathBuf` and provides the handful of derived
//! accessors the parsers and stores need, with prefix/suffix containment
//! evaluated on the `/`-normalized text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdkPath(PathBuf);

impl EdkPath {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Final path component, or an empty string for roots
    pub fn basename(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Final component without its extension (`MdePkg.dec` -> `MdePkg`)
    pub fn stem(&self) -> String {
        self.0
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn extension(&self) -> Option<String> {
        self.0
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    pub fn parent(&self) -> EdkPath {
        EdkPath(
            self.0
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        )
    }

    /// Same path with its extension swapped (`Foo.dec` -> `Foo.dsc`)
    pub fn with_extension_replaced(&self, extension: &str) -> EdkPath {
        EdkPath(self.0.with_extension(extension))
    }

    /// Join a relative reference taken from a build file.
    ///
    /// Backslash separators are normalized first so `Include\Library` and
    /// `Include/Library` resolve to the same directory.
    pub fn join(&self, relative: &str) -> EdkPath {
        let normalized = relative.trim().replace('\\', "/");
        let mut joined = self.0.clone();
        for component in normalized.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    joined.pop();
                }
                other => joined.push(other),
            }
        }
        EdkPath(joined)
    }

    /// Path text with `/` separators
    pub fn normalized(&self) -> String {
        self.0.to_string_lossy().replace('\\', "/")
    }

    /// True when `prefix` is a leading path of this one (component-wise)
    pub fn has_prefix(&self, prefix: &Path) -> bool {
        self.0.starts_with(prefix)
    }

    /// True when the normalized text ends with `suffix` on a component boundary
    pub fn has_suffix(&self, suffix: &str) -> bool {
        let suffix = suffix.trim().replace('\\', "/");
        let suffix = suffix.trim_start_matches('/');
        if suffix.is_empty() {
            return false;
        }
        let text = self.normalized();
        if !text.ends_with(suffix) {
            return false;
        }
        let boundary = text.len() - suffix.len();
        boundary == 0 || text.as_bytes()[boundary - 1] == b'/'
    }

    /// Last `count` components joined with `/`
    pub fn tail(&self, count: usize) -> String {
        let text = self.normalized();
        let parts: Vec<&str> = text.split('/').filter(|part| !part.is_empty()).collect();
        let start = parts.len().saturating_sub(count);
        parts[start..].join("/")
    }
}

impl fmt::Display for EdkPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for EdkPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for EdkPath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for EdkPath {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl From<&str> for EdkPath {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let path = EdkPath::from("/repo/MdePkg/MdePkg.dec");
        assert_eq!(path.basename(), "MdePkg.dec");
        assert_eq!(path.stem(), "MdePkg");
        assert_eq!(path.extension().as_deref(), Some("dec"));
        assert_eq!(path.parent(), EdkPath::from("/repo/MdePkg"));
        assert_eq!(
            path.with_extension_replaced("dsc"),
            EdkPath::from("/repo/MdePkg/MdePkg.dsc")
        );
    }

    #[test]
    fn test_join_normalizes_separators() {
        let dir = EdkPath::from("/repo/Pkg/Driver");
        assert_eq!(dir.join("Bar\\Baz.c"), EdkPath::from("/repo/Pkg/Driver/Bar/Baz.c"));
        assert_eq!(dir.join("./Foo.c"), EdkPath::from("/repo/Pkg/Driver/Foo.c"));
        assert_eq!(dir.join("../Common/X.c"), EdkPath::from("/repo/Pkg/Common/X.c"));
    }

    #[test]
    fn test_suffix_respects_component_boundary() {
        let path = EdkPath::from("/repo/MdePkg/Library/BaseLib/BaseLib.inf");
        assert!(path.has_suffix("BaseLib/BaseLib.inf"));
        assert!(path.has_suffix("MdePkg\\Library\\BaseLib\\BaseLib.inf"));
        assert!(!path.has_suffix("eLib.inf"));
        assert!(!path.has_suffix(""));
    }

    #[test]
    fn test_prefix_and_tail() {
        let path = EdkPath::from("/repo/Silicon/Intel/FooPkg/FooPkg.dec");
        assert!(path.has_prefix(Path::new("/repo/Silicon")));
        assert!(!path.has_prefix(Path::new("/repo/Sil")));
        assert_eq!(path.tail(2), "FooPkg/FooPkg.dec");
        assert_eq!(EdkPath::from("a.dec").tail(2), "a.dec");
    }
}
