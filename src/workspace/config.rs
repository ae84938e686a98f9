use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Component, Path};

/// Options that control how a workspace is discovered and indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory names whose contents are never indexed (build output)
    pub exclude_dirs: Vec<String>,

    /// Skip hidden directories (starting with '.')
    pub skip_hidden: bool,

    /// Follow symbolic links during traversal
    pub follow_symlinks: bool,

    /// Parse every module during a scan; when false, modules are parsed on
    /// first query through `modules_under_path`
    pub eager_modules: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: vec!["Build".to_string()],
            skip_hidden: true,
            follow_symlinks: false,
            eager_modules: true,
        }
    }
}

impl IndexConfig {
    /// Create IndexConfig from environment variables
    ///
    /// `EDK2_INDEX_EXCLUDE` is a comma-separated list that replaces the
    /// default exclusions.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(excluded) = lookup("EDK2_INDEX_EXCLUDE") {
            config.exclude_dirs = split_list(&excluded);
        }
        if let Some(follow) = lookup("EDK2_INDEX_FOLLOW_SYMLINKS") {
            config.follow_symlinks = follow == "true";
        }
        if let Some(lazy) = lookup("EDK2_INDEX_LAZY_MODULES") {
            config.eager_modules = lazy != "true";
        }

        config
    }

    /// Override values from CLI arguments; `exclude` adds to the exclusions
    pub fn with_overrides(mut self, exclude: Vec<String>, follow_symlinks: bool) -> Self {
        for name in exclude {
            if !self.exclude_dirs.contains(&name) {
                self.exclude_dirs.push(name);
            }
        }
        if follow_symlinks {
            self.follow_symlinks = true;
        }
        self
    }

    /// Whether a directory name is excluded from discovery
    pub fn is_excluded(&self, dir_name: &str) -> bool {
        (self.skip_hidden && dir_name.starts_with('.') && dir_name.len() > 1)
            || self.exclude_dirs.iter().any(|excluded| excluded == dir_name)
    }

    /// Whether any directory on `relative` (a path below the workspace root)
    /// is excluded; the final component is treated as the file name
    pub fn excludes_path(&self, relative: &Path) -> bool {
        relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|component| match component {
                Component::Normal(name) => self.is_excluded(&name.to_string_lossy()),
                _ => false,
            })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> IndexConfig {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        IndexConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, IndexConfig::default());
        assert!(config.is_excluded("Build"));
        assert!(config.is_excluded(".git"));
        assert!(!config.is_excluded("MdePkg"));
        assert!(!config.is_excluded("."));
    }

    #[test]
    fn test_env_values() {
        let config = config_from(&[
            ("EDK2_INDEX_EXCLUDE", "Build, Conf ,,"),
            ("EDK2_INDEX_FOLLOW_SYMLINKS", "true"),
            ("EDK2_INDEX_LAZY_MODULES", "true"),
        ]);
        assert_eq!(config.exclude_dirs, vec!["Build", "Conf"]);
        assert!(config.follow_symlinks);
        assert!(!config.eager_modules);
    }

    #[test]
    fn test_excludes_path_checks_directories_only() {
        let config = IndexConfig::default();
        assert!(config.excludes_path(Path::new("Build/Out/Copy/Copy.inf")));
        assert!(config.excludes_path(Path::new("MdePkg/.cache/Foo.inf")));
        assert!(!config.excludes_path(Path::new("MdePkg/Library/BaseLib/BaseLib.inf")));
        assert!(!config.excludes_path(Path::new("Build.inf")));
    }

    #[test]
    fn test_overrides() {
        let config = IndexConfig::default()
            .with_overrides(vec!["Conf".to_string(), "Build".to_string()], true);
        assert_eq!(config.exclude_dirs, vec!["Build", "Conf"]);
        assert!(config.is_excluded("Build"));
        assert!(config.is_excluded("Conf"));
        assert!(config.follow_symlinks);

        let unchanged = IndexConfig::default().with_overrides(Vec::new(), false);
        assert_eq!(unchanged, IndexConfig::default());
    }
}
