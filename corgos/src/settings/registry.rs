use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::store::Settings;

/// Process-wide map from backing path to its single [`Settings`] instance.
///
/// Created once at startup and passed to whoever needs settings. Opening the
/// same path twice returns the same instance, so there is never more than one
/// in-memory copy of a file.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    instances: Arc<DashMap<PathBuf, Arc<Settings>>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instance for `path`, creating an empty (unloaded) one on first use.
    pub fn open(&self, path: impl AsRef<Path>) -> Arc<Settings> {
        let key = normalize(path.as_ref());
        self.instances
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(path = %key.display(), "Creating settings instance");
                Arc::new(Settings::new(key))
            })
            .value()
            .clone()
    }

    /// Number of distinct backing paths opened so far.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Resolve `path` to the file it names: `..` and symlinks are followed, so
/// every spelling of one file maps to the same key. A file that does not
/// exist yet is keyed by its resolved parent directory.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }

    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_same_path_same_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, json!({"key1": "value1"}).to_string())
            .await
            .unwrap();

        let registry = SettingsRegistry::new();
        let first = registry.open(&path);
        let second = registry.open(&path);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        first.load().await.unwrap();
        first.set("key1", "new_value1").await.unwrap();

        // no explicit load on the second handle
        assert_eq!(second.get::<String>("key1").await.unwrap(), "new_value1");
    }

    #[tokio::test]
    async fn test_distinct_paths_distinct_instances() {
        let dir = TempDir::new().unwrap();
        let registry = SettingsRegistry::new();
        let a = registry.open(dir.path().join("a.json"));
        let b = registry.open(dir.path().join("b.json"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_dotdot_path_same_instance() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        tokio::fs::create_dir(&sub).await.unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, json!({"key1": "value1"}).to_string())
            .await
            .unwrap();

        let registry = SettingsRegistry::new();
        let direct = registry.open(&path);
        let dotted = registry.open(sub.join("..").join("settings.json"));
        assert!(Arc::ptr_eq(&direct, &dotted));
        assert_eq!(registry.len(), 1);

        // same for a file that is not written yet
        let fresh = registry.open(dir.path().join("later.json"));
        let fresh_dotted = registry.open(sub.join("..").join("later.json"));
        assert!(Arc::ptr_eq(&fresh, &fresh_dotted));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clones_share_instances() {
        let registry = SettingsRegistry::new();
        let clone = registry.clone();
        let a = registry.open("settings.json");
        let b = clone.open("./settings.json");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }
}
