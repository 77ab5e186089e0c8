//! On-disk session storage layout
//!
//! Engines keep credentials and browser profiles under
//! `<session_root>/<engine_type>/<instance_key>/`. This module owns that
//! layout: path resolution, discovery of persisted instances and forced
//! removal.

use crate::error::{Result, SessionError};
use crate::types::EngineType;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Attempts made by `remove` before giving up
const REMOVE_ATTEMPTS: u32 = 3;

/// Reject keys that cannot safely name a directory
pub fn validate_instance_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(SessionError::InvalidRequest(
            "Instance key must not be empty".to_string(),
        ));
    }
    if key == "." || key == ".." || key.contains('/') || key.contains('\\') || key.contains('\0')
    {
        return Err(SessionError::InvalidRequest(format!(
            "Invalid instance key '{}'",
            key
        )));
    }
    Ok(())
}

/// Session directories rooted at one path
#[derive(Debug, Clone)]
pub struct SessionStorage {
    root: PathBuf,
}

impl SessionStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every instance of an engine type
    pub fn engine_dir(&self, engine_type: EngineType) -> PathBuf {
        self.root.join(engine_type.as_str())
    }

    /// Directory of one instance
    pub fn session_dir(&self, engine_type: EngineType, instance_key: &str) -> PathBuf {
        self.engine_dir(engine_type).join(instance_key)
    }

    pub async fn exists(&self, engine_type: EngineType, instance_key: &str) -> bool {
        tokio::fs::metadata(self.session_dir(engine_type, instance_key))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Instance keys persisted for an engine type
    ///
    /// A missing root yields no keys. Hidden entries, plain files and
    /// `*json*` housekeeping names are skipped. Keys are sorted.
    pub async fn list_keys(&self, engine_type: EngineType) -> Result<Vec<String>> {
        let dir = self.engine_dir(engine_type);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name.contains("json") {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            keys.push(name);
        }
        keys.sort();

        tracing::debug!(
            path = %dir.display(),
            count = keys.len(),
            "Persisted sessions discovered"
        );
        Ok(keys)
    }

    /// Forcefully remove an instance directory; absent is success
    pub async fn remove(&self, engine_type: EngineType, instance_key: &str) -> Result<()> {
        validate_instance_key(instance_key)?;
        let dir = self.session_dir(engine_type, instance_key);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    tracing::debug!(path = %dir.display(), "Session directory removed");
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) if attempt < REMOVE_ATTEMPTS => {
                    // Engines may still be releasing file handles
                    tracing::debug!(path = %dir.display(), error = %e, attempt, "Retrying removal");
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => {
                    return Err(SessionError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to remove {}: {}", dir.display(), e),
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_instance_key() {
        assert!(validate_instance_key("tenant-a").is_ok());
        assert!(validate_instance_key("5511_x.y").is_ok());
        for bad in ["", "  ", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                validate_instance_key(bad),
                Err(SessionError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_layout() {
        let storage = SessionStorage::new("/data");
        assert_eq!(
            storage.session_dir(EngineType::Wppconnect, "k1"),
            PathBuf::from("/data/wppconnect/k1")
        );
    }

    #[tokio::test]
    async fn test_list_keys_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path().join("nope"));
        assert!(storage.list_keys(EngineType::Wppconnect).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_filters_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());
        let engine_dir = storage.engine_dir(EngineType::Wppconnect);
        for name in ["beta", "alpha", ".hidden", "tokens.json.bak"] {
            std::fs::create_dir_all(engine_dir.join(name)).unwrap();
        }
        std::fs::write(engine_dir.join("plain-file"), b"x").unwrap();

        let keys = storage.list_keys(EngineType::Wppconnect).await.unwrap();
        assert_eq!(keys, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SessionStorage::new(dir.path());
        let session = storage.session_dir(EngineType::Wppconnect, "k1");
        std::fs::create_dir_all(session.join("Default")).unwrap();
        std::fs::write(session.join("Default/Cookies"), b"x").unwrap();

        assert!(storage.exists(EngineType::Wppconnect, "k1").await);
        storage.remove(EngineType::Wppconnect, "k1").await.unwrap();
        assert!(!storage.exists(EngineType::Wppconnect, "k1").await);

        // Removing again is a no-op
        storage.remove(EngineType::Wppconnect, "k1").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_rejects_traversal() {
        let storage = SessionStorage::new("/data");
        assert!(storage.remove(EngineType::Wppconnect, "..").await.is_err());
    }
}
