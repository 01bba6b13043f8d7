//! Atomic persistence of the daemon's configuration document.
//!
//! [`ConfigStore::save`] writes to a sibling temporary file and renames it
//! over the target, so readers see either the old document or the new one,
//! never a truncated file. The store holds no lock: two concurrent
//! read-modify-write cycles against the same file resolve as last writer
//! wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::document::ConfigDocument;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors from loading or persisting the configuration document.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("config at {path} is corrupt: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("failed to read config at {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("permission denied writing config at {path}: {source}")]
    PersistDenied {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config at {path}: {source}")]
    PersistIo {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Reads and atomically writes the daemon's config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or the default document if the file does not exist.
    pub async fn load(&self) -> Result<ConfigDocument, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Config file not found, using defaults");
                return Ok(ConfigDocument::default());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(StoreError::ConfigCorrupt {
                    path: self.path.clone(),
                    reason: format!("not valid UTF-8: {e}"),
                });
            }
            Err(e) => {
                return Err(StoreError::Unreadable {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let doc = ConfigDocument::parse(&content).map_err(|e| StoreError::ConfigCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        debug!(path = %self.path.display(), peers = doc.peers.len(), "Loaded config");
        Ok(doc)
    }

    /// Write the document as canonical JSON, replacing the file atomically.
    pub async fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        let rendered = doc.to_canonical_json().map_err(|e| StoreError::PersistIo {
            path: self.path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, e),
        })?;

        let target = self.resolve_target().await.map_err(|e| self.persist_error(e))?;
        let tmp_path = temp_path(&target);
        if let Err(e) = write_replace(&target, &tmp_path, rendered.as_bytes()).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(self.persist_error(e));
        }
        if let Some(parent) = target.parent()
            && let Err(e) = sync_dir(parent).await
        {
            warn!(dir = %parent.display(), error = %e, "Failed to sync config directory");
        }

        info!(path = %self.path.display(), peers = doc.peers.len(), "Saved config");
        Ok(())
    }

    /// The file a save replaces. A symlinked config path keeps its link and
    /// the write lands on the file it points to.
    async fn resolve_target(&self) -> std::io::Result<PathBuf> {
        match tokio::fs::canonicalize(&self.path).await {
            Ok(resolved) => Ok(resolved),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(self.path.clone()),
            Err(e) => Err(e),
        }
    }

    fn persist_error(&self, source: std::io::Error) -> StoreError {
        let path = self.path.clone();
        match source.kind() {
            ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem => {
                StoreError::PersistDenied { path, source }
            }
            _ => StoreError::PersistIo { path, source },
        }
    }
}

async fn write_replace(target: &Path, tmp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    // The daemon config carries the node's private key; keep whatever
    // mode the operator gave the original file.
    match tokio::fs::metadata(target).await {
        Ok(meta) => tokio::fs::set_permissions(tmp_path, meta.permissions()).await?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o600);
                tokio::fs::set_permissions(tmp_path, perms).await?;
            }
        }
        Err(e) => return Err(e),
    }

    tokio::fs::rename(tmp_path, target).await
}

fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.tmp-{}-{seq}", std::process::id()))
}

/// Make the rename itself durable.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ALL_IPV6_ROUTE;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test_log::test(tokio::test)]
    async fn test_load_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("yggdrasil.conf"));
        let doc = store.load().await.unwrap();
        assert_eq!(doc, ConfigDocument::default());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("yggdrasil.conf"));

        let mut doc = ConfigDocument::default();
        doc.merge_peers(["tcp://a:9001", "tls://b:443"]);
        doc.tunnel_routing.enable_exit();
        doc.extra
            .insert("IfName".to_string(), serde_json::Value::from("auto"));

        store.save(&doc).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, doc);
    }

    #[tokio::test]
    async fn test_save_normalizes_toml_to_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("yggdrasil.conf");
        tokio::fs::write(
            &path,
            "# comment\nPeers = [\"tcp://a:9001\"]\n[TunnelRouting]\nEnable = true\nIPv6Destinations = [\"::/0\"]\n",
        )
        .await
        .unwrap();

        let store = ConfigStore::new(&path);
        let doc = store.load().await.unwrap();
        store.save(&doc).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        let as_json: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(as_json["Peers"][0], "tcp://a:9001");
        assert_eq!(as_json["TunnelRouting"]["IPv6Destinations"][0], ALL_IPV6_ROUTE);
        assert_eq!(store.load().await.unwrap(), doc);
    }

    #[test_log::test(tokio::test)]
    async fn test_load_corrupt_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("yggdrasil.conf");
        tokio::fs::write(&path, b"{{{ definitely [not config")
            .await
            .unwrap();

        let result = ConfigStore::new(&path).load().await;
        assert!(matches!(result, Err(StoreError::ConfigCorrupt { .. })));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("yggdrasil.conf"));
        store.save(&ConfigDocument::default()).await.unwrap();
        store.save(&ConfigDocument::default()).await.unwrap();

        let mut entries = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["yggdrasil.conf".to_string()]);
    }

    #[test_log::test(tokio::test)]
    async fn test_save_into_missing_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let store = ConfigStore::new(tmp.path().join("missing").join("yggdrasil.conf"));
        let result = store.save(&ConfigDocument::default()).await;
        assert!(matches!(result, Err(StoreError::PersistIo { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("yggdrasil.conf");
        tokio::fs::write(&path, b"{}").await.unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        ConfigStore::new(&path)
            .save(&ConfigDocument::default())
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_save_into_read_only_directory_is_denied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked = tmp.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).unwrap();

        // root ignores directory modes
        if std::fs::write(locked.join("write-check"), b"").is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = ConfigStore::new(locked.join("yggdrasil.conf"));
        let result = store.save(&ConfigDocument::default()).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(StoreError::PersistDenied { .. })));
        assert!(!locked.join("yggdrasil.conf").exists());
    }

    #[cfg(unix)]
    #[test_log::test(tokio::test)]
    async fn test_save_through_symlink_keeps_link() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real.conf");
        let link = tmp.path().join("yggdrasil.conf");
        tokio::fs::write(&real, b"{}").await.unwrap();
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut doc = ConfigDocument::default();
        doc.merge_peers(["tcp://a:9001"]);
        ConfigStore::new(&link).save(&doc).await.unwrap();

        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        let saved = ConfigStore::new(&real).load().await.unwrap();
        assert_eq!(saved.peers, vec!["tcp://a:9001"]);
    }
}
