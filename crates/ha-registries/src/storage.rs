//! Versioned JSON documents under `<config>/.storage/`

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors reading or writing storage documents
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} is stored as version {found}, this build reads version {expected}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// Result type of storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Envelope every stored document is wrapped in
///
/// ```json
/// { "version": 1, "minor_version": 5, "key": "core.config_entries", "data": {} }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version, incompatible when different
    pub version: u32,
    /// Minor version, readable when older
    pub minor_version: u32,
    /// Storage key, also the file name
    pub key: String,
    /// The document itself
    pub data: T,
}

/// A document with a fixed key and version
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    /// Bumped on incompatible layout changes
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

/// Reads and writes documents in the `.storage` directory
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Read `T::KEY`; None when nothing was saved yet
    ///
    /// Another major version is refused, an older minor version only logged.
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let raw = match fs::read_to_string(self.path_for(T::KEY)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&raw)?;
        if file.version != T::VERSION {
            return Err(StorageError::VersionMismatch {
                key: T::KEY.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                stored = file.minor_version,
                current = T::MINOR_VERSION,
                "Reading document written with an older minor version"
            );
        }

        debug!(key = T::KEY, "Storage document read");
        Ok(Some(file.data))
    }

    /// Write `T::KEY` through a temp file and a rename, so readers never see
    /// a half-written document
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        fs::create_dir_all(&self.dir).await?;

        let file = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let target = self.path_for(T::KEY);
        let staging = self.path_for(&format!("{}.tmp", T::KEY));
        fs::write(&staging, json).await?;
        fs::rename(&staging, &target).await?;

        debug!(key = T::KEY, "Storage document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Devices {
        names: Vec<String>,
    }

    impl Storable for Devices {
        const KEY: &'static str = "core.device_registry";
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load::<Devices>().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_written_envelope() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let devices = Devices {
            names: vec!["Cellar".to_string()],
        };

        storage.save(&devices).await.unwrap();
        assert_eq!(storage.load::<Devices>().await.unwrap(), Some(devices));

        let raw = std::fs::read_to_string(storage.dir().join("core.device_registry")).unwrap();
        let envelope: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope["version"], 2);
        assert_eq!(envelope["minor_version"], 1);
        assert_eq!(envelope["key"], "core.device_registry");
        assert_eq!(envelope["data"]["names"][0], "Cellar");
    }

    #[tokio::test]
    async fn test_other_major_version_refused() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        std::fs::create_dir_all(storage.dir()).unwrap();
        std::fs::write(
            storage.dir().join("core.device_registry"),
            r#"{"version": 1, "minor_version": 9, "key": "core.device_registry", "data": {"names": []}}"#,
        )
        .unwrap();

        let result = storage.load::<Devices>().await;
        assert!(matches!(
            result,
            Err(StorageError::VersionMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        std::fs::create_dir_all(storage.dir()).unwrap();
        std::fs::write(storage.dir().join("core.device_registry"), "{not json").unwrap();

        assert!(matches!(
            storage.load::<Devices>().await,
            Err(StorageError::Json(_))
        ));
    }
}
