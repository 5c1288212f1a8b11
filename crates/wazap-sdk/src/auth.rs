use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Credential material loaded from the auth directory's multi-file format
/// (one JSON file for the noise/signal keys, one for registration state,
/// per the provider's on-disk layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub files: std::collections::BTreeMap<String, serde_json::Value>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Persists and loads the multi-file auth directory. A real implementation
/// walks `dir` reading/writing the provider's JSON files; this trait lets
/// the connection supervisor depend on the operation, not the format.
pub trait AuthStore: Send + Sync {
    fn load(&self) -> Result<Credentials>;
    fn save(&self, creds: &Credentials) -> Result<()>;
    /// Invoked on a hard-logout disconnect reason — the supervisor must not
    /// reconnect afterward.
    fn wipe(&self) -> Result<()>;
}

/// Filesystem-backed `AuthStore` rooted at a configured directory.
pub struct FileAuthStore {
    dir: PathBuf,
}

impl FileAuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn creds_path(&self) -> PathBuf {
        self.dir.join("creds.json")
    }
}

impl AuthStore for FileAuthStore {
    fn load(&self) -> Result<Credentials> {
        let path = self.creds_path();
        if !path.exists() {
            return Ok(Credentials {
                files: Default::default(),
            });
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| SdkError::AuthStore(format!("reading {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| SdkError::AuthStore(format!("parsing {}: {}", path.display(), e)))
    }

    fn save(&self, creds: &Credentials) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| SdkError::AuthStore(format!("creating {}: {}", self.dir.display(), e)))?;
        let raw = serde_json::to_string_pretty(creds)
            .map_err(|e| SdkError::AuthStore(format!("serializing credentials: {}", e)))?;
        std::fs::write(self.creds_path(), raw)
            .map_err(|e| SdkError::AuthStore(format!("writing credentials: {}", e)))
    }

    fn wipe(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)
                .map_err(|e| SdkError::AuthStore(format!("wiping {}: {}", self.dir.display(), e)))?;
        }
        Ok(())
    }
}

/// Where QR codes are written for out-of-band scanning (log + a side
/// channel file under the configured QR directory).
pub fn qr_file_path(qr_dir: &Path) -> PathBuf {
    qr_dir.join("latest.qr")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_on_missing_file_returns_empty_credentials() {
        let dir = std::env::temp_dir().join(format!("wazap-sdk-test-{}", std::process::id()));
        let store = FileAuthStore::new(&dir);
        let creds = store.load().unwrap();
        assert!(creds.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("wazap-sdk-test-rt-{}", std::process::id()));
        let store = FileAuthStore::new(&dir);
        let mut creds = Credentials {
            files: Default::default(),
        };
        creds.files.insert("noise".to_string(), serde_json::json!({"key": "abc"}));
        store.save(&creds).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.files["noise"]["key"], "abc");

        store.wipe().unwrap();
    }
}
