//! File-backed secret store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, trace};

use super::{check_entry_name, SecretStore};
use crate::error::StoreError;

/// One file per secret under a base directory
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    base_path: PathBuf,
}

impl FileSecretStore {
    /// Open the store, creating the directory (0700 on Unix) if needed
    pub async fn open(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(base_path, std::fs::Permissions::from_mode(0o700)).await?;
        }

        debug!(path = %base_path.display(), "Opened secret store");
        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn secret_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_entry_name(name)?;
        Ok(self.base_path.join(name))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.secret_path(name)?;

        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(secret = %name, "Read secret");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(secret = %name, "Secret not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_secret(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.secret_path(name)?;
        fs::write(&path, value).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!(secret = %name, "Stored secret");
        Ok(())
    }
}
