//! File-backed certificate store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, trace};
use uuid::Uuid;

use super::{check_entry_name, CertificateRef, CertificateStore, CertificateVersion, Stage};
use crate::acme::IssuedCertificate;
use crate::error::StoreError;
use crate::pki::{certificate_der, CertificateInfo};

const META_FILE: &str = "meta.json";
const VERSION_FILE: &str = "version.json";
const VERSIONS_DIR: &str = "versions";

/// Certificates as directories of numbered versions
#[derive(Debug, Clone)]
pub struct FileCertificateStore {
    base_path: PathBuf,
}

impl FileCertificateStore {
    /// Open the store, creating the directory if needed
    pub async fn open(base_path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_path).await?;

        info!(
            storage_path = %base_path.display(),
            "Initialized certificate storage"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn certificate_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_entry_name(name)?;
        Ok(self.base_path.join(name))
    }

    fn version_path(certificate_path: &Path, version_number: u64) -> PathBuf {
        certificate_path
            .join(VERSIONS_DIR)
            .join(version_number.to_string())
    }

    /// Every stored version, unordered
    async fn read_versions(
        &self,
        certificate_path: &Path,
    ) -> Result<Vec<CertificateVersion>, StoreError> {
        let versions_path = certificate_path.join(VERSIONS_DIR);

        let mut entries = match fs::read_dir(&versions_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // staged writes are not versions yet
            let numbered = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<u64>().is_ok());
            if !numbered || !entry.file_type().await?.is_dir() {
                continue;
            }
            let content = fs::read_to_string(entry.path().join(VERSION_FILE)).await?;
            versions.push(serde_json::from_str(&content)?);
        }

        Ok(versions)
    }

    async fn write_version_meta(
        version_path: &Path,
        version: &CertificateVersion,
    ) -> Result<(), StoreError> {
        let path = version_path.join(VERSION_FILE);
        fs::write(&path, serde_json::to_string_pretty(version)?).await?;
        Ok(())
    }

    /// Write the PEM files and metadata of a new version
    ///
    /// Files go to a staging directory that is renamed into place last, so a
    /// failed attempt never leaves a listed version behind.
    async fn write_version(
        &self,
        certificate_path: &Path,
        version_number: u64,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> Result<CertificateVersion, StoreError> {
        let not_after = leaf_not_after(&issued.leaf_pem)?;
        let created_at = Utc::now();

        let version = CertificateVersion {
            version_number,
            name: created_at.timestamp().to_string(),
            stage,
            not_after,
            created_at,
        };

        let version_path = Self::version_path(certificate_path, version_number);
        let staging_path = certificate_path
            .join(VERSIONS_DIR)
            .join(format!(".{}.partial", version_number));

        match fs::remove_dir_all(&staging_path).await {
            Ok(()) => debug!(path = %staging_path.display(), "Removed stale staged version"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&staging_path).await?;

        fs::write(staging_path.join("cert.pem"), &issued.leaf_pem).await?;
        fs::write(staging_path.join("chain.pem"), issued.chain_pem()).await?;

        let key_path = staging_path.join("key.pem");
        fs::write(&key_path, &issued.private_key_pem).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Self::write_version_meta(&staging_path, &version).await?;
        fs::rename(&staging_path, &version_path).await?;

        trace!(
            path = %version_path.display(),
            version = version_number,
            stage = %stage,
            "Wrote certificate version"
        );
        Ok(version)
    }
}

/// Expiry of the leaf certificate of a PEM bundle
fn leaf_not_after(leaf_pem: &str) -> Result<DateTime<Utc>, StoreError> {
    let der = certificate_der(leaf_pem.as_bytes())
        .map_err(|e| StoreError::InvalidCertificate(e.to_string()))?;
    let info =
        CertificateInfo::from_der(&der).map_err(|e| StoreError::InvalidCertificate(e.to_string()))?;
    Ok(info.not_after)
}

#[async_trait]
impl CertificateStore for FileCertificateStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<CertificateRef>, StoreError> {
        let meta_path = self.certificate_path(name)?.join(META_FILE);

        match fs::read_to_string(&meta_path).await {
            Ok(content) => {
                let certificate: CertificateRef = serde_json::from_str(&content)?;
                debug!(name = %name, id = %certificate.id, "Found stored certificate");
                Ok(Some(certificate))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(name = %name, "No stored certificate found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(
        &self,
        certificate: &CertificateRef,
    ) -> Result<Vec<CertificateVersion>, StoreError> {
        let certificate_path = self.certificate_path(&certificate.name)?;
        let mut versions = self.read_versions(&certificate_path).await?;
        versions.sort_by(|a, b| b.version_number.cmp(&a.version_number));
        Ok(versions)
    }

    async fn create_certificate(
        &self,
        name: &str,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> Result<CertificateRef, StoreError> {
        let certificate_path = self.certificate_path(name)?;
        let meta_path = certificate_path.join(META_FILE);

        if fs::try_exists(&meta_path).await? {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        // versions left by an earlier attempt that never wrote the metadata
        match fs::remove_dir_all(certificate_path.join(VERSIONS_DIR)).await {
            Ok(()) => debug!(name = %name, "Discarded versions of unfinished certificate"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::create_dir_all(&certificate_path).await?;
        self.write_version(&certificate_path, 1, issued, stage).await?;

        let certificate = CertificateRef {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        fs::write(&meta_path, serde_json::to_string_pretty(&certificate)?).await?;

        info!(
            name = %name,
            id = %certificate.id,
            stage = %stage,
            expires = %issued.not_after,
            "Created certificate"
        );
        Ok(certificate)
    }

    async fn create_version(
        &self,
        certificate: &CertificateRef,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> Result<CertificateVersion, StoreError> {
        let certificate_path = self.certificate_path(&certificate.name)?;
        if !fs::try_exists(certificate_path.join(META_FILE)).await? {
            return Err(StoreError::NotFound(certificate.name.clone()));
        }

        let existing = self.read_versions(&certificate_path).await?;
        let next = existing
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;

        // demotion precedes the write; a failed call leaves no new version
        if stage == Stage::Current {
            for mut previous in existing.into_iter().filter(|v| v.stage == Stage::Current) {
                previous.stage = Stage::Previous;
                let previous_path = Self::version_path(&certificate_path, previous.version_number);
                Self::write_version_meta(&previous_path, &previous).await?;
                debug!(
                    name = %certificate.name,
                    version = previous.version_number,
                    "Demoted previous current version"
                );
            }
        }

        let version = self
            .write_version(&certificate_path, next, issued, stage)
            .await?;

        info!(
            name = %certificate.name,
            version = next,
            stage = %stage,
            expires = %issued.not_after,
            "Created certificate version"
        );
        Ok(version)
    }
}
