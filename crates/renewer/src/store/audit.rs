//! Audit log sinks.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::{AuditLog, CertificateRef};
use crate::error::StoreError;

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub source: String,
    /// RFC 3339, millisecond precision, UTC
    pub time: String,
    pub certificate_id: String,
    pub certificate_name: String,
    pub message: String,
}

impl AuditEntry {
    pub fn new(
        source: &str,
        certificate: &CertificateRef,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            time: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            certificate_id: certificate.id.clone(),
            certificate_name: certificate.name.clone(),
            message: message.to_string(),
        }
    }
}

/// Emits audit entries as `tracing` events on the `audit` target
#[derive(Debug, Clone)]
pub struct TracingAuditLog {
    source: String,
}

impl TracingAuditLog {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(
        &self,
        certificate: &CertificateRef,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = AuditEntry::new(&self.source, certificate, message, timestamp);
        info!(
            target: "audit",
            id = %entry.id,
            source = %entry.source,
            time = %entry.time,
            certificate_id = %entry.certificate_id,
            certificate = %entry.certificate_name,
            "{}",
            entry.message
        );
        Ok(())
    }
}

/// Appends audit entries to a file, one JSON object per line
#[derive(Debug)]
pub struct JsonLinesAuditLog {
    path: PathBuf,
    source: String,
    write_lock: Mutex<()>,
}

impl JsonLinesAuditLog {
    pub fn new(path: &Path, source: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            source: source.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for JsonLinesAuditLog {
    async fn append(
        &self,
        certificate: &CertificateRef,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = AuditEntry::new(&self.source, certificate, message, timestamp);
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn certificate() -> CertificateRef {
        CertificateRef {
            id: "cert-1".into(),
            name: "example.com".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_time_format() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let entry = AuditEntry::new("acme-renewer", &certificate(), "hello", timestamp);
        assert_eq!(entry.time, "2024-05-01T12:30:00.000Z");
        assert!(Uuid::parse_str(&entry.id).is_ok());
    }

    #[tokio::test]
    async fn test_json_lines_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = JsonLinesAuditLog::new(&path, "acme-renewer");

        log.append(&certificate(), "first", Utc::now()).await.unwrap();
        log.append(&certificate(), "second", Utc::now()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<AuditEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
        assert_eq!(entries[1].certificate_name, "example.com");
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn test_tracing_log_never_fails() {
        let log = TracingAuditLog::new("acme-renewer");
        assert!(log.append(&certificate(), "message", Utc::now()).await.is_ok());
    }
}
