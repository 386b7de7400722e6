//! Backup file formats: JSON documents and the two-entry ZIP archive

use crate::domain::{ElementExport, RealmSnapshot, UsersWithRolesBackup};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Full snapshot entry inside a ZIP backup
pub const REALM_CONFIG_ENTRY: &str = "realm-config.json";
/// Users-with-roles extract inside a ZIP backup
pub const USERS_WITH_ROLES_ENTRY: &str = "users-with-roles.json";

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Writes backups into one output directory.
///
/// Serialization is pure; file names embed the realm and a
/// `yyyyMMdd_HHmmss` timestamp.
#[derive(Debug, Clone)]
pub struct ConfigurationArchiver {
    output_dir: PathBuf,
}

impl ConfigurationArchiver {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn write_json(&self, snapshot: &RealmSnapshot, at: DateTime<Utc>) -> Result<PathBuf> {
        let name = format!("backup_{}_{}.json", realm_label(snapshot), file_stamp(at));
        self.write(&name, &to_json_bytes(snapshot)?).await
    }

    pub async fn write_zip(&self, snapshot: &RealmSnapshot, at: DateTime<Utc>) -> Result<PathBuf> {
        let name = format!("backup_{}_{}.zip", realm_label(snapshot), file_stamp(at));
        self.write(&name, &to_zip_bytes(snapshot, at)?).await
    }

    pub async fn write_all_realms(
        &self,
        snapshots: &BTreeMap<String, RealmSnapshot>,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let name = format!("backup_all_realms_{}.json", file_stamp(at));
        self.write(&name, &to_json_bytes(snapshots)?).await
    }

    pub async fn write_element(
        &self,
        realm: &str,
        element: &ElementExport,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let name = format!(
            "backup_{}_{}_{}.json",
            file_safe(realm),
            element.kind(),
            file_stamp(at)
        );
        self.write(&name, &to_json_bytes(element)?).await
    }

    pub async fn write_users_with_roles(
        &self,
        backup: &UsersWithRolesBackup,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let name = format!(
            "backup_{}_users_with_roles_{}.json",
            file_safe(&backup.backup_metadata.realm_name),
            file_stamp(at)
        );
        self.write(&name, &to_json_bytes(backup)?).await
    }

    async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "Backup written");
        Ok(path)
    }
}

/// Pretty-printed JSON
pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(value)?)
}

/// ZIP with exactly [`REALM_CONFIG_ENTRY`] and [`USERS_WITH_ROLES_ENTRY`]
pub fn to_zip_bytes(snapshot: &RealmSnapshot, at: DateTime<Utc>) -> Result<Vec<u8>> {
    let users = UsersWithRolesBackup::from_snapshot(snapshot, realm_label(snapshot), at);

    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(REALM_CONFIG_ENTRY, options)?;
    zip.write_all(&to_json_bytes(snapshot)?)?;

    zip.start_file(USERS_WITH_ROLES_ENTRY, options)?;
    zip.write_all(&to_json_bytes(&users)?)?;

    Ok(zip.finish()?.into_inner())
}

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_SIGNATURE)
}

/// Parse a JSON or ZIP backup into a snapshot
pub fn parse_archive(bytes: &[u8]) -> Result<RealmSnapshot> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::InvalidArchive("archive is empty".to_string()));
    }

    let json = if is_zip(bytes) {
        read_zip_entry(bytes, REALM_CONFIG_ENTRY)?
    } else {
        bytes.to_vec()
    };

    serde_json::from_slice(&json)
        .map_err(|e| AppError::InvalidArchive(format!("malformed backup document: {}", e)))
}

/// Read and parse a backup file
pub async fn read_archive(path: &Path) -> Result<RealmSnapshot> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::InvalidArchive(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_archive(&bytes)
}

fn read_zip_entry(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::InvalidArchive(format!("unreadable zip: {}", e)))?;
    let mut file = archive
        .by_name(name)
        .map_err(|e| AppError::InvalidArchive(format!("zip missing {}: {}", name, e)))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn realm_label(snapshot: &RealmSnapshot) -> &str {
    snapshot
        .realm_name()
        .or_else(|| snapshot.backup_metadata.as_ref().map(|m| m.realm_name.as_str()))
        .unwrap_or("unknown")
}

fn file_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}
