//! Backup and restore operations over one directory service

use super::archiver::{self, ConfigurationArchiver};
use super::exporter::ConfigurationExporter;
use super::importer::{ImportOptions, RealmImporter};
use super::report::ImportReport;
use crate::config::BackupConfig;
use crate::domain::{ElementKind, RealmRecord, UsersWithRolesBackup};
use crate::error::{AppError, Result};
use crate::keycloak::DirectoryService;
use crate::policy::ClassificationPolicy;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Entry point for every export and import operation.
///
/// Export operations return the path of the written file; import
/// operations return an [`ImportReport`].
pub struct BackupService {
    directory: Arc<dyn DirectoryService>,
    exporter: ConfigurationExporter,
    importer: RealmImporter,
    archiver: ConfigurationArchiver,
}

impl BackupService {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        policy: Arc<ClassificationPolicy>,
        config: &BackupConfig,
    ) -> Self {
        Self {
            directory,
            exporter: ConfigurationExporter::new(config.users_page_size),
            importer: RealmImporter::new(policy),
            archiver: ConfigurationArchiver::new(&config.backup_dir),
        }
    }

    fn archiver(&self, out_dir: Option<&Path>) -> ConfigurationArchiver {
        match out_dir {
            Some(dir) => ConfigurationArchiver::new(dir),
            None => self.archiver.clone(),
        }
    }

    // ============================================================================
    // Export
    // ============================================================================

    pub async fn export(&self, realm: &str, out_dir: Option<&Path>) -> Result<PathBuf> {
        let snapshot = self
            .exporter
            .export_realm(self.directory.as_ref(), realm)
            .await?;
        self.archiver(out_dir).write_json(&snapshot, Utc::now()).await
    }

    pub async fn export_zip(&self, realm: &str, out_dir: Option<&Path>) -> Result<PathBuf> {
        let snapshot = self
            .exporter
            .export_realm(self.directory.as_ref(), realm)
            .await?;
        self.archiver(out_dir).write_zip(&snapshot, Utc::now()).await
    }

    pub async fn export_all(&self, out_dir: Option<&Path>) -> Result<PathBuf> {
        let snapshots = self.exporter.export_all(self.directory.as_ref()).await?;
        info!(realms = snapshots.len(), "All realms exported");
        self.archiver(out_dir)
            .write_all_realms(&snapshots, Utc::now())
            .await
    }

    pub async fn export_element(
        &self,
        realm: &str,
        kind: ElementKind,
        out_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let element = self
            .exporter
            .export_element(self.directory.as_ref(), realm, kind)
            .await?;
        self.archiver(out_dir)
            .write_element(realm, &element, Utc::now())
            .await
    }

    pub async fn export_users_with_roles(
        &self,
        realm: &str,
        out_dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let users = self
            .exporter
            .users_with_roles(self.directory.as_ref(), realm)
            .await?;
        let now = Utc::now();
        let backup = UsersWithRolesBackup::new(realm, users, now);
        self.archiver(out_dir)
            .write_users_with_roles(&backup, now)
            .await
    }

    // ============================================================================
    // Import
    // ============================================================================

    /// Full import of a JSON or ZIP backup
    pub async fn import(&self, archive: &[u8]) -> Result<ImportReport> {
        self.import_with(archive, &ImportOptions::full()).await
    }

    pub async fn import_with_options(
        &self,
        archive: &[u8],
        users: bool,
        clients: bool,
        roles: bool,
        groups: bool,
        skip_existing: bool,
    ) -> Result<ImportReport> {
        let options = ImportOptions::selective(users, clients, roles, groups, skip_existing);
        self.import_with(archive, &options).await
    }

    /// Base realm configuration only
    pub async fn import_config_only(&self, archive: &[u8]) -> Result<ImportReport> {
        self.import_with(archive, &ImportOptions::config_only())
            .await
    }

    /// Full import of a backup file on disk
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let snapshot = archiver::read_archive(path).await?;
        self.importer
            .import(self.directory.as_ref(), snapshot, &ImportOptions::full())
            .await
    }

    /// Create a realm from a bare realm representation
    pub async fn import_realm_json(&self, document: &[u8]) -> Result<ImportReport> {
        let record: RealmRecord = serde_json::from_slice(document)
            .map_err(|e| AppError::InvalidArchive(format!("malformed realm document: {}", e)))?;
        self.importer
            .import_realm_record(self.directory.as_ref(), record)
            .await
    }

    async fn import_with(&self, archive: &[u8], options: &ImportOptions) -> Result<ImportReport> {
        let snapshot = archiver::parse_archive(archive)?;
        self.importer
            .import(self.directory.as_ref(), snapshot, options)
            .await
    }
}
