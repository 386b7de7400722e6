//! Backup and restore pipeline

pub mod archiver;
pub mod backup;
pub mod composites;
pub mod exporter;
pub mod importer;
pub mod report;
pub mod sanitizer;

pub use archiver::ConfigurationArchiver;
pub use backup::BackupService;
pub use composites::RoleCompositeResolver;
pub use exporter::ConfigurationExporter;
pub use importer::{ImportOptions, RealmImporter};
pub use report::{ImportReport, ImportStatus, ReferenceKind, Stage, StageReport, UnresolvedReference};
