//! Command-line surface

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use realm_backup::domain::ElementKind;
use realm_backup::service::{BackupService, ImportReport};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "realm-backup")]
#[command(version)]
#[command(about = "Export and restore Keycloak realm configuration", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Export one realm to a JSON (or ZIP) backup
    Export {
        #[arg(long)]
        realm: String,
        /// Output directory (defaults to BACKUP_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the two-entry ZIP archive instead of JSON
        #[arg(long)]
        zip: bool,
    },
    /// Export every realm into one JSON document
    ExportAll {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export a single collection of a realm
    ExportElement {
        #[arg(long)]
        realm: String,
        /// clients, users, roles, groups, identityProviders, clientScopes, usersWithRoles
        #[arg(long, value_parser = parse_kind)]
        kind: ElementKind,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export users with their role bindings and groups
    ExportUsersWithRoles {
        #[arg(long)]
        realm: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a JSON or ZIP backup with every stage
    Import { file: PathBuf },
    /// Import only the selected entity kinds
    ImportWithOptions {
        file: PathBuf,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        users: bool,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        clients: bool,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        roles: bool,
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        groups: bool,
        /// Succeed without changes if the realm already exists
        #[arg(long)]
        skip_existing: bool,
    },
    /// Create the realm from a backup without any of its entities
    ImportConfigOnly { file: PathBuf },
    /// Create a realm from a bare realm representation
    ImportRealmJson { file: PathBuf },
}

fn parse_kind(value: &str) -> std::result::Result<ElementKind, String> {
    value.parse().map_err(|e: realm_backup::AppError| e.to_string())
}

pub(crate) async fn run(command: Command, service: &BackupService) -> Result<()> {
    match command {
        Command::Export { realm, out, zip } => {
            let path = if zip {
                service.export_zip(&realm, out.as_deref()).await?
            } else {
                service.export(&realm, out.as_deref()).await?
            };
            print_path(&path);
        }
        Command::ExportAll { out } => {
            print_path(&service.export_all(out.as_deref()).await?);
        }
        Command::ExportElement { realm, kind, out } => {
            print_path(&service.export_element(&realm, kind, out.as_deref()).await?);
        }
        Command::ExportUsersWithRoles { realm, out } => {
            print_path(&service.export_users_with_roles(&realm, out.as_deref()).await?);
        }
        Command::Import { file } => {
            print_report(&service.import_file(&file).await?)?;
        }
        Command::ImportWithOptions {
            file,
            users,
            clients,
            roles,
            groups,
            skip_existing,
        } => {
            let bytes = read(&file).await?;
            let report = service
                .import_with_options(&bytes, users, clients, roles, groups, skip_existing)
                .await?;
            print_report(&report)?;
        }
        Command::ImportConfigOnly { file } => {
            let bytes = read(&file).await?;
            print_report(&service.import_config_only(&bytes).await?)?;
        }
        Command::ImportRealmJson { file } => {
            let bytes = read(&file).await?;
            print_report(&service.import_realm_json(&bytes).await?)?;
        }
    }
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn print_path(path: &Path) {
    println!("{}", path.display());
}

fn print_report(report: &ImportReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.is_clean() {
        tracing::warn!(realm = %report.realm, "Import finished with failures or unresolved references");
    }
    Ok(())
}
