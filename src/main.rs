mod cli;

use anyhow::Result;
use clap::Parser;
use realm_backup::config::Config;
use realm_backup::keycloak::KeycloakClient;
use realm_backup::policy::ClassificationPolicy;
use realm_backup::service::BackupService;
use realm_backup::telemetry;
use std::sync::Arc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    telemetry::init(&config.telemetry);

    debug!(keycloak = %config.keycloak.url, "Configuration loaded");

    let keycloak = KeycloakClient::new(config.keycloak.clone())?;
    let policy = ClassificationPolicy::from_config(&config.classification)?;
    let service = BackupService::new(Arc::new(keycloak), Arc::new(policy), &config.backup);

    cli::run(cli.command, &service).await
}
