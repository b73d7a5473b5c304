//! Standalone migration runner (`aerosuite-migrate`), invoked from deploy
//! scripts ahead of rolling out a new worker image — deliberately separate
//! from `aerosuite-server` so a migration can be applied without starting
//! the cluster supervisor.

use aerosuite_platform::config::PlatformConfig;
use aerosuite_platform::database::{Config, Database, DatabaseConfig};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt().init();

    let platform_config = match PlatformConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return std::process::ExitCode::from(1);
        }
    };

    let db_config = Config {
        primary_url: platform_config.db_url.clone(),
        pool_config: DatabaseConfig { url: platform_config.db_url, ..DatabaseConfig::default() },
        ..Config::default()
    };

    let db = match Database::new(db_config).await {
        Ok(db) => db,
        Err(err) => {
            eprintln!("failed to connect: {err}");
            return std::process::ExitCode::from(1);
        }
    };

    match db.migrate().await {
        Ok(()) => {
            println!("migrations applied");
            std::process::ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("migration failed: {err}");
            std::process::ExitCode::from(1)
        }
    }
}
