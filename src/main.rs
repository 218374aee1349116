use std::net::SocketAddr;
use std::path::Path;

use clap::Parser;
use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_core::cli::{AuditCommands, Cli, Commands, DbCommands};
use bazaar_core::config::Config;
use bazaar_core::services::AuditService;
use bazaar_core::{AppState, create_app, db, startup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => {
            let pool = db::create_pool(&config).await?;
            let migrator = Migrator::new(Path::new("./migrations")).await?;
            migrator.run(&pool).await?;
            tracing::info!("Database migrations completed");
            Ok(())
        }
        Commands::Audit(command) => {
            let pool = db::create_pool(&config).await?;
            let service = AuditService::new(pool, config.platform_account_key.clone());
            match command {
                AuditCommands::Reconcile => {
                    let report = service.reconcile_all().await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                AuditCommands::Balance => {
                    let report = service.verify_global_balance().await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
            Ok(())
        }
        Commands::Config => {
            let report = startup::validate_environment(&config).await?;
            report.print();
            if !report.is_valid() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let state = AppState {
        db: pool,
        config: config.clone(),
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
