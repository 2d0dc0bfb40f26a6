mod alerts;
mod connectors;
mod errors;
mod quality;
mod queue;
mod transform;
mod worker;

mod database;
mod server;
mod services;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline service
    Serve {
        #[clap(short, long, default_value = "3000")]
        port: u16,
        #[clap(short, long, default_value = "meridian.db")]
        database: String,
        #[clap(long)]
        cors_origin: Option<String>,
        /// Concurrent pipeline workers
        #[clap(short, long, default_value = "5")]
        workers: usize,
    },
    /// Database management
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        #[clap(short, long, default_value = "meridian.db")]
        database: String,
    },
    Migrate {
        #[clap(subcommand)]
        direction: server::MigrateDirection,
        #[clap(short, long, default_value = "meridian.db")]
        database: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Serve {
            port,
            database,
            cors_origin,
            workers,
        } => {
            info!("Starting server on port {}", port);
            server::start_server(server::ServerOptions {
                port,
                database,
                cors_origin,
                workers,
                trigger_secret: std::env::var("MERIDIAN_TRIGGER_SECRET").ok(),
            })
            .await?;
        }
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                info!("Initializing database: {}", database);
                server::migrate_database(&database, server::MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                info!("Running database migration: {:?}", direction);
                server::migrate_database(&database, direction).await?;
            }
        },
    }

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)
            .unwrap_or_else(|_| EnvFilter::new("meridian=info,sea_orm=warn")),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("meridian=info,sea_orm=warn")),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
