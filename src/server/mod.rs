pub mod app;
pub mod handlers;

use anyhow::Result;
use clap::Subcommand;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing::info;

use crate::alerts::{AlertEvaluator, DefaultNotifier, SmtpSettings};
use crate::database::connection::{establish_connection, get_database_url};
use crate::database::migrations::Migrator;
use crate::queue::{JobQueue, QueueConfig};

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
}

pub struct ServerOptions {
    pub port: u16,
    pub database: String,
    pub cors_origin: Option<String>,
    pub workers: usize,
    /// Shared secret for the alert-evaluation trigger endpoint; unset means
    /// the endpoint is open (development setups)
    pub trigger_secret: Option<String>,
}

pub async fn start_server(options: ServerOptions) -> Result<()> {
    let database_url = get_database_url(Some(&options.database));
    let db = establish_connection(&database_url).await?;
    Migrator::up(&db, None).await?;

    let queue = JobQueue::start(
        db.clone(),
        QueueConfig {
            workers: options.workers,
            ..QueueConfig::default()
        },
    );
    let recovered = queue.recover().await?;
    if recovered > 0 {
        info!("Re-queued {} executions from previous run", recovered);
    }

    let notifier = Arc::new(DefaultNotifier::new(SmtpSettings::from_env()));
    let evaluator = Arc::new(AlertEvaluator::new(db.clone(), notifier));

    let app = app::create_app(
        db,
        queue,
        evaluator,
        options.cors_origin.as_deref(),
        options.trigger_secret.clone(),
    )
    .await?;

    let addr = format!("0.0.0.0:{}", options.port);
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn migrate_database(database_path: &str, direction: MigrateDirection) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;
    match direction {
        MigrateDirection::Up => Migrator::up(&db, None).await?,
        MigrateDirection::Down => Migrator::down(&db, None).await?,
    }
    Ok(())
}
