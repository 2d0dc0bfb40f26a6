pub use sea_orm_migration::prelude::*;

mod m20250118_000001_create_pipeline_tables;
mod m20250204_000002_create_alert_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250118_000001_create_pipeline_tables::Migration),
            Box::new(m20250204_000002_create_alert_tables::Migration),
        ]
    }
}
