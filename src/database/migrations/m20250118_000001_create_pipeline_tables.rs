use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create connections table (stored source credentials)
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::WorkspaceId).integer().not_null())
                    .col(ColumnDef::new(Connections::Name).string().not_null())
                    .col(ColumnDef::new(Connections::ConnectorType).string().not_null())
                    .col(ColumnDef::new(Connections::Host).string())
                    .col(ColumnDef::new(Connections::Port).integer())
                    .col(ColumnDef::new(Connections::DatabaseName).string())
                    .col(ColumnDef::new(Connections::Username).string())
                    .col(ColumnDef::new(Connections::Password).string())
                    .col(ColumnDef::new(Connections::ApiUrl).string())
                    .col(ColumnDef::new(Connections::AuthToken).string())
                    .col(
                        ColumnDef::new(Connections::ExtraConfig)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(Connections::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Connections::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Create pipelines table
        manager
            .create_table(
                Table::create()
                    .table(Pipelines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pipelines::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Pipelines::WorkspaceId).integer().not_null())
                    .col(ColumnDef::new(Pipelines::Name).string().not_null())
                    .col(ColumnDef::new(Pipelines::Description).string())
                    .col(ColumnDef::new(Pipelines::SourceType).string().not_null())
                    .col(
                        ColumnDef::new(Pipelines::SourceConfig)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(Pipelines::DestinationType).string().not_null())
                    .col(
                        ColumnDef::new(Pipelines::DestinationConfig)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Pipelines::Mode)
                            .string()
                            .not_null()
                            .default("etl"),
                    )
                    .col(
                        ColumnDef::new(Pipelines::TransformationSteps)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Pipelines::QualityRules)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Pipelines::ScheduleCron).string())
                    .col(
                        ColumnDef::new(Pipelines::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Pipelines::LastRunAt).timestamp())
                    .col(ColumnDef::new(Pipelines::LastStatus).string())
                    .col(ColumnDef::new(Pipelines::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Pipelines::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Create job_executions table (doubles as the durable queue)
        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobExecutions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobExecutions::PipelineId).integer().not_null())
                    .col(
                        ColumnDef::new(JobExecutions::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(JobExecutions::BatchId).string().not_null())
                    .col(ColumnDef::new(JobExecutions::StartedAt).timestamp())
                    .col(ColumnDef::new(JobExecutions::CompletedAt).timestamp())
                    .col(ColumnDef::new(JobExecutions::DurationMs).big_integer())
                    .col(ColumnDef::new(JobExecutions::RowsProcessed).big_integer())
                    .col(
                        ColumnDef::new(JobExecutions::Log)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(JobExecutions::Error).text())
                    .col(ColumnDef::new(JobExecutions::BatchFingerprint).string())
                    .col(ColumnDef::new(JobExecutions::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(JobExecutions::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_executions_pipeline_id")
                            .from(JobExecutions::Table, JobExecutions::PipelineId)
                            .to(Pipelines::Table, Pipelines::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for queue scans (claiming pending work, lease lookups)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_job_executions_pipeline_status")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::PipelineId)
                    .col(JobExecutions::Status)
                    .to_owned(),
            )
            .await?;

        // Create pipeline_rows table (load destination for ETL batches)
        manager
            .create_table(
                Table::create()
                    .table(PipelineRows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PipelineRows::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PipelineRows::PipelineId).integer().not_null())
                    .col(ColumnDef::new(PipelineRows::BatchId).string().not_null())
                    .col(ColumnDef::new(PipelineRows::RowNumber).integer().not_null())
                    .col(ColumnDef::new(PipelineRows::Data).text().not_null())
                    .col(ColumnDef::new(PipelineRows::LoadedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pipeline_rows_pipeline_id")
                            .from(PipelineRows::Table, PipelineRows::PipelineId)
                            .to(Pipelines::Table, Pipelines::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert key: redelivered jobs overwrite rather than duplicate
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pipeline_rows_batch_row")
                    .table(PipelineRows::Table)
                    .col(PipelineRows::PipelineId)
                    .col(PipelineRows::BatchId)
                    .col(PipelineRows::RowNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create saved_queries table
        manager
            .create_table(
                Table::create()
                    .table(SavedQueries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SavedQueries::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SavedQueries::ConnectionId).integer().not_null())
                    .col(ColumnDef::new(SavedQueries::Name).string().not_null())
                    .col(ColumnDef::new(SavedQueries::SqlText).text().not_null())
                    .col(ColumnDef::new(SavedQueries::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SavedQueries::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_saved_queries_connection_id")
                            .from(SavedQueries::Table, SavedQueries::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order (children first)
        manager
            .drop_table(Table::drop().table(SavedQueries::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PipelineRows::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Pipelines::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    WorkspaceId,
    Name,
    ConnectorType,
    Host,
    Port,
    DatabaseName,
    Username,
    Password,
    ApiUrl,
    AuthToken,
    ExtraConfig,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Pipelines {
    Table,
    Id,
    WorkspaceId,
    Name,
    Description,
    SourceType,
    SourceConfig,
    DestinationType,
    DestinationConfig,
    Mode,
    TransformationSteps,
    QualityRules,
    ScheduleCron,
    IsActive,
    LastRunAt,
    LastStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    PipelineId,
    Status,
    Attempts,
    BatchId,
    StartedAt,
    CompletedAt,
    DurationMs,
    RowsProcessed,
    Log,
    Error,
    BatchFingerprint,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PipelineRows {
    Table,
    Id,
    PipelineId,
    BatchId,
    RowNumber,
    Data,
    LoadedAt,
}

#[derive(DeriveIden)]
enum SavedQueries {
    Table,
    Id,
    ConnectionId,
    Name,
    SqlText,
    CreatedAt,
    UpdatedAt,
}
