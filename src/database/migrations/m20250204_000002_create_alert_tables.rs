use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create alerts table
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alerts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alerts::QueryId).integer().not_null())
                    .col(ColumnDef::new(Alerts::Name).string().not_null())
                    .col(ColumnDef::new(Alerts::ColumnName).string().not_null())
                    .col(ColumnDef::new(Alerts::Operator).string().not_null())
                    .col(ColumnDef::new(Alerts::Threshold).double().not_null())
                    .col(ColumnDef::new(Alerts::ScheduleCron).string())
                    .col(ColumnDef::new(Alerts::Email).string())
                    .col(ColumnDef::new(Alerts::WebhookUrl).string())
                    .col(
                        ColumnDef::new(Alerts::WebhookHeaders)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(Alerts::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Alerts::LastRunAt).timestamp())
                    .col(ColumnDef::new(Alerts::LastStatus).string())
                    .col(ColumnDef::new(Alerts::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Alerts::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alerts_query_id")
                            .from(Alerts::Table, Alerts::QueryId)
                            .to(SavedQueries::Table, SavedQueries::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create alert_history table (append-only)
        manager
            .create_table(
                Table::create()
                    .table(AlertHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AlertHistory::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AlertHistory::AlertId).integer().not_null())
                    .col(ColumnDef::new(AlertHistory::Status).string().not_null())
                    .col(ColumnDef::new(AlertHistory::Value).double())
                    .col(ColumnDef::new(AlertHistory::Message).text().not_null())
                    .col(ColumnDef::new(AlertHistory::CreatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_alert_history_alert_id")
                            .from(AlertHistory::Table, AlertHistory::AlertId)
                            .to(Alerts::Table, Alerts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for history listings, newest first
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_alert_history_alert")
                    .table(AlertHistory::Table)
                    .col(AlertHistory::AlertId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AlertHistory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum SavedQueries {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Alerts {
    Table,
    Id,
    QueryId,
    Name,
    ColumnName,
    Operator,
    Threshold,
    ScheduleCron,
    Email,
    WebhookUrl,
    WebhookHeaders,
    IsActive,
    LastRunAt,
    LastStatus,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AlertHistory {
    Table,
    Id,
    AlertId,
    Status,
    Value,
    Message,
    CreatedAt,
}
