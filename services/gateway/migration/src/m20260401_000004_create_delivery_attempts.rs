use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::WebhookLogId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::DestinationId).uuid())
                    .col(
                        ColumnDef::new(DeliveryAttempts::DestinationKey)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::DestinationUrl)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::AttemptNumber)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(DeliveryAttempts::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::ResponseStatus).integer())
                    .col(ColumnDef::new(DeliveryAttempts::ResponseBody).text())
                    .col(ColumnDef::new(DeliveryAttempts::ResponseTimeMs).big_integer())
                    .col(ColumnDef::new(DeliveryAttempts::ErrorMessage).text())
                    .col(
                        ColumnDef::new(DeliveryAttempts::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DeliveryAttempts::CompletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(DeliveryAttempts::Table, DeliveryAttempts::WebhookLogId)
                            .to(WebhookLogs::Table, WebhookLogs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(DeliveryAttempts::Table, DeliveryAttempts::DestinationId)
                            .to(Destinations::Table, Destinations::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(DeliveryAttempts::Table)
                    .col(DeliveryAttempts::WebhookLogId)
                    .name("idx_delivery_attempts_webhook_log_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryAttempts {
    Table,
    Id,
    WebhookLogId,
    DestinationId,
    DestinationKey,
    DestinationUrl,
    AttemptNumber,
    Status,
    ResponseStatus,
    ResponseBody,
    ResponseTimeMs,
    ErrorMessage,
    StartedAt,
    CompletedAt,
}

#[derive(Iden)]
enum WebhookLogs {
    Table,
    Id,
}

#[derive(Iden)]
enum Destinations {
    Table,
    Id,
}
