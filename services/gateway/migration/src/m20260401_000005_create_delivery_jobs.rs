use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryJobs::WebhookLogId).uuid().not_null())
                    .col(ColumnDef::new(DeliveryJobs::FlowId).uuid().not_null())
                    .col(ColumnDef::new(DeliveryJobs::Spec).json_binary().not_null())
                    .col(
                        ColumnDef::new(DeliveryJobs::SigningSecret)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::BackoffBaseMs)
                            .big_integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::RoundStartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::Status)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryJobs::LockedUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeliveryJobs::LastError).text())
                    .col(
                        ColumnDef::new(DeliveryJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DeliveryJobs::FinishedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(DeliveryJobs::Table, DeliveryJobs::WebhookLogId)
                            .to(WebhookLogs::Table, WebhookLogs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Worker claim query: due jobs by status + next_attempt_at.
        manager
            .create_index(
                Index::create()
                    .table(DeliveryJobs::Table)
                    .col(DeliveryJobs::Status)
                    .col(DeliveryJobs::NextAttemptAt)
                    .name("idx_delivery_jobs_status_next_attempt_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryJobs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryJobs {
    Table,
    Id,
    WebhookLogId,
    FlowId,
    Spec,
    SigningSecret,
    Attempts,
    MaxAttempts,
    BackoffBaseMs,
    RoundStartedAt,
    Status,
    NextAttemptAt,
    LockedUntil,
    LastError,
    CreatedAt,
    FinishedAt,
}

#[derive(Iden)]
enum WebhookLogs {
    Table,
    Id,
}
