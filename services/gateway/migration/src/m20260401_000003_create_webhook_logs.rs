use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookLogs::FlowId).uuid().not_null())
                    .col(ColumnDef::new(WebhookLogs::Method).string().not_null())
                    .col(ColumnDef::new(WebhookLogs::Path).text().not_null())
                    .col(
                        ColumnDef::new(WebhookLogs::Headers)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WebhookLogs::Body).text())
                    .col(ColumnDef::new(WebhookLogs::SourceIp).string())
                    .col(
                        ColumnDef::new(WebhookLogs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(WebhookLogs::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(WebhookLogs::CompletedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(WebhookLogs::Table, WebhookLogs::FlowId)
                            .to(Flows::Table, Flows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Log listing: newest first per flow.
        manager
            .create_index(
                Index::create()
                    .table(WebhookLogs::Table)
                    .col(WebhookLogs::FlowId)
                    .col((WebhookLogs::ReceivedAt, IndexOrder::Desc))
                    .name("idx_webhook_logs_flow_id_received_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookLogs::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum WebhookLogs {
    Table,
    Id,
    FlowId,
    Method,
    Path,
    Headers,
    Body,
    SourceIp,
    Status,
    ReceivedAt,
    CompletedAt,
}

#[derive(Iden)]
enum Flows {
    Table,
    Id,
}
