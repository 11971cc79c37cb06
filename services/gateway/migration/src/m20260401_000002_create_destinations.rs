use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Destinations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Destinations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Destinations::FlowId).uuid().not_null())
                    .col(ColumnDef::new(Destinations::Name).string().not_null())
                    .col(ColumnDef::new(Destinations::Url).text().not_null())
                    .col(
                        ColumnDef::new(Destinations::Headers)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Destinations::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Destinations::RetryDelayMs)
                            .integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(Destinations::TimeoutMs)
                            .integer()
                            .not_null()
                            .default(30000),
                    )
                    .col(
                        ColumnDef::new(Destinations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Destinations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Destinations::Table, Destinations::FlowId)
                            .to(Flows::Table, Flows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Destinations::Table)
                    .col(Destinations::FlowId)
                    .name("idx_destinations_flow_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Destinations::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Destinations {
    Table,
    Id,
    FlowId,
    Name,
    Url,
    Headers,
    MaxRetries,
    RetryDelayMs,
    TimeoutMs,
    IsActive,
    CreatedAt,
}

#[derive(Iden)]
enum Flows {
    Table,
    Id,
}
