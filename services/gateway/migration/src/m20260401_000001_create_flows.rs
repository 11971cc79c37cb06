use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Flows::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Flows::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Flows::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Flows::Name).string().not_null())
                    .col(ColumnDef::new(Flows::Description).text())
                    .col(
                        ColumnDef::new(Flows::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Flows::Config).json_binary())
                    .col(ColumnDef::new(Flows::SigningSecret).string().not_null())
                    .col(
                        ColumnDef::new(Flows::RequireSignature)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Flows::AsyncMode)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Flows::RateLimitPerMinute)
                            .integer()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(Flows::SecureHeaders)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[\"authorization\"]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Flows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Flows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Path resolution scans active flows only.
        manager
            .create_index(
                Index::create()
                    .table(Flows::Table)
                    .col(Flows::IsActive)
                    .name("idx_flows_is_active")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Flows::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Flows {
    Table,
    Id,
    ProjectId,
    Name,
    Description,
    IsActive,
    Config,
    SigningSecret,
    RequireSignature,
    AsyncMode,
    RateLimitPerMinute,
    SecureHeaders,
    CreatedAt,
    UpdatedAt,
}
