use sea_orm::entity::prelude::*;

/// One row per delivery try. Retries append new rows.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "delivery_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub webhook_log_id: Uuid,
    /// Null for destinations embedded in the flow graph.
    pub destination_id: Option<Uuid>,
    pub destination_key: String,
    pub destination_url: String,
    pub attempt_number: i32,
    pub status: String,
    pub response_status: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub error_message: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook_logs::Entity",
        from = "Column::WebhookLogId",
        to = "super::webhook_logs::Column::Id"
    )]
    WebhookLog,
}

impl Related<super::webhook_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
