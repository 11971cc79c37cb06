use sea_orm::entity::prelude::*;

/// A webhook pipeline. `config` holds the editor graph.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "flows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub config: Option<Json>,
    pub signing_secret: String,
    pub require_signature: bool,
    pub async_mode: bool,
    pub rate_limit_per_minute: Option<i32>,
    pub secure_headers: Json,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::destinations::Entity")]
    Destinations,
    #[sea_orm(has_many = "super::webhook_logs::Entity")]
    WebhookLogs,
}

impl Related<super::destinations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Destinations.def()
    }
}

impl Related<super::webhook_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
