use sea_orm::entity::prelude::*;

/// Durable async delivery job, claimed by workers with a lease.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "delivery_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub webhook_log_id: Uuid,
    pub flow_id: Uuid,
    /// Serialized destination and outbound payload.
    pub spec: Json,
    pub signing_secret: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    /// Start of the ingest or replay round this job belongs to.
    pub round_started_at: chrono::DateTime<chrono::Utc>,
    pub status: String,
    pub next_attempt_at: chrono::DateTime<chrono::Utc>,
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
