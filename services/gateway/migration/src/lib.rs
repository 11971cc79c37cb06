use sea_orm_migration::prelude::*;

mod m20260401_000001_create_flows;
mod m20260401_000002_create_destinations;
mod m20260401_000003_create_webhook_logs;
mod m20260401_000004_create_delivery_attempts;
mod m20260401_000005_create_delivery_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260401_000001_create_flows::Migration),
            Box::new(m20260401_000002_create_destinations::Migration),
            Box::new(m20260401_000003_create_webhook_logs::Migration),
            Box::new(m20260401_000004_create_delivery_attempts::Migration),
            Box::new(m20260401_000005_create_delivery_jobs::Migration),
        ]
    }
}
