pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_account_table;
mod m20250601_000002_create_processed_email_table;
mod m20250601_000003_create_event_table;
mod m20250601_000004_create_review_queue_table;
mod m20250601_000005_create_preference_tables;
mod m20250601_000006_create_memory_tables;
mod m20250601_000007_create_scan_state_table;
mod m20250601_000008_create_subscription_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_account_table::Migration),
            Box::new(m20250601_000002_create_processed_email_table::Migration),
            Box::new(m20250601_000003_create_event_table::Migration),
            Box::new(m20250601_000004_create_review_queue_table::Migration),
            Box::new(m20250601_000005_create_preference_tables::Migration),
            Box::new(m20250601_000006_create_memory_tables::Migration),
            Box::new(m20250601_000007_create_scan_state_table::Migration),
            Box::new(m20250601_000008_create_subscription_table::Migration),
        ]
    }
}
