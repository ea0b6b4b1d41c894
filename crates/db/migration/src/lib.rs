use sea_orm_migration::prelude::*;

mod m20250101000000_baseline;
mod m20250102000000_chat_row_level_security;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101000000_baseline::Migration),
            Box::new(m20250102000000_chat_row_level_security::Migration),
        ]
    }
}
