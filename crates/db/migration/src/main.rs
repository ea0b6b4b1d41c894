//! Schema CLI: `DATABASE_URL=postgres://... cargo run -p db-migration -- up`.
use sea_orm_migration::cli;

#[tokio::main]
async fn main() {
    cli::run_cli(db_migration::Migrator).await;
}
