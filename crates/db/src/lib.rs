use std::time::Duration;

use db_migration::Migrator;
pub use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DbBackend};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

pub mod entities;
pub mod models;
pub mod types;

pub type DbPool = DatabaseConnection;

/// Name of the transaction-local setting the row level security policies
/// compare `user_id` against.
pub const CURRENT_USER_SETTING: &str = "app.current_user_id";

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

impl DBService {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .max_connections(max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        let pool = Database::connect(options).await?;
        Self::from_connection(pool).await
    }

    /// Wraps an existing connection and brings its schema up to date.
    pub async fn from_connection(pool: DbPool) -> Result<DBService, DbErr> {
        Migrator::up(&pool, None).await?;
        tracing::debug!(backend = ?pool.get_database_backend(), "database migrations applied");
        Ok(DBService { pool })
    }

    /// Opens a transaction acting on behalf of `user_id`. See [`begin_user_scope`].
    pub async fn begin_user_scope(&self, user_id: Uuid) -> Result<DatabaseTransaction, DbErr> {
        begin_user_scope(&self.pool, user_id).await
    }
}

/// Starts a transaction with the caller identity published to the database.
///
/// On Postgres the id is written to [`CURRENT_USER_SETTING`] with
/// `set_config(.., true)`, so it vanishes at commit or rollback and cannot
/// leak to the next checkout of the pooled connection. SQLite has no
/// policies; the owner filters in [`models`] are the only guard there.
pub async fn begin_user_scope(
    db: &DatabaseConnection,
    user_id: Uuid,
) -> Result<DatabaseTransaction, DbErr> {
    let tx = db.begin().await?;
    if tx.get_database_backend() == DbBackend::Postgres {
        // `Uuid`'s Display is strictly hex and dashes.
        tx.execute_unprepared(&format!(
            "SELECT set_config('{CURRENT_USER_SETTING}', '{user_id}', true)"
        ))
        .await?;
    }
    Ok(tx)
}
