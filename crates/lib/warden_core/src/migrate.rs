//! Schema migrations.
//!
//! SQL lives in `warden_core/migrations/` and is embedded at build time.

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

/// The embedded migration set.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Bring the schema at `pool` up to date.
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
