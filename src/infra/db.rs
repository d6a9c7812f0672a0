use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::infra::error::InfraError;

const MAX_CONNECTIONS: u32 = 10;

pub async fn init_db(database_url: &str) -> Result<PgPool, InfraError> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(InfraError::DatabaseConnection)?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(InfraError::Migration)?;

    info!(max_connections = MAX_CONNECTIONS, "Database pool ready");
    Ok(pool)
}
