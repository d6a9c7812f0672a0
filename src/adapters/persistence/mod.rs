use sqlx::PgPool;

mod billing;
mod chat;
mod role;
mod session;
mod settings;
mod user;

/// Single Postgres-backed implementation of every repository port.
#[derive(Clone)]
pub struct PostgresPersistence {
    pub(crate) pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
