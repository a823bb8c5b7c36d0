use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::{MySqlPool, PgPool};
use tracing::info;

use crate::config::{Backend, Connection};
use crate::error::Result;

/// Each task run is strictly sequential, so one connection is all a pool needs.
const TASK_MAX_CONNECTIONS: u32 = 1;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn connect_postgres(connection: &Connection) -> Result<PgPool> {
    connection.require(Backend::Postgres)?;
    let pool = PgPoolOptions::new()
        .max_connections(TASK_MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(connection.url())
        .await?;
    info!(conn_id = %connection.conn_id, "connected to Postgres");
    Ok(pool)
}

/// The sink pool connects on first use, so an unreachable sink surfaces during the
/// sync (after the upload) rather than before the worksheet is read.
pub fn connect_mysql(connection: &Connection) -> Result<MySqlPool> {
    connection.require(Backend::MySql)?;
    let pool = MySqlPoolOptions::new()
        .max_connections(TASK_MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy(connection.url())?;
    info!(conn_id = %connection.conn_id, "configured MySQL pool");
    Ok(pool)
}
