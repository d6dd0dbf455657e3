use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::time::sleep;

use crate::config::Config;

pub type Pool = PgPool;

/// Connect to Postgres, retrying up to `postgres.conn_attempts` times with
/// `postgres.attempt_timeout_secs` between attempts — the Rust equivalent
/// of the original's `pkg/postgres` retry loop, since sqlx's own
/// `PgPoolOptions::connect` does not retry on its own.
pub async fn connect(config: &Config) -> Pool {
    let pg = &config.postgres;
    let mut attempts_left = pg.conn_attempts.max(1);

    loop {
        let result = PgPoolOptions::new()
            .max_connections(pg.pool_max)
            .acquire_timeout(pg.conn_timeout())
            .connect(&pg.url)
            .await;

        match result {
            Ok(pool) => return pool,
            Err(err) if attempts_left > 1 => {
                tracing::warn!(
                    attempts_left,
                    %err,
                    "postgres connect failed, retrying"
                );
                attempts_left -= 1;
                sleep(pg.attempt_timeout()).await;
            }
            Err(err) => panic!("failed to connect to PostgreSQL: {err}"),
        }
    }
}
