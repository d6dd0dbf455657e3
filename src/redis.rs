use redis::aio::ConnectionManager;
use redis::Client;

use crate::config::Config;

pub type RedisPool = ConnectionManager;

/// Connect to the optional Redis read-through cache in front of the
/// historical-price store. Redis is a thin collaborator (spec.md §1,
/// "out of scope"): if it's not configured, or the connection fails, we
/// log and run without a cache rather than fail startup.
pub async fn connect(config: &Config) -> Option<RedisPool> {
    let url = config.redis.url.as_ref()?;

    let client = match Client::open(url.as_str()) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(%err, "invalid redis url, running without cache");
            return None;
        }
    };

    match ConnectionManager::new(client).await {
        Ok(conn) => Some(conn),
        Err(err) => {
            tracing::warn!(%err, "failed to connect to redis, running without cache");
            None
        }
    }
}
