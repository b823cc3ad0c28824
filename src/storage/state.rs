use std::collections::HashMap;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::Script;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::storage::{create_redis_client, StorageResult};
use crate::types::RedisConfig;

/// Deletes the key only while it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Mutual exclusion for profile runs. Locks expire on their own so a
/// crashed run cannot block a profile forever.
#[allow(async_fn_in_trait)]
pub trait RunLock {
    /// Returns the holder token, or `None` when the key is already held.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>>;

    async fn release(&self, key: &str, token: &str) -> StorageResult<()>;
}

pub fn profile_lock_key(profile_pk: i64) -> String {
    format!("ads_optimizer:run:{profile_pk}")
}

/// TTL lock shared by every process pointed at the same Redis.
pub struct RedisRunLock {
    conn: ConnectionManager,
}

impl RedisRunLock {
    pub async fn new(cfg: &RedisConfig) -> anyhow::Result<Self> {
        let conn = ConnectionManager::new(create_redis_client(cfg)?).await?;
        Ok(Self { conn })
    }
}

impl RunLock for RedisRunLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Process-local TTL lock for paper runs and tests.
#[derive(Default)]
pub struct LocalRunLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl LocalRunLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunLock for LocalRunLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        let mut held = self.held.lock().await;
        let now = Instant::now();
        if let Some((_, expires_at)) = held.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }
        let token = Uuid::new_v4().to_string();
        held.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<()> {
        let mut held = self.held.lock().await;
        if held.get(key).map(|(t, _)| t == token).unwrap_or(false) {
            held.remove(key);
        }
        Ok(())
    }
}

/// Lock backend picked from the execution mode.
pub enum RunLockBackend {
    Redis(RedisRunLock),
    Local(LocalRunLock),
}

impl RunLock for RunLockBackend {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        match self {
            RunLockBackend::Redis(l) => l.try_acquire(key, ttl).await,
            RunLockBackend::Local(l) => l.try_acquire(key, ttl).await,
        }
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<()> {
        match self {
            RunLockBackend::Redis(l) => l.release(key, token).await,
            RunLockBackend::Local(l) => l.release(key, token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_is_refused_until_release() {
        let lock = LocalRunLock::new();
        let key = profile_lock_key(7);
        let token = lock.try_acquire(&key, Duration::from_secs(60)).await.unwrap();
        assert!(token.is_some());
        assert!(lock.try_acquire(&key, Duration::from_secs(60)).await.unwrap().is_none());

        lock.release(&key, "someone-else").await.unwrap();
        assert!(lock.try_acquire(&key, Duration::from_secs(60)).await.unwrap().is_none());

        lock.release(&key, &token.unwrap()).await.unwrap();
        assert!(lock.try_acquire(&key, Duration::from_secs(60)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_taken_over() {
        let lock = LocalRunLock::new();
        let key = profile_lock_key(8);
        assert!(lock.try_acquire(&key, Duration::from_millis(0)).await.unwrap().is_some());
        assert!(lock.try_acquire(&key, Duration::from_secs(60)).await.unwrap().is_some());
    }
}
