//! Redis-backed task store.
//!
//! Each task lives under `{prefix}:{id}` as a JSON string with a Redis TTL
//! matching its `ttl_deadline`. Updates are optimistic: read the record,
//! apply the mutator locally, then swap it in with a compare-and-set script
//! that only writes if the stored value is still the one that was read.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::fmt;

use super::{decode_record, encode_record, StoreError, TaskMutator, TaskStore};
use crate::models::Task;

/// Swap `KEYS[1]` from `ARGV[1]` to `ARGV[2]`, keeping the remaining TTL.
/// Returns -1 when the key is gone, 0 on conflict, 1 on success.
const COMPARE_AND_SET: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == false then return -1 end
if current ~= ARGV[1] then return 0 end
redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
return 1
"#;

/// Upper bound on optimistic retries for one update
const MAX_CAS_ROUNDS: usize = 16;

/// Durable store backed by Redis
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    cas: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        let key_prefix = key_prefix.into();
        tracing::info!("Connected to Redis task store (prefix {})", key_prefix);

        Ok(Self {
            conn,
            key_prefix,
            cas: Script::new(COMPARE_AND_SET),
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_redis_error)
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    fn backend(&self) -> &str {
        "redis"
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        let raw = encode_record(task)?;
        let ttl = task.ttl_remaining_secs(Utc::now());
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(&task.id), raw, ttl)
            .await
            .map_err(map_redis_error)
    }

    async fn get(&self, id: &str) -> Result<Task, StoreError> {
        let raw = self
            .read_raw(&self.key(id))
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let task = decode_record(&raw)?;
        if task.is_expired(Utc::now()) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(task)
    }

    async fn update(&self, id: &str, mutator: TaskMutator<'_>) -> Result<Task, StoreError> {
        let key = self.key(id);

        for round in 0..MAX_CAS_ROUNDS {
            let current = self
                .read_raw(&key)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            let mut task = decode_record(&current)?;
            if task.is_expired(Utc::now()) {
                return Err(StoreError::NotFound(id.to_string()));
            }
            mutator(&mut task)?;
            let next = encode_record(&task)?;

            let mut conn = self.conn.clone();
            let outcome: i64 = self
                .cas
                .key(&key)
                .arg(&current)
                .arg(&next)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_error)?;

            match outcome {
                1 => return Ok(task),
                -1 => return Err(StoreError::NotFound(id.to_string())),
                _ => {
                    tracing::debug!("Concurrent write on task {} (round {}), retrying", id, round + 1);
                }
            }
        }

        Err(StoreError::Backend(format!(
            "task {} kept changing during update",
            id
        )))
    }

    async fn delete_expired(&self) -> Result<usize, StoreError> {
        let pattern = format!("{}:*", self.key_prefix);
        let keys: Vec<String> = {
            let mut conn = self.conn.clone();
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(map_redis_error)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        // Redis evicts on its own TTL; this catches records whose TTL was lost
        let now = Utc::now();
        let mut removed = 0;
        for key in keys {
            let Some(raw) = self.read_raw(&key).await? else {
                continue;
            };
            let expired = match decode_record(&raw) {
                Ok(task) => task.is_expired(now),
                Err(e) => {
                    tracing::warn!("Dropping undecodable task record {}: {}", key, e);
                    true
                }
            };
            if expired {
                let mut conn = self.conn.clone();
                let n: usize = conn.del(&key).await.map_err(map_redis_error)?;
                removed += n;
            }
        }
        Ok(removed)
    }
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}
