//! Redis-backed versioned store.
//!
//! The object lives in two keys: `<key>:content` and `<key>:version`.
//! Writes go through a Lua script so the version check and the write are
//! applied atomically on the server.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, RedisResult, Script};
use std::fmt;
use tracing::info;

use super::{StoreError, Version, Versioned, VersionedStore};

/// Compare-and-swap: returns the new version, or -1 when the stored
/// version does not match ARGV[1] ('' means absent).
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if not current then current = '' end
if current ~= ARGV[1] then return -1 end
local next = redis.call('INCR', KEYS[2])
redis.call('SET', KEYS[1], ARGV[2])
return next
"#;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    content_key: String,
    version_key: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("content_key", &self.content_key)
            .field("version_key", &self.version_key)
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis at `redis_url` and address the object under `key`.
    pub async fn connect(redis_url: &str, key: &str) -> Result<Self, StoreError> {
        let conn = Self::open(redis_url).await?;
        info!("Connected to Redis at {} (key {})", redis_url, key);
        Ok(Self {
            conn,
            content_key: format!("{}:content", key),
            version_key: format!("{}:version", key),
        })
    }

    async fn open(redis_url: &str) -> RedisResult<ConnectionManager> {
        let client = redis::Client::open(redis_url)?;
        ConnectionManager::new(client).await
    }
}

#[async_trait]
impl VersionedStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn pull(&self) -> Result<Option<Versioned>, StoreError> {
        let mut conn = self.conn.clone();
        let (content, version): (Option<Vec<u8>>, Option<String>) = redis::cmd("MGET")
            .arg(&self.content_key)
            .arg(&self.version_key)
            .query_async(&mut conn)
            .await?;

        match (content, version) {
            (None, _) => Ok(None),
            (Some(content), Some(version)) => Ok(Some(Versioned {
                content,
                version: Version(version),
            })),
            (Some(_), None) => Err(StoreError::InvalidResponse(format!(
                "{} has content but no version",
                self.content_key
            ))),
        }
    }

    async fn put(&self, content: &[u8], expected: Option<&Version>) -> Result<Version, StoreError> {
        let mut conn = self.conn.clone();
        let expected_arg = expected.map(|v| v.as_str()).unwrap_or("");

        let script = Script::new(CAS_SCRIPT);
        let result: i64 = script
            .key(&self.content_key)
            .key(&self.version_key)
            .arg(expected_arg)
            .arg(content)
            .invoke_async(&mut conn)
            .await?;

        if result < 0 {
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
            });
        }
        Ok(Version(result.to_string()))
    }
}
