//! In-process versioned store.
//!
//! Used for dry runs and tests. Supports injecting conflicts and
//! simulating a competing writer.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{StoreError, Version, Versioned, VersionedStore};

#[derive(Debug, Default)]
struct MemoryInner {
    object: Option<Versioned>,
    next_version: u64,
    /// Upcoming puts to reject with a conflict
    forced_conflicts: u32,
    put_attempts: u64,
    writes: u64,
}

impl MemoryInner {
    fn bump(&mut self, content: Vec<u8>) -> Version {
        self.next_version += 1;
        let version = Version(self.next_version.to_string());
        self.object = Some(Versioned {
            content,
            version: version.clone(),
        });
        version
    }
}

/// Versioned store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` puts with a conflict, without writing.
    pub async fn inject_conflicts(&self, n: u32) {
        self.inner.lock().await.forced_conflicts = n;
    }

    /// Overwrite the object as another writer would, moving its version.
    pub async fn external_write(&self, content: &[u8]) -> Version {
        self.inner.lock().await.bump(content.to_vec())
    }

    /// Current object, if any.
    pub async fn snapshot(&self) -> Option<Versioned> {
        self.inner.lock().await.object.clone()
    }

    /// Number of successful writes through `put`.
    pub async fn writes(&self) -> u64 {
        self.inner.lock().await.writes
    }

    /// Number of `put` calls, successful or not.
    pub async fn put_attempts(&self) -> u64 {
        self.inner.lock().await.put_attempts
    }
}

#[async_trait]
impl VersionedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn pull(&self) -> Result<Option<Versioned>, StoreError> {
        Ok(self.inner.lock().await.object.clone())
    }

    async fn put(&self, content: &[u8], expected: Option<&Version>) -> Result<Version, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.put_attempts += 1;

        if inner.forced_conflicts > 0 {
            inner.forced_conflicts -= 1;
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
            });
        }

        let current = inner.object.as_ref().map(|o| &o.version);
        if current != expected {
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
            });
        }

        inner.writes += 1;
        Ok(inner.bump(content.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_update() {
        let store = MemoryStore::new();
        assert!(store.pull().await.unwrap().is_none());

        let v1 = store.put(b"one", None).await.unwrap();
        let v2 = store.put(b"two", Some(&v1)).await.unwrap();
        assert_ne!(v1, v2);

        let obj = store.pull().await.unwrap().unwrap();
        assert_eq!(obj.content, b"two");
        assert_eq!(obj.version, v2);
        assert_eq!(store.writes().await, 2);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let v1 = store.put(b"one", None).await.unwrap();
        store.external_write(b"other").await;

        let err = store.put(b"mine", Some(&v1)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.snapshot().await.unwrap().content, b"other");
    }

    #[tokio::test]
    async fn test_create_conflicts_when_present() {
        let store = MemoryStore::new();
        store.put(b"one", None).await.unwrap();
        assert!(store.put(b"two", None).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_injected_conflicts() {
        let store = MemoryStore::new();
        store.inject_conflicts(1).await;
        assert!(store.put(b"one", None).await.unwrap_err().is_conflict());
        assert!(store.put(b"one", None).await.is_ok());
        assert_eq!(store.put_attempts().await, 2);
        assert_eq!(store.writes().await, 1);
    }
}
