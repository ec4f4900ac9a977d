//! In-memory [`RemoteStore`] fake for deterministic tests. Not part of
//! the crate's semver-stable API — exposed (via `#[doc(hidden)]` in
//! `lib.rs`) only so this crate's own `tests/` integration suite,
//! which compiles against the built library rather than with
//! `cfg(test)`, can reach it too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::remote::{RemoteStore, ScanPage, StoreError};

pub struct FakeStore {
    data: Mutex<HashMap<String, Bytes>>,
    fail_next_get: AtomicBool,
    fail_next_set: AtomicBool,
    gets: AtomicI64,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            fail_next_get: AtomicBool::new(false),
            fail_next_set: AtomicBool::new(false),
            gets: AtomicI64::new(0),
        }
    }

    pub fn fail_next_get(&self) {
        self.fail_next_get.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_set(&self) {
        self.fail_next_set.store(true, Ordering::SeqCst);
    }

    pub async fn get_raw(&self, key: &str) -> Option<Bytes> {
        self.data.lock().expect("lock").get(key).cloned()
    }

    pub async fn put_raw(&self, key: &str, value: Bytes) {
        self.data.lock().expect("lock").insert(key.to_string(), value);
    }

    pub fn get_count(&self) -> i64 {
        self.gets.load(Ordering::SeqCst)
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_get.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Command(Box::new(std::io::Error::other("forced failure"))));
        }
        Ok(self.data.lock().expect("lock").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        if self.fail_next_set.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Command(Box::new(std::io::Error::other("forced failure"))));
        }
        self.data.lock().expect("lock").insert(key.to_string(), value);
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut data = self.data.lock().expect("lock");
        let mut removed = 0;
        for key in keys {
            if data.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        // Real Redis' INCR shares the same keyspace as GET/SET: a key
        // seeded via SET to an integer string can be incremented, and
        // an absent key increments from 0. Stored back through the
        // same `data` map (not envelope-framed — this fake makes no
        // distinction for counter keys, same as `RedisStore`, which
        // just writes/reads the decimal string).
        let mut data = self.data.lock().expect("lock");
        let current = data
            .get(key)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        data.insert(key.to_string(), Bytes::from(next.to_string()));
        Ok(next)
    }

    async fn scan(&self, cursor: u64, pattern: &str, batch: usize) -> Result<ScanPage, StoreError> {
        let data = self.data.lock().expect("lock");
        let glob = glob_to_prefix(pattern);
        let mut matching: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(&glob))
            .cloned()
            .collect();
        matching.sort();

        let start = cursor as usize;
        let end = (start + batch.max(1)).min(matching.len());
        let page = matching.get(start..end).unwrap_or_default().to_vec();
        let next_cursor = if end >= matching.len() { 0 } else { end as u64 };
        Ok(ScanPage {
            cursor: next_cursor,
            keys: page,
        })
    }
}

/// Treats `pattern` as a `prefix*` glob, which is all this fake needs
/// for the pattern-invalidation tests it supports.
fn glob_to_prefix(pattern: &str) -> String {
    pattern.trim_end_matches('*').to_string()
}
