// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Sifter Contributors
//
// This file is part of Sifter.
//
// Sifter is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Sifter is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Sifter. If not, see <https://www.gnu.org/licenses/>.

//! In-memory coordination backend.
//!
//! ## Purpose
//! Provides a HashMap-based implementation of all three coordination traits
//! for tests and single-process deployments.
//!
//! ## Limitations
//! - Not persistent (state lost on restart)
//! - Not distributed (single process only)

use crate::{
    CoordinationError, CoordinationResult, HashStore, QueueBroker, SetStore,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A named hash with an optional whole-hash TTL.
#[derive(Debug, Default)]
struct HashEntry {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

impl HashEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory implementation of the coordination primitives.
///
/// ## Example
/// ```rust
/// use sifter_coordination::{InMemoryCoordination, QueueBroker};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let coord = InMemoryCoordination::new();
/// coord.push("work", b"task".to_vec()).await?;
/// let msg = coord.pop("work", Duration::from_millis(50)).await?;
/// assert_eq!(msg, Some(b"task".to_vec()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryCoordination {
    queues: Arc<RwLock<HashMap<String, VecDeque<Vec<u8>>>>>,
    hashes: Arc<RwLock<HashMap<String, HashEntry>>>,
    sets: Arc<RwLock<HashMap<String, HashSet<String>>>>,
    poll_interval: Duration,
}

impl InMemoryCoordination {
    /// Create a backend with the default 20ms pop poll interval.
    pub fn new() -> Self {
        Self::with_poll_interval(Duration::from_millis(20))
    }

    /// Create a backend with a custom pop poll interval.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            hashes: Arc::new(RwLock::new(HashMap::new())),
            sets: Arc::new(RwLock::new(HashMap::new())),
            poll_interval,
        }
    }

    fn decode_i64(bytes: &[u8]) -> CoordinationResult<i64> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                CoordinationError::InvalidCounter(String::from_utf8_lossy(bytes).into_owned())
            })
    }

    fn encode_i64(value: i64) -> Vec<u8> {
        value.to_string().into_bytes()
    }
}

impl Default for InMemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBroker for InMemoryCoordination {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> CoordinationResult<()> {
        let mut queues = self.queues.write().await;
        queues.entry(queue.to_string()).or_default().push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> CoordinationResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut queues = self.queues.write().await;
                if let Some(q) = queues.get_mut(queue) {
                    if let Some(payload) = q.pop_front() {
                        return Ok(Some(payload));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn length(&self, queue: &str) -> CoordinationResult<usize> {
        let queues = self.queues.read().await;
        Ok(queues.get(queue).map(VecDeque::len).unwrap_or(0))
    }

    async fn delete_queue(&self, queue: &str) -> CoordinationResult<()> {
        self.queues.write().await.remove(queue);
        Ok(())
    }
}

#[async_trait]
impl HashStore for InMemoryCoordination {
    async fn hset(&self, hash: &str, field: &str, value: Vec<u8>) -> CoordinationResult<bool> {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(hash.to_string()).or_default();
        if entry.is_expired() {
            entry.fields.clear();
            entry.expires_at = None;
        }
        Ok(entry.fields.insert(field.to_string(), value).is_none())
    }

    async fn hset_if_absent(
        &self,
        hash: &str,
        field: &str,
        value: Vec<u8>,
    ) -> CoordinationResult<bool> {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(hash.to_string()).or_default();
        if entry.is_expired() {
            entry.fields.clear();
            entry.expires_at = None;
        }
        if entry.fields.contains_key(field) {
            return Ok(false);
        }
        entry.fields.insert(field.to_string(), value);
        Ok(true)
    }

    async fn hset_if(
        &self,
        hash: &str,
        field: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> CoordinationResult<bool> {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(hash.to_string()).or_default();
        if entry.is_expired() {
            entry.fields.clear();
            entry.expires_at = None;
        }
        let current = entry.fields.get(field).map(Vec::as_slice);
        if current != expected {
            return Ok(false);
        }
        entry.fields.insert(field.to_string(), value);
        Ok(true)
    }

    async fn hget(&self, hash: &str, field: &str) -> CoordinationResult<Option<Vec<u8>>> {
        let hashes = self.hashes.read().await;
        Ok(hashes
            .get(hash)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.fields.get(field).cloned()))
    }

    async fn hgetall(&self, hash: &str) -> CoordinationResult<HashMap<String, Vec<u8>>> {
        let hashes = self.hashes.read().await;
        Ok(hashes
            .get(hash)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    async fn hdel(&self, hash: &str, field: &str) -> CoordinationResult<bool> {
        let mut hashes = self.hashes.write().await;
        Ok(hashes
            .get_mut(hash)
            .filter(|entry| !entry.is_expired())
            .is_some_and(|entry| entry.fields.remove(field).is_some()))
    }

    async fn hlen(&self, hash: &str) -> CoordinationResult<usize> {
        let hashes = self.hashes.read().await;
        Ok(hashes
            .get(hash)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.fields.len())
            .unwrap_or(0))
    }

    async fn bounded_increment(
        &self,
        hash: &str,
        field: &str,
        delta: i64,
        limit: i64,
    ) -> CoordinationResult<Option<i64>> {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(hash.to_string()).or_default();
        if entry.is_expired() {
            entry.fields.clear();
            entry.expires_at = None;
        }
        let current = match entry.fields.get(field) {
            Some(bytes) => Self::decode_i64(bytes)?,
            None => 0,
        };
        let next = current + delta;
        if next > limit {
            return Ok(None);
        }
        entry.fields.insert(field.to_string(), Self::encode_i64(next));
        Ok(Some(next))
    }

    async fn expire(&self, hash: &str, ttl: Duration) -> CoordinationResult<()> {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(hash.to_string()).or_default();
        if entry.is_expired() {
            entry.fields.clear();
        }
        entry.expires_at = Some(Instant::now() + ttl);
        Ok(())
    }

    async fn delete_hash(&self, hash: &str) -> CoordinationResult<()> {
        self.hashes.write().await.remove(hash);
        Ok(())
    }
}

#[async_trait]
impl SetStore for InMemoryCoordination {
    async fn sadd(&self, set: &str, member: &str) -> CoordinationResult<bool> {
        let mut sets = self.sets.write().await;
        Ok(sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn smembers(&self, set: &str) -> CoordinationResult<Vec<String>> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn srem(&self, set: &str, member: &str) -> CoordinationResult<bool> {
        let mut sets = self.sets.write().await;
        Ok(sets.get_mut(set).is_some_and(|s| s.remove(member)))
    }

    async fn scard(&self, set: &str) -> CoordinationResult<usize> {
        let sets = self.sets.read().await;
        Ok(sets.get(set).map(HashSet::len).unwrap_or(0))
    }

    async fn delete_set(&self, set: &str) -> CoordinationResult<()> {
        self.sets.write().await.remove(set);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_fifo_order() {
        let coord = InMemoryCoordination::new();
        coord.push("q", b"first".to_vec()).await.unwrap();
        coord.push("q", b"second".to_vec()).await.unwrap();

        let a = coord.pop("q", Duration::from_millis(10)).await.unwrap();
        let b = coord.pop("q", Duration::from_millis(10)).await.unwrap();
        assert_eq!(a, Some(b"first".to_vec()));
        assert_eq!(b, Some(b"second".to_vec()));
        assert_eq!(coord.length("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_times_out_on_empty_queue() {
        let coord = InMemoryCoordination::new();
        let msg = coord.pop("empty", Duration::from_millis(30)).await.unwrap();
        assert_eq!(msg, None);
    }

    #[tokio::test]
    async fn test_pop_wakes_for_concurrent_push() {
        let coord = InMemoryCoordination::new();
        let pusher = coord.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            pusher.push("q", b"late".to_vec()).await.unwrap();
        });
        let msg = coord.pop("q", Duration::from_secs(2)).await.unwrap();
        assert_eq!(msg, Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_hset_if_absent_is_exclusive() {
        let coord = InMemoryCoordination::new();
        assert!(coord.hset_if_absent("h", "f", b"a".to_vec()).await.unwrap());
        assert!(!coord.hset_if_absent("h", "f", b"b".to_vec()).await.unwrap());
        assert_eq!(coord.hget("h", "f").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_hset_if_compare_and_set() {
        let coord = InMemoryCoordination::new();
        // Absent field: expected None succeeds, Some fails.
        assert!(!coord.hset_if("h", "f", Some(b"x"), b"v".to_vec()).await.unwrap());
        assert!(coord.hset_if("h", "f", None, b"v1".to_vec()).await.unwrap());
        // Present field: only the matching expectation wins.
        assert!(!coord.hset_if("h", "f", None, b"v2".to_vec()).await.unwrap());
        assert!(coord.hset_if("h", "f", Some(b"v1"), b"v2".to_vec()).await.unwrap());
        assert_eq!(coord.hget("h", "f").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_bounded_increment_respects_limit() {
        let coord = InMemoryCoordination::new();
        assert_eq!(coord.bounded_increment("h", "c", 1, 2).await.unwrap(), Some(1));
        assert_eq!(coord.bounded_increment("h", "c", 1, 2).await.unwrap(), Some(2));
        assert_eq!(coord.bounded_increment("h", "c", 1, 2).await.unwrap(), None);
        // Rejected increment leaves the counter unchanged.
        assert_eq!(coord.hget("h", "c").await.unwrap(), Some(b"2".to_vec()));
        // Decrement always fits.
        assert_eq!(
            coord.bounded_increment("h", "c", -1, i64::MAX).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_hash_ttl_expires_lazily() {
        let coord = InMemoryCoordination::new();
        coord.hset("h", "f", b"v".to_vec()).await.unwrap();
        coord.expire("h", Duration::from_millis(20)).await.unwrap();
        assert_eq!(coord.hget("h", "f").await.unwrap(), Some(b"v".to_vec()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(coord.hget("h", "f").await.unwrap(), None);
        assert_eq!(coord.hlen("h").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_refresh_keeps_hash_alive() {
        let coord = InMemoryCoordination::new();
        coord.hset("h", "f", b"v".to_vec()).await.unwrap();
        coord.expire("h", Duration::from_millis(40)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        coord.expire("h", Duration::from_millis(40)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(coord.hget("h", "f").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_set_operations() {
        let coord = InMemoryCoordination::new();
        assert!(coord.sadd("s", "a").await.unwrap());
        assert!(!coord.sadd("s", "a").await.unwrap());
        assert!(coord.sadd("s", "b").await.unwrap());
        assert_eq!(coord.scard("s").await.unwrap(), 2);

        let mut members = coord.smembers("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        assert!(coord.srem("s", "a").await.unwrap());
        assert!(!coord.srem("s", "a").await.unwrap());
        coord.delete_set("s").await.unwrap();
        assert_eq!(coord.scard("s").await.unwrap(), 0);
    }
}
