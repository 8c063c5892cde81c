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

//! Submission liveness watcher.
//!
//! ## Purpose
//! Every submission this instance is driving has a deadline that is pushed
//! forward on each dispatch event. When a deadline passes without activity
//! the watcher re-injects the submission's re-entry message onto its queue,
//! which re-runs the full dispatch pass and redispatches anything stale.
//!
//! ## Design Decisions
//! - The table is instance-local. If an instance dies, its active-task
//!   hashes expire and another instance adopts the work from the queues.
//! - Firing re-arms the entry at its base timeout instead of removing it,
//!   so a submission whose handler crashes repeatedly keeps getting retried
//!   until something clears it.

use sifter_coordination::QueueBroker;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct WatchEntry {
    deadline: Instant,
    timeout: Duration,
    queue: String,
    message: Vec<u8>,
}

/// Re-injects submissions whose deadline elapses without dispatch activity.
pub struct TimeoutWatcher {
    broker: Arc<dyn QueueBroker>,
    entries: Arc<RwLock<HashMap<String, WatchEntry>>>,
    scan_interval: Duration,
    shutdown: Arc<Notify>,
}

impl TimeoutWatcher {
    /// Create a watcher scanning at the given interval.
    pub fn new(broker: Arc<dyn QueueBroker>, scan_interval: Duration) -> Self {
        Self {
            broker,
            entries: Arc::new(RwLock::new(HashMap::new())),
            scan_interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Arm or push forward the deadline for a key. The stored message is
    /// pushed to `queue` if the deadline passes.
    pub async fn touch(&self, key: &str, timeout: Duration, queue: &str, message: Vec<u8>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            WatchEntry {
                deadline: Instant::now() + timeout,
                timeout,
                queue: queue.to_string(),
                message,
            },
        );
    }

    /// Stop watching a key. Idempotent.
    pub async fn clear(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Number of watched keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no keys are being watched.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Push the stored message for every expired entry and re-arm it at its
    /// base timeout. Returns the number of entries fired.
    pub async fn fire_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, String, Vec<u8>, Duration)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| e.deadline <= now)
                .map(|(k, e)| (k.clone(), e.queue.clone(), e.message.clone(), e.timeout))
                .collect()
        };

        let mut fired = 0;
        for (key, queue, message, timeout) in expired {
            warn!(key = %key, queue = %queue, "Submission timed out, re-injecting");
            if let Err(err) = self.broker.push(&queue, message).await {
                error!(key = %key, %err, "Failed to re-inject timed out submission");
                continue;
            }
            let mut entries = self.entries.write().await;
            // touch() may have raced in a fresher deadline
            if let Some(entry) = entries.get_mut(&key) {
                if entry.deadline <= now {
                    entry.deadline = Instant::now() + timeout;
                }
            }
            fired += 1;
        }
        fired
    }

    /// Spawn the background scan loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            info!(scan_interval = ?watcher.scan_interval, "Timeout watcher started");
            loop {
                tokio::select! {
                    _ = watcher.shutdown.notified() => {
                        info!("Timeout watcher stopping");
                        break;
                    }
                    _ = tokio::time::sleep(watcher.scan_interval) => {
                        let fired = watcher.fire_expired().await;
                        if fired > 0 {
                            debug!(fired, "Timeout watcher re-injected submissions");
                        }
                    }
                }
            }
        })
    }

    /// Signal the scan loop to stop.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_coordination::InMemoryCoordination;

    #[tokio::test]
    async fn test_expired_entry_fires_and_rearms() {
        let coord = Arc::new(InMemoryCoordination::new());
        let watcher = TimeoutWatcher::new(coord.clone(), Duration::from_millis(10));

        watcher
            .touch("sid-1", Duration::from_millis(0), "submission", b"{\"sid\":\"sid-1\"}".to_vec())
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(watcher.fire_expired().await, 1);
        let payload = coord
            .pop("submission", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"{\"sid\":\"sid-1\"}");
        // re-armed, not removed
        assert_eq!(watcher.len().await, 1);
    }

    #[tokio::test]
    async fn test_touch_pushes_deadline_forward() {
        let coord = Arc::new(InMemoryCoordination::new());
        let watcher = TimeoutWatcher::new(coord.clone(), Duration::from_millis(10));

        watcher
            .touch("sid-1", Duration::from_secs(60), "submission", b"m".to_vec())
            .await;
        assert_eq!(watcher.fire_expired().await, 0);
        assert!(coord
            .pop("submission", Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let coord = Arc::new(InMemoryCoordination::new());
        let watcher = TimeoutWatcher::new(coord, Duration::from_millis(10));

        watcher
            .touch("sid-1", Duration::from_millis(0), "submission", b"m".to_vec())
            .await;
        watcher.clear("sid-1").await;
        assert!(watcher.is_empty().await);
        assert_eq!(watcher.fire_expired().await, 0);
    }

    #[tokio::test]
    async fn test_background_loop_fires() {
        let coord = Arc::new(InMemoryCoordination::new());
        let watcher = Arc::new(TimeoutWatcher::new(coord.clone(), Duration::from_millis(5)));
        let handle = watcher.start();

        watcher
            .touch("sid-1", Duration::from_millis(1), "submission", b"m".to_vec())
            .await;
        let payload = coord
            .pop("submission", Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(payload, Some(b"m".to_vec()));

        watcher.stop();
        handle.await.unwrap();
    }
}
