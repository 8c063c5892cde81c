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

//! Completion notifications for submission watchers.
//!
//! External listeners register a private queue against a sid; when the
//! submission reaches a terminal state every registered queue receives a
//! STOP message and the registration set is deleted.

use crate::names::watcher_set_name;
use crate::DispatcherResult;
use sifter_coordination::{QueueBroker, SetStore};
use std::sync::Arc;
use tracing::debug;

/// Fans STOP messages out to the listener queues registered for a sid.
#[derive(Clone)]
pub struct WatcherNotifier {
    sets: Arc<dyn SetStore>,
    queues: Arc<dyn QueueBroker>,
}

impl WatcherNotifier {
    /// Build a notifier over the shared coordination primitives.
    pub fn new(sets: Arc<dyn SetStore>, queues: Arc<dyn QueueBroker>) -> Self {
        Self { sets, queues }
    }

    /// Register a listener queue for a submission. Idempotent.
    pub async fn register(&self, sid: &str, queue: &str) -> DispatcherResult<()> {
        self.sets.sadd(&watcher_set_name(sid), queue).await?;
        Ok(())
    }

    /// Notify every registered listener that the submission is done, then
    /// drop the registration set. Safe to call for a sid with no watchers.
    pub async fn stop_all(&self, sid: &str) -> DispatcherResult<()> {
        let set = watcher_set_name(sid);
        let members = self.sets.smembers(&set).await?;
        let payload = serde_json::to_vec(&serde_json::json!({ "status": "STOP" }))?;
        for queue in &members {
            self.queues.push(queue, payload.clone()).await?;
        }
        self.sets.delete_set(&set).await?;
        if !members.is_empty() {
            debug!(sid = %sid, watchers = members.len(), "Notified submission watchers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_coordination::InMemoryCoordination;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_notifies_and_clears() {
        let coord = Arc::new(InMemoryCoordination::new());
        let notifier = WatcherNotifier::new(coord.clone(), coord.clone());

        notifier.register("sid-1", "listener-a").await.unwrap();
        notifier.register("sid-1", "listener-b").await.unwrap();
        notifier.register("sid-1", "listener-a").await.unwrap();
        notifier.stop_all("sid-1").await.unwrap();

        for queue in ["listener-a", "listener-b"] {
            let payload = coord
                .pop(queue, Duration::from_millis(20))
                .await
                .unwrap()
                .unwrap();
            let msg: serde_json::Value = serde_json::from_slice(&payload).unwrap();
            assert_eq!(msg["status"], "STOP");
            // registered once despite the duplicate register call
            assert!(coord
                .pop(queue, Duration::from_millis(20))
                .await
                .unwrap()
                .is_none());
        }
        assert_eq!(coord.scard(&watcher_set_name("sid-1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_watchers_is_noop() {
        let coord = Arc::new(InMemoryCoordination::new());
        let notifier = WatcherNotifier::new(coord.clone(), coord);
        notifier.stop_all("sid-none").await.unwrap();
    }
}
