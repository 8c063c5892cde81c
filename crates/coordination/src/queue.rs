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

//! Typed JSON queue wrapper.

use crate::{CoordinationResult, QueueBroker};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A named queue whose payloads are JSON-encoded values of `T`.
///
/// ## Failure Semantics
/// A payload that fails to decode is logged and dropped; the pop continues
/// until a decodable message arrives or the timeout elapses. Dropping is
/// safe because every queue in the dispatch design is re-driven by the
/// timeout watcher.
pub struct JsonQueue<T> {
    broker: Arc<dyn QueueBroker>,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonQueue<T> {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonQueue<T> {
    /// Bind a typed view onto the named queue.
    pub fn new(broker: Arc<dyn QueueBroker>, name: impl Into<String>) -> Self {
        Self {
            broker,
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serialize and push an item.
    pub async fn push(&self, item: &T) -> CoordinationResult<()> {
        let payload = serde_json::to_vec(item)?;
        self.broker.push(&self.name, payload).await
    }

    /// Pop and decode the next item, blocking up to `timeout`.
    pub async fn pop(&self, timeout: Duration) -> CoordinationResult<Option<T>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let Some(payload) = self.broker.pop(&self.name, remaining).await? else {
                return Ok(None);
            };
            match serde_json::from_slice(&payload) {
                Ok(item) => return Ok(Some(item)),
                Err(err) => {
                    warn!(queue = %self.name, %err, "Dropping undecodable queue payload");
                }
            }
        }
    }

    /// Number of pending items.
    pub async fn length(&self) -> CoordinationResult<usize> {
        self.broker.length(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCoordination;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
    }

    #[tokio::test]
    async fn test_typed_roundtrip() {
        let broker: Arc<dyn QueueBroker> = Arc::new(InMemoryCoordination::new());
        let queue: JsonQueue<Item> = JsonQueue::new(broker, "items");
        queue.push(&Item { id: 7 }).await.unwrap();
        let item = queue.pop(Duration::from_millis(20)).await.unwrap();
        assert_eq!(item, Some(Item { id: 7 }));
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_skipped() {
        let coord = Arc::new(InMemoryCoordination::new());
        coord.push("items", b"not json".to_vec()).await.unwrap();
        coord
            .push("items", serde_json::to_vec(&Item { id: 1 }).unwrap())
            .await
            .unwrap();

        let queue: JsonQueue<Item> = JsonQueue::new(coord, "items");
        let item = queue.pop(Duration::from_millis(50)).await.unwrap();
        assert_eq!(item, Some(Item { id: 1 }));
    }
}
