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

//! # Sifter Coordination Primitives
//!
//! ## Purpose
//! Defines the narrow contract through which the dispatch core uses shared
//! coordination state: named FIFO queues, named hash tables with TTL and
//! atomic conditional updates, and ephemeral sets.
//!
//! ## Architecture Context
//! Dispatcher instances are stateless; every piece of state that must be
//! visible across instances lives behind these traits:
//!
//! - [`QueueBroker`]: the `submission`, `file`, and per-service task queues
//! - [`HashStore`]: dispatch times, terminal records, cached schedules, the
//!   file tree, fan-out counters, and the TTL-bounded active-tasks map
//! - [`SetStore`]: admitted-file sets, watcher listener sets
//!
//! ## Design Decisions
//! - **Single server-side atomic ops**: every compound update the core needs
//!   atomically (`hset_if_absent`, `hset_if`, `bounded_increment`) is a
//!   single trait call, so a shared-storage backend can implement it as one
//!   server-side operation
//! - **Polling pop**: queue consumption blocks with a poll interval rather
//!   than a push notification, so any number of producer/consumer processes
//!   can share a queue without registration
//! - **Bytes on the wire**: payloads and hash values are raw bytes; the
//!   [`JsonQueue`] wrapper layers serde on top
//!
//! ## Key Components
//! - [`QueueBroker`] / [`HashStore`] / [`SetStore`]: the contract
//! - [`Coordination`]: blanket supertrait for backends implementing all three
//! - [`InMemoryCoordination`]: in-process backend for tests and single-node
//!   deployments
//! - [`JsonQueue`]: typed queue wrapper

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub mod error;
pub mod memory;
pub mod queue;

pub use error::{CoordinationError, CoordinationResult};
pub use memory::InMemoryCoordination;
pub use queue::JsonQueue;

/// Named multi-producer multi-consumer FIFO queues.
///
/// ## Delivery Semantics
/// At-least-once: duplicate delivery is possible and consumers must be
/// idempotent. Ordering is FIFO per queue, per backend.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Append a payload to the tail of `queue`, creating it if needed.
    async fn push(&self, queue: &str, payload: Vec<u8>) -> CoordinationResult<()>;

    /// Pop the head of `queue`, blocking up to `timeout` with a poll
    /// interval. Returns `None` when the timeout elapses with no message.
    async fn pop(&self, queue: &str, timeout: Duration) -> CoordinationResult<Option<Vec<u8>>>;

    /// Number of pending messages in `queue`.
    async fn length(&self, queue: &str) -> CoordinationResult<usize>;

    /// Drop `queue` and any pending messages.
    async fn delete_queue(&self, queue: &str) -> CoordinationResult<()>;
}

/// Named hash tables (field → bytes) with TTL and atomic conditional updates.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Set `field` unconditionally. Returns `true` if the field was new.
    async fn hset(&self, hash: &str, field: &str, value: Vec<u8>) -> CoordinationResult<bool>;

    /// Set `field` only if it does not exist. Atomic. Returns `true` if the
    /// value was written.
    async fn hset_if_absent(
        &self,
        hash: &str,
        field: &str,
        value: Vec<u8>,
    ) -> CoordinationResult<bool>;

    /// Compare-and-set: write `value` only if the current value of `field`
    /// equals `expected` (`None` = field absent). Atomic. Returns `true` if
    /// the value was written.
    async fn hset_if(
        &self,
        hash: &str,
        field: &str,
        expected: Option<&[u8]>,
        value: Vec<u8>,
    ) -> CoordinationResult<bool>;

    /// Get the value of `field`, if present.
    async fn hget(&self, hash: &str, field: &str) -> CoordinationResult<Option<Vec<u8>>>;

    /// Snapshot all fields of `hash`.
    async fn hgetall(&self, hash: &str) -> CoordinationResult<HashMap<String, Vec<u8>>>;

    /// Remove `field`. Returns `true` if it existed.
    async fn hdel(&self, hash: &str, field: &str) -> CoordinationResult<bool>;

    /// Number of fields in `hash`.
    async fn hlen(&self, hash: &str) -> CoordinationResult<usize>;

    /// Atomically add `delta` to an integer counter field, but only if the
    /// result stays at or below `limit`. Returns the new value, or `None`
    /// (with no change made) if the limit would be exceeded. Absent fields
    /// count as zero.
    async fn bounded_increment(
        &self,
        hash: &str,
        field: &str,
        delta: i64,
        limit: i64,
    ) -> CoordinationResult<Option<i64>>;

    /// Set or refresh a TTL on the whole named hash. The hash disappears if
    /// the TTL elapses without another `expire` call.
    async fn expire(&self, hash: &str, ttl: Duration) -> CoordinationResult<()>;

    /// Drop `hash` and all its fields.
    async fn delete_hash(&self, hash: &str) -> CoordinationResult<()>;
}

/// Named ephemeral sets of strings.
#[async_trait]
pub trait SetStore: Send + Sync {
    /// Add `member`. Atomic. Returns `true` if it was not already present.
    async fn sadd(&self, set: &str, member: &str) -> CoordinationResult<bool>;

    /// Snapshot the members of `set`.
    async fn smembers(&self, set: &str) -> CoordinationResult<Vec<String>>;

    /// Remove `member`. Returns `true` if it was present.
    async fn srem(&self, set: &str, member: &str) -> CoordinationResult<bool>;

    /// Number of members in `set`.
    async fn scard(&self, set: &str) -> CoordinationResult<usize>;

    /// Drop `set` and all its members.
    async fn delete_set(&self, set: &str) -> CoordinationResult<()>;
}

/// A backend providing all three coordination primitives.
pub trait Coordination: QueueBroker + HashStore + SetStore {}

impl<T: QueueBroker + HashStore + SetStore> Coordination for T {}
