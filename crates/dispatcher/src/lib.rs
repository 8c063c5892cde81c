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

//! # Sifter Dispatcher Core
//!
//! ## Purpose
//! Drives files through a multi-stage, per-file-type pipeline of analysis
//! services: deduplication, depth and fan-out limits, timeout-based retry,
//! partial-failure handling, and watcher notification.
//!
//! ## Architecture Context
//! An external ingest places a submission task on the `submission` queue.
//! The [`SubmissionDispatcher`] pops it, tracks it, enumerates files
//! (including extracted children discovered by services), and pushes a
//! [`sifter_core::FileTask`] per unfinished file onto the `file` queue. The
//! [`FileDispatcher`] pops file tasks, computes the next stage of
//! outstanding services, and pushes per-service tasks onto
//! `service-queue-<name>` queues. Services write terminal records into the
//! shared [`DispatchHash`] out-of-band; the dispatchers re-enter on
//! completion signals and on [`TimeoutWatcher`] expiry. When every service
//! on every admitted file is terminal, the submission is finalized and
//! watchers are notified.
//!
//! ## Concurrency Model
//! Dispatcher instances are stateless; all shared state lives behind the
//! coordination traits. Each instance runs blocking consumer loops; the
//! unit of progress is a single message handler invocation, synchronous
//! end-to-end. Duplicate delivery is tolerated: the design is idempotent.
//!
//! ## Key Components
//! - [`DispatchHash`]: per-submission shared dispatch state
//! - [`SubmissionDispatcher`] / [`FileDispatcher`]: the two consumer loops
//! - [`TimeoutWatcher`]: re-injects submissions that stop receiving events
//! - [`WatcherNotifier`]: STOP notifications for completion listeners
//! - [`DispatcherMetrics`]: completion counters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch_hash;
pub mod error;
pub mod file;
pub mod metrics;
pub mod names;
pub mod submission;
pub mod timeout;
pub mod watcher;

pub use dispatch_hash::{DispatchHash, DispatchRecord};
pub use error::{DispatcherError, DispatcherResult};
pub use file::FileDispatcher;
pub use metrics::{DispatcherMetrics, MetricsSnapshot};
pub use submission::SubmissionDispatcher;
pub use timeout::TimeoutWatcher;
pub use watcher::WatcherNotifier;

use sifter_coordination::{Coordination, HashStore, QueueBroker, SetStore};
use sifter_datastore::Datastore;
use std::sync::Arc;

/// Shared handles both dispatchers are built from.
///
/// Bundles the coordination primitives and the datastore so wiring code and
/// tests construct dispatchers from one value.
#[derive(Clone)]
pub struct DispatchEnv {
    /// Task queues
    pub queues: Arc<dyn QueueBroker>,
    /// Dispatch state hashes
    pub hashes: Arc<dyn HashStore>,
    /// Admitted-file and watcher sets
    pub sets: Arc<dyn SetStore>,
    /// Persistent object storage
    pub datastore: Arc<dyn Datastore>,
}

impl DispatchEnv {
    /// Build an environment from one coordination backend and a datastore.
    pub fn new<C>(backend: Arc<C>, datastore: Arc<dyn Datastore>) -> Self
    where
        C: Coordination + 'static,
    {
        Self {
            queues: backend.clone(),
            hashes: backend.clone(),
            sets: backend,
            datastore,
        }
    }
}
