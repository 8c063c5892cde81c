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

//! Error types for dispatch operations.

use thiserror::Error;

/// Result type for dispatch operations.
pub type DispatcherResult<T> = Result<T, DispatcherError>;

/// Errors that can occur during dispatch.
///
/// Handler-level errors are logged and the message abandoned; the timeout
/// watcher re-drives the submission, so transient failures self-heal.
#[derive(Error, Debug)]
pub enum DispatcherError {
    /// Coordination primitive failure
    #[error("Coordination error: {0}")]
    Coordination(#[from] sifter_coordination::CoordinationError),

    /// Datastore failure
    #[error("Datastore error: {0}")]
    Datastore(#[from] sifter_datastore::DatastoreError),

    /// Schedule construction failure
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] sifter_scheduler::SchedulerError),

    /// Core model failure
    #[error("Core error: {0}")]
    Core(#[from] sifter_core::CoreError),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DispatcherError {
    fn from(err: serde_json::Error) -> Self {
        DispatcherError::Serialization(err.to_string())
    }
}
