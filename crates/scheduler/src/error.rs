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

//! Error types for scheduling operations.

use thiserror::Error;

/// Result type for scheduling operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur while building schedules.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A service declares a stage missing from the global stage ordering.
    /// Fatal at startup: schedules cannot be placed deterministically.
    #[error("Service {service} declares unknown stage: {stage}")]
    UnknownStage {
        /// Service with the bad declaration
        service: String,
        /// The unrecognized stage name
        stage: String,
    },

    /// Catalog read failed
    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl From<sifter_datastore::DatastoreError> for SchedulerError {
    fn from(err: sifter_datastore::DatastoreError) -> Self {
        SchedulerError::Catalog(err.to_string())
    }
}
