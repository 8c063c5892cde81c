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

//! # Sifter Core Data Model
//!
//! ## Purpose
//! Defines the shared data model for the Sifter dispatch framework: submissions
//! and their parameters, file references, the task messages carried on queues,
//! service catalog entries, error records, the classification lattice, and the
//! system configuration.
//!
//! ## Architecture Context
//! Every other Sifter crate depends on this one:
//!
//! - **Submission / SubmissionParams**: the unit of work driven through the
//!   multi-stage analysis pipeline
//! - **FileRef / FileTask / ServiceTask**: per-file and per-service messages
//! - **Service**: catalog entry describing an analysis worker
//! - **ErrorRecord**: fatal-failure records written to the datastore
//! - **ClassificationEngine**: lattice-max folding of result classifications
//! - **SystemConfig**: stage ordering, depth limits, timeouts
//!
//! ## Design Principles
//! All message types are plain serde structs: queue payloads and stored values
//! are JSON, so any process (dispatcher instance, analysis service, ingest)
//! can produce or consume them without sharing Rust code.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classification;
pub mod config;
pub mod error;
pub mod error_record;
pub mod file;
pub mod service;
pub mod submission;
pub mod task;

pub use classification::ClassificationEngine;
pub use config::SystemConfig;
pub use error::{CoreError, CoreResult};
pub use error_record::{ErrorRecord, ErrorResponse, ErrorStatus, ErrorType};
pub use file::FileRef;
pub use service::{Service, SubmissionParamDefault};
pub use submission::{FileEntry, Submission, SubmissionParams, SubmissionState, SubmissionTimes};
pub use task::{FileTask, ServiceTask, SubmissionMessage, SubmissionTask};

/// Current wall-clock time as fractional seconds since the Unix epoch.
///
/// Used for dispatch-time bookkeeping: a value of `0.0` conventionally means
/// "never dispatched".
pub fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
