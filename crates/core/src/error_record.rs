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

//! Error records written to the datastore on fatal submission failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a stored error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// File missing, cause unknown to the dispatcher
    Unknown,
    /// Service raised an exception
    Exception,
    /// Service exceeded its processing deadline
    TaskPreempted,
}

/// Whether the failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    /// Permanent failure; no retry will help
    FailNonrecoverable,
    /// Transient failure; a retry may succeed
    FailRecoverable,
}

/// Response block of an error record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description
    pub message: String,
    /// Component that produced the error (`dispatcher` for dispatcher-made
    /// records)
    pub service_name: String,
    /// Version of the producing component
    pub service_version: String,
    /// Tool version of the producing component, if any
    #[serde(default)]
    pub service_tool_version: Option<String>,
    /// Retry classification
    pub status: ErrorStatus,
}

/// An error record stored on fatal submission failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// SHA256 of the file the error concerns
    pub sha256: String,
    /// Error category
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Response block
    pub response: ErrorResponse,
    /// Expiry inherited from the submission
    #[serde(default)]
    pub expiry_ts: Option<DateTime<Utc>>,
}

impl ErrorRecord {
    /// Build the non-recoverable record the dispatcher writes for a file it
    /// could not find in storage.
    pub fn missing_file(sha256: impl Into<String>, expiry_ts: Option<DateTime<Utc>>) -> Self {
        let sha256 = sha256.into();
        Self {
            response: ErrorResponse {
                message: format!("Dispatcher could not find file {sha256} in storage"),
                service_name: "dispatcher".to_string(),
                service_version: env!("CARGO_PKG_VERSION").to_string(),
                service_tool_version: None,
                status: ErrorStatus::FailNonrecoverable,
            },
            sha256,
            error_type: ErrorType::Unknown,
            expiry_ts,
        }
    }

    /// Storage key for this record: `{sha256}.dispatcher.{ulid}`.
    pub fn build_key(&self) -> String {
        format!(
            "{}.{}.{}",
            self.sha256,
            self.response.service_name,
            ulid::Ulid::new()
        )
    }
}
