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

//! Error types for coordination operations.

use thiserror::Error;

/// Result type for coordination operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors that can occur during coordination operations.
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Backend failure (network, storage, etc.)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Value is not an integer counter
    #[error("Invalid counter value: {0}")]
    InvalidCounter(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::Serialization(err.to_string())
    }
}
