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

//! # Sifter Datastore
//!
//! ## Purpose
//! The narrow document-store contract through which the dispatch core reads
//! and writes persistent objects: submissions, file references, error
//! records, and the service catalog.
//!
//! ## Architecture Context
//! Persistent object storage is an external collaborator; the core only
//! needs these operations. Ingest creates submissions and files, services
//! create extracted files, a configuration collaborator maintains the
//! service catalog, and the dispatcher writes back finalized submissions
//! and its own error records.
//!
//! ## Key Components
//! - [`Datastore`]: the contract
//! - [`InMemoryDatastore`]: HashMap-based backend for tests and single-node
//!   deployments

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use sifter_core::{ErrorRecord, FileRef, Service, Submission};

pub mod error;
pub mod memory;

pub use error::{DatastoreError, DatastoreResult};
pub use memory::InMemoryDatastore;

/// Document store operations used by the dispatch core.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Fetch a submission by sid.
    async fn get_submission(&self, sid: &str) -> DatastoreResult<Option<Submission>>;

    /// Write a submission, overwriting any existing record.
    async fn save_submission(&self, submission: &Submission) -> DatastoreResult<()>;

    /// Bulk-fetch file references. The result has the same length as the
    /// input, with `None` for every sha absent from storage.
    async fn multi_get_files(&self, hashes: &[String]) -> DatastoreResult<Vec<Option<FileRef>>>;

    /// Write a file reference.
    async fn save_file(&self, file: &FileRef) -> DatastoreResult<()>;

    /// Write an error record under `key`.
    async fn save_error(&self, key: &str, error: &ErrorRecord) -> DatastoreResult<()>;

    /// Fetch an error record by key.
    async fn get_error(&self, key: &str) -> DatastoreResult<Option<ErrorRecord>>;

    /// List the full service catalog, including disabled services.
    async fn list_services(&self) -> DatastoreResult<Vec<Service>>;

    /// Write a service catalog entry.
    async fn save_service(&self, service: &Service) -> DatastoreResult<()>;
}
