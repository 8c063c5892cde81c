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

//! In-memory datastore backend.

use crate::{Datastore, DatastoreResult};
use async_trait::async_trait;
use sifter_core::{ErrorRecord, FileRef, Service, Submission};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// HashMap-based datastore for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    submissions: Arc<RwLock<HashMap<String, Submission>>>,
    files: Arc<RwLock<HashMap<String, FileRef>>>,
    errors: Arc<RwLock<HashMap<String, ErrorRecord>>>,
    services: Arc<RwLock<HashMap<String, Service>>>,
}

impl InMemoryDatastore {
    /// Create an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored error records. Test convenience.
    pub async fn error_count(&self) -> usize {
        self.errors.read().await.len()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_submission(&self, sid: &str) -> DatastoreResult<Option<Submission>> {
        Ok(self.submissions.read().await.get(sid).cloned())
    }

    async fn save_submission(&self, submission: &Submission) -> DatastoreResult<()> {
        self.submissions
            .write()
            .await
            .insert(submission.sid.clone(), submission.clone());
        Ok(())
    }

    async fn multi_get_files(&self, hashes: &[String]) -> DatastoreResult<Vec<Option<FileRef>>> {
        let files = self.files.read().await;
        Ok(hashes.iter().map(|sha| files.get(sha).cloned()).collect())
    }

    async fn save_file(&self, file: &FileRef) -> DatastoreResult<()> {
        self.files
            .write()
            .await
            .insert(file.sha256.clone(), file.clone());
        Ok(())
    }

    async fn save_error(&self, key: &str, error: &ErrorRecord) -> DatastoreResult<()> {
        self.errors
            .write()
            .await
            .insert(key.to_string(), error.clone());
        Ok(())
    }

    async fn get_error(&self, key: &str) -> DatastoreResult<Option<ErrorRecord>> {
        Ok(self.errors.read().await.get(key).cloned())
    }

    async fn list_services(&self) -> DatastoreResult<Vec<Service>> {
        let mut services: Vec<Service> = self.services.read().await.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn save_service(&self, service: &Service) -> DatastoreResult<()> {
        self.services
            .write()
            .await
            .insert(service.name.clone(), service.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::SubmissionParams;

    #[tokio::test]
    async fn test_submission_roundtrip() {
        let store = InMemoryDatastore::new();
        let submission = Submission::new("sid-1", vec![], SubmissionParams::default());
        store.save_submission(&submission).await.unwrap();

        let loaded = store.get_submission("sid-1").await.unwrap().unwrap();
        assert_eq!(loaded.sid, "sid-1");
        assert!(store.get_submission("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_multi_get_preserves_order_and_gaps() {
        let store = InMemoryDatastore::new();
        let a = FileRef::new("a".repeat(64), 1, "text/plain");
        let c = FileRef::new("c".repeat(64), 3, "text/plain");
        store.save_file(&a).await.unwrap();
        store.save_file(&c).await.unwrap();

        let got = store
            .multi_get_files(&["a".repeat(64), "b".repeat(64), "c".repeat(64)])
            .await
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref().unwrap().size, 1);
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().size, 3);
    }

    #[tokio::test]
    async fn test_services_listed_sorted() {
        let store = InMemoryDatastore::new();
        store
            .save_service(&Service::new("zip", "Extraction", "EXTRACT", 60))
            .await
            .unwrap();
        store
            .save_service(&Service::new("av", "Antivirus", "CORE", 60))
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_services()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["av", "zip"]);
    }
}
