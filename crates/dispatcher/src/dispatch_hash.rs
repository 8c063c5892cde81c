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

//! Per-submission shared dispatch state.
//!
//! ## Purpose
//! All state a submission accumulates while in flight lives here, keyed by
//! sid, visible to every dispatcher instance and every service:
//!
//! - `dispatch-time-{sid}`: when each (file, service) pair was dispatched
//! - `dispatch-result-{sid}`: terminal records per (file, service) pair
//! - `dispatch-schedule-{sid}`: cached names-only schedule per file
//! - `dispatch-tree-{sid}`: parents of each encountered file
//! - `dispatch-counter-{sid}`: admission total and per-parent fan-out
//! - `dispatch-files-{sid}`: the admitted-file set
//! - `dispatch-completed-{sid}`: files whose schedules are fully walked
//! - `dispatch-extra-errors-{sid}`: error keys attached outside any record
//!
//! ## Invariants
//! - A (file, service) pair's terminal record is written at most once
//!   (`hset_if_absent`); the first writer wins and later attempts are
//!   reported as losses so callers can discard duplicate work
//! - `add_file` admits a sha at most once and never lets the admitted
//!   total exceed the submission budget, under concurrent callers
//!
//! ## Key Encoding
//! (file, service) pairs are encoded `{sha256}-{service}`; sha256 hex never
//! contains `-`, so `split_once` recovers the parts.

use crate::DispatcherResult;
use serde::{Deserialize, Serialize};
use sifter_core::now_seconds;
use sifter_coordination::{HashStore, SetStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Total-admissions counter field; not a valid sha256, so it cannot collide
/// with a per-parent field.
const TOTAL_FIELD: &str = "__total__";

/// A terminal record for one (file, service) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchRecord {
    /// The service produced a result.
    Result {
        /// Datastore key of the result record
        key: String,
        /// Score contributed by this result
        score: i32,
        /// When set, later stages are skipped for this file unless the
        /// submission ignores filtering
        drop: bool,
        /// Classification of the result
        classification: String,
        /// Storage bucket holding the result body
        bucket: String,
    },
    /// The service failed terminally.
    Error {
        /// Datastore key of the error record
        key: String,
    },
}

impl DispatchRecord {
    /// Whether this record requests schedule truncation.
    pub fn is_drop(&self) -> bool {
        matches!(self, DispatchRecord::Result { drop: true, .. })
    }
}

/// Handle on the shared dispatch state of one submission.
#[derive(Clone)]
pub struct DispatchHash {
    hashes: Arc<dyn HashStore>,
    sets: Arc<dyn SetStore>,
    sid: String,
    time_hash: String,
    result_hash: String,
    schedule_hash: String,
    tree_hash: String,
    counter_hash: String,
    files_set: String,
    completed_set: String,
    errors_set: String,
}

fn record_key(sha256: &str, service: &str) -> String {
    format!("{sha256}-{service}")
}

/// Split a `{sha256}-{service}` record key back into its parts.
pub fn split_record_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('-')
}

impl DispatchHash {
    /// Bind a handle onto the dispatch state of `sid`.
    pub fn new(hashes: Arc<dyn HashStore>, sets: Arc<dyn SetStore>, sid: impl Into<String>) -> Self {
        let sid = sid.into();
        Self {
            time_hash: format!("dispatch-time-{sid}"),
            result_hash: format!("dispatch-result-{sid}"),
            schedule_hash: format!("dispatch-schedule-{sid}"),
            tree_hash: format!("dispatch-tree-{sid}"),
            counter_hash: format!("dispatch-counter-{sid}"),
            files_set: format!("dispatch-files-{sid}"),
            completed_set: format!("dispatch-completed-{sid}"),
            errors_set: format!("dispatch-extra-errors-{sid}"),
            hashes,
            sets,
            sid,
        }
    }

    /// The submission this handle belongs to.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Record that a (file, service) pair was just dispatched.
    pub async fn dispatch(&self, sha256: &str, service: &str) -> DispatcherResult<()> {
        let stamp = now_seconds().to_string().into_bytes();
        self.hashes
            .hset(&self.time_hash, &record_key(sha256, service), stamp)
            .await?;
        Ok(())
    }

    /// Epoch seconds of the last dispatch of a pair, `0.0` if never.
    pub async fn dispatch_time(&self, sha256: &str, service: &str) -> DispatcherResult<f64> {
        let value = self
            .hashes
            .hget(&self.time_hash, &record_key(sha256, service))
            .await?;
        Ok(value
            .and_then(|v| String::from_utf8(v).ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0))
    }

    /// The terminal record for a pair, if one has been written.
    pub async fn finished(
        &self,
        sha256: &str,
        service: &str,
    ) -> DispatcherResult<Option<DispatchRecord>> {
        let value = self
            .hashes
            .hget(&self.result_hash, &record_key(sha256, service))
            .await?;
        match value {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write the terminal record for a pair. First writer wins; returns
    /// `false` when a record already existed and this one was discarded.
    pub async fn set_finished(
        &self,
        sha256: &str,
        service: &str,
        record: &DispatchRecord,
    ) -> DispatcherResult<bool> {
        let written = self
            .hashes
            .hset_if_absent(
                &self.result_hash,
                &record_key(sha256, service),
                serde_json::to_vec(record)?,
            )
            .await?;
        if !written {
            warn!(sid = %self.sid, sha256 = %sha256, service = %service,
                "Duplicate terminal record discarded");
        }
        Ok(written)
    }

    /// Snapshot every dispatch time: sha256 → service → epoch seconds.
    pub async fn all_dispatches(&self) -> DispatcherResult<HashMap<String, HashMap<String, f64>>> {
        let raw = self.hashes.hgetall(&self.time_hash).await?;
        let mut dispatches: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for (key, bytes) in raw {
            let Some((sha256, service)) = split_record_key(&key) else {
                continue;
            };
            let stamp = String::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            dispatches
                .entry(sha256.to_string())
                .or_default()
                .insert(service.to_string(), stamp);
        }
        Ok(dispatches)
    }

    /// Snapshot every terminal record: sha256 → service → record.
    pub async fn all_results(
        &self,
    ) -> DispatcherResult<HashMap<String, HashMap<String, DispatchRecord>>> {
        let raw = self.hashes.hgetall(&self.result_hash).await?;
        let mut results: HashMap<String, HashMap<String, DispatchRecord>> = HashMap::new();
        for (key, bytes) in raw {
            let Some((sha256, service)) = split_record_key(&key) else {
                continue;
            };
            results
                .entry(sha256.to_string())
                .or_default()
                .insert(service.to_string(), serde_json::from_slice(&bytes)?);
        }
        Ok(results)
    }

    /// Attach an error key not tied to any terminal record (missing files,
    /// cancellations).
    pub async fn add_error(&self, key: &str) -> DispatcherResult<()> {
        self.sets.sadd(&self.errors_set, key).await?;
        Ok(())
    }

    /// Error keys attached via [`DispatchHash::add_error`].
    pub async fn all_extra_errors(&self) -> DispatcherResult<Vec<String>> {
        Ok(self.sets.smembers(&self.errors_set).await?)
    }

    /// Try to admit a file against the submission budget.
    ///
    /// Idempotent: a sha that is already admitted returns `true` without
    /// touching the counters. Otherwise the admission total, and the
    /// fan-out counter of `parent` when given, are both incremented
    /// atomically against `max_files`; if either would exceed the budget
    /// everything is rolled back and the file is refused.
    pub async fn add_file(
        &self,
        sha256: &str,
        max_files: u32,
        parent: Option<&str>,
    ) -> DispatcherResult<bool> {
        if !self.sets.sadd(&self.files_set, sha256).await? {
            return Ok(true);
        }
        let limit = i64::from(max_files);
        if self
            .hashes
            .bounded_increment(&self.counter_hash, TOTAL_FIELD, 1, limit)
            .await?
            .is_none()
        {
            self.sets.srem(&self.files_set, sha256).await?;
            return Ok(false);
        }
        if let Some(parent) = parent {
            if self
                .hashes
                .bounded_increment(&self.counter_hash, parent, 1, limit)
                .await?
                .is_none()
            {
                self.hashes
                    .bounded_increment(&self.counter_hash, TOTAL_FIELD, -1, i64::MAX)
                    .await?;
                self.sets.srem(&self.files_set, sha256).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record a parent of `sha256` in the file tree, `None` for roots.
    /// Merges under compare-and-set so concurrent extractors of the same
    /// child never lose a parent edge.
    pub async fn add_parent(&self, sha256: &str, parent: Option<&str>) -> DispatcherResult<()> {
        loop {
            let current = self.hashes.hget(&self.tree_hash, sha256).await?;
            let mut parents: Vec<Option<String>> = match &current {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => Vec::new(),
            };
            let entry = parent.map(str::to_string);
            if parents.contains(&entry) {
                return Ok(());
            }
            parents.push(entry);
            let written = self
                .hashes
                .hset_if(
                    &self.tree_hash,
                    sha256,
                    current.as_deref(),
                    serde_json::to_vec(&parents)?,
                )
                .await?;
            if written {
                return Ok(());
            }
        }
    }

    /// Snapshot the file tree: sha256 → parents (with `None` for root
    /// membership).
    pub async fn file_tree(&self) -> DispatcherResult<HashMap<String, Vec<Option<String>>>> {
        let raw = self.hashes.hgetall(&self.tree_hash).await?;
        let mut tree = HashMap::with_capacity(raw.len());
        for (sha256, bytes) in raw {
            tree.insert(sha256, serde_json::from_slice(&bytes)?);
        }
        Ok(tree)
    }

    /// The admitted-file set.
    pub async fn admitted_files(&self) -> DispatcherResult<Vec<String>> {
        Ok(self.sets.smembers(&self.files_set).await?)
    }

    /// Number of admitted files.
    pub async fn admitted_count(&self) -> DispatcherResult<usize> {
        Ok(self.sets.scard(&self.files_set).await?)
    }

    /// Mark a file's schedule as fully walked. Returns `false` when the
    /// file was already marked, so duplicate completion passes can be told
    /// apart from the first.
    pub async fn mark_file_completed(&self, sha256: &str) -> DispatcherResult<bool> {
        Ok(self.sets.sadd(&self.completed_set, sha256).await?)
    }

    /// The cached names-only schedule for a file, if one was computed.
    pub async fn get_schedule(&self, sha256: &str) -> DispatcherResult<Option<Vec<Vec<String>>>> {
        let value = self.hashes.hget(&self.schedule_hash, sha256).await?;
        match value {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Cache (or overwrite, on truncation) the schedule for a file.
    pub async fn set_schedule(
        &self,
        sha256: &str,
        schedule: &[Vec<String>],
    ) -> DispatcherResult<()> {
        self.hashes
            .hset(&self.schedule_hash, sha256, serde_json::to_vec(schedule)?)
            .await?;
        Ok(())
    }

    /// Whether every admitted file has a terminal record from every service
    /// on its cached schedule.
    ///
    /// Conservative: a file without a cached schedule, or any missing
    /// record, answers `false`. A drop record ends a file's schedule early
    /// unless the submission ignores filtering.
    pub async fn all_finished(&self, ignore_filtering: bool) -> DispatcherResult<bool> {
        let files = self.admitted_files().await?;
        if files.is_empty() {
            return Ok(false);
        }
        let results = self.all_results().await?;

        for sha256 in &files {
            let Some(schedule) = self.get_schedule(sha256).await? else {
                return Ok(false);
            };
            for stage in &schedule {
                let mut dropped = false;
                for service in stage {
                    match results.get(sha256).and_then(|r| r.get(service)) {
                        None => return Ok(false),
                        Some(record) => {
                            if record.is_drop() && !ignore_filtering {
                                dropped = true;
                            }
                        }
                    }
                }
                if dropped {
                    break;
                }
            }
        }
        Ok(true)
    }

    /// Drop every namespace of this submission. Idempotent.
    pub async fn delete(&self) -> DispatcherResult<()> {
        self.hashes.delete_hash(&self.time_hash).await?;
        self.hashes.delete_hash(&self.result_hash).await?;
        self.hashes.delete_hash(&self.schedule_hash).await?;
        self.hashes.delete_hash(&self.tree_hash).await?;
        self.hashes.delete_hash(&self.counter_hash).await?;
        self.sets.delete_set(&self.files_set).await?;
        self.sets.delete_set(&self.completed_set).await?;
        self.sets.delete_set(&self.errors_set).await?;
        Ok(())
    }
}
