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

//! Submission model: the unit of work driven through the analysis pipeline.
//!
//! ## Purpose
//! A submission names a set of root files plus the parameters that control
//! how they are analyzed (service selection, extraction budgets, filtering).
//! It is created by an external ingest and mutated only by the dispatcher
//! when it finalizes or cancels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Terminal and non-terminal submission states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// Accepted by ingest, not yet finalized
    Submitted,
    /// All admitted files reached terminal records (terminal)
    Completed,
    /// Cancelled on a non-recoverable error (terminal)
    Failed,
}

impl SubmissionState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Completed | SubmissionState::Failed)
    }
}

/// A named root file of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Display name as submitted
    pub name: String,
    /// SHA256 hex digest of the content
    pub sha256: String,
}

/// Wall-clock timestamps on a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionTimes {
    /// When ingest accepted the submission
    pub submitted: DateTime<Utc>,
    /// When the dispatcher finalized or cancelled it
    #[serde(default)]
    pub completed: Option<DateTime<Utc>>,
}

impl Default for SubmissionTimes {
    fn default() -> Self {
        Self {
            submitted: Utc::now(),
            completed: None,
        }
    }
}

/// User-controlled parameters of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionParams {
    /// Budget of extracted descendants admitted beyond the root files
    pub max_extracted: u32,
    /// When true, `drop` flags on results do not truncate schedules
    #[serde(default)]
    pub ignore_filtering: bool,
    /// Forwarded opaquely to services; the dispatcher never interprets it
    #[serde(default)]
    pub ignore_cache: bool,
    /// Baseline classification of the submission
    pub classification: String,
    /// Whether this submission counts against the submitter's quota
    #[serde(default)]
    pub quota_item: bool,
    /// Identity of the submitter (quota holder)
    #[serde(default)]
    pub submitter: String,
    /// Time-to-live in days, used for record expiry
    #[serde(default)]
    pub ttl: u32,
    /// Selected service or category names (empty = all enabled services)
    #[serde(default)]
    pub selected: Vec<String>,
    /// Excluded service or category names
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Per-service configuration overrides, keyed by service name
    #[serde(default)]
    pub service_spec: HashMap<String, serde_json::Value>,
    /// Signature keys forwarded to services
    #[serde(default)]
    pub signatures: Vec<String>,
}

impl Default for SubmissionParams {
    fn default() -> Self {
        Self {
            max_extracted: 100,
            ignore_filtering: false,
            ignore_cache: false,
            classification: String::new(),
            quota_item: false,
            submitter: String::new(),
            ttl: 0,
            selected: Vec::new(),
            excluded: Vec::new(),
            service_spec: HashMap::new(),
            signatures: Vec::new(),
        }
    }
}

/// A submission: an ordered set of root files plus analysis parameters.
///
/// ## Lifecycle
/// Created externally in `Submitted` state, registered in the active-tasks
/// map on first dispatch, and written back exactly once with a terminal
/// state (`Completed` or `Failed`) along with aggregated results, errors,
/// score, and file count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Submission identifier (opaque)
    pub sid: String,
    /// Ordered root files
    pub files: Vec<FileEntry>,
    /// Analysis parameters
    pub params: SubmissionParams,
    /// Aggregated classification (lattice-max over result classifications)
    pub classification: String,
    /// Current state
    pub state: SubmissionState,
    /// Maximum score over all result records
    #[serde(default)]
    pub max_score: i32,
    /// Number of files encountered, including extracted children
    #[serde(default)]
    pub file_count: u32,
    /// Result record keys collected at finalization
    #[serde(default)]
    pub results: Vec<String>,
    /// Error record keys collected at finalization or cancellation
    #[serde(default)]
    pub errors: Vec<String>,
    /// Timestamps
    #[serde(default)]
    pub times: SubmissionTimes,
    /// Record expiry, derived from `params.ttl`
    #[serde(default)]
    pub expiry_ts: Option<DateTime<Utc>>,
}

impl Submission {
    /// Create a new submission in `Submitted` state.
    pub fn new(sid: impl Into<String>, files: Vec<FileEntry>, params: SubmissionParams) -> Self {
        let classification = params.classification.clone();
        let expiry_ts = if params.ttl > 0 {
            Some(Utc::now() + chrono::Duration::days(i64::from(params.ttl)))
        } else {
            None
        };
        Self {
            sid: sid.into(),
            files,
            params,
            classification,
            state: SubmissionState::Submitted,
            max_score: 0,
            file_count: 0,
            results: Vec::new(),
            errors: Vec::new(),
            times: SubmissionTimes::default(),
            expiry_ts,
        }
    }

    /// The admission budget for this submission: root files plus the
    /// extracted-file allowance.
    pub fn max_files(&self) -> u32 {
        self.files.len() as u32 + self.params.max_extracted
    }
}
