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

//! Task messages carried on the dispatch queues.
//!
//! ## Queues
//! - `submission`: [`SubmissionTask`] for initial dispatch, `{sid}` re-entry
//!   messages afterwards
//! - `file`: [`FileTask`]
//! - `service-queue-<name>`: [`ServiceTask`]

use crate::file::FileRef;
use crate::submission::Submission;
use serde::{Deserialize, Serialize};

/// Transient carrier of a submission through the dispatch layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionTask {
    /// The submission to dispatch
    pub submission: Submission,
    /// Optional queue that receives the finalized submission
    #[serde(default)]
    pub completed_queue: Option<String>,
}

impl SubmissionTask {
    /// Wrap a submission with no completion queue.
    pub fn new(submission: Submission) -> Self {
        Self {
            submission,
            completed_queue: None,
        }
    }
}

/// Per-file work item consumed by the file dispatcher. Immutable message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTask {
    /// Submission identifier
    pub sid: String,
    /// SHA256 of the file this one was extracted from, `None` for roots
    #[serde(default)]
    pub parent_hash: Option<String>,
    /// The file to process
    pub file: FileRef,
    /// Extraction depth (0 for root files)
    pub depth: u32,
    /// Submission-wide admission budget, carried for fan-out accounting
    pub max_files: u32,
}

/// Per-service work item pushed to `service-queue-<service_name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceTask {
    /// Submission identifier
    pub sid: String,
    /// Service this task is addressed to
    pub service_name: String,
    /// Merged service configuration (defaults overlaid with submission
    /// overrides), opaque to the dispatcher
    pub service_config: serde_json::Value,
    /// The file to analyze
    pub file: FileRef,
    /// Extraction depth of the file
    pub depth: u32,
    /// Submission-wide admission budget
    pub max_files: u32,
    /// Submission time-to-live in days
    pub ttl: u32,
    /// Cache bypass flag, forwarded opaquely
    pub ignore_cache: bool,
}

/// Message shape on the `submission` queue.
///
/// Initial dispatch carries a full [`SubmissionTask`]; re-entries (from the
/// timeout watcher or from file completion) carry only the sid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionMessage {
    /// Full task for initial dispatch
    Task(Box<SubmissionTask>),
    /// Re-entry by sid; the active-tasks map holds the task
    Entry {
        /// Submission identifier
        sid: String,
    },
}

impl SubmissionMessage {
    /// The sid this message refers to.
    pub fn sid(&self) -> &str {
        match self {
            SubmissionMessage::Task(task) => &task.submission.sid,
            SubmissionMessage::Entry { sid } => sid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::SubmissionParams;

    #[test]
    fn test_submission_message_untagged_roundtrip() {
        let entry = SubmissionMessage::Entry {
            sid: "sid-9".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"sid":"sid-9"}"#);
        let back: SubmissionMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sid(), "sid-9");

        let task = SubmissionMessage::Task(Box::new(SubmissionTask::new(Submission::new(
            "sid-10",
            vec![],
            SubmissionParams::default(),
        ))));
        let json = serde_json::to_string(&task).unwrap();
        let back: SubmissionMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, SubmissionMessage::Task(_)));
        assert_eq!(back.sid(), "sid-10");
    }

    #[test]
    fn test_file_task_roundtrip() {
        let task = FileTask {
            sid: "sid-1".to_string(),
            parent_hash: Some("p".repeat(64)),
            file: FileRef::new("c".repeat(64), 512, "document/pdf"),
            depth: 2,
            max_files: 10,
        };
        let json = serde_json::to_vec(&task).unwrap();
        let back: FileTask = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, task);
    }
}
