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

//! Queue and shared-state namespace names.
//!
//! Every dispatcher instance and every service derives names from these
//! functions, so the naming scheme is the wire contract.

/// Queue of submission tasks and `{sid}` re-entry messages.
pub const SUBMISSION_QUEUE: &str = "submission";

/// Queue of per-file tasks.
pub const FILE_QUEUE: &str = "file";

/// Queue a service consumes its tasks from.
pub fn service_queue_name(service: &str) -> String {
    format!("service-queue-{service}")
}

/// TTL-bounded hash holding the active task for a submission.
pub fn dispatch_task_hash_name(sid: &str) -> String {
    format!("dispatch-task-{sid}")
}

/// Field of the active-task hash holding the serialized task.
pub const TASK_FIELD: &str = "task";

/// Hash of active sids held against a submitter's quota.
pub fn quota_hash_name(submitter: &str) -> String {
    format!("quota-{submitter}")
}

/// Ephemeral set of listener queues awaiting a submission's completion.
pub fn watcher_set_name(sid: &str) -> String {
    format!("watchers-{sid}")
}

/// Ephemeral per-file tag buffer, deleted when the file completes.
pub fn tags_set_name(sid: &str, sha256: &str) -> String {
    format!("tags-{sid}-{sha256}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_queue_naming() {
        assert_eq!(service_queue_name("av-scan"), "service-queue-av-scan");
    }
}
