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

//! Completion counters for one dispatcher instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-instance completion counters. Cheap to share and update from any
/// task; read with [`DispatcherMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct DispatcherMetrics {
    submissions_completed: AtomicU64,
    files_completed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Submissions finalized or cancelled by this instance
    pub submissions_completed: u64,
    /// Files whose schedules were fully worked off by this instance
    pub files_completed: u64,
}

impl DispatcherMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finalized or cancelled submission.
    pub fn increment_submissions_completed(&self) {
        self.submissions_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one completed file.
    pub fn increment_files_completed(&self) {
        self.files_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_completed: self.submissions_completed.load(Ordering::Relaxed),
            files_completed: self.files_completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = DispatcherMetrics::new();
        metrics.increment_submissions_completed();
        metrics.increment_files_completed();
        metrics.increment_files_completed();
        let snap = metrics.snapshot();
        assert_eq!(snap.submissions_completed, 1);
        assert_eq!(snap.files_completed, 2);
    }
}
