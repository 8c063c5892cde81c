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

//! Service catalog entries.
//!
//! Services are opaque workers behind a uniform queue protocol; the
//! distinguishing attributes the dispatcher cares about are data: the stage
//! name, the accepts/rejects regexes, and the per-dispatch timeout.

use serde::{Deserialize, Serialize};

/// Default value for a service-specific submission parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionParamDefault {
    /// Parameter name
    pub name: String,
    /// Default value, overridable per submission via `service_spec`
    pub value: serde_json::Value,
}

/// A service catalog entry. Mutated only by a configuration collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name; also names its task queue
    pub name: String,
    /// Category used for selection/exclusion expansion
    pub category: String,
    /// Stage name; its index comes from the global stage ordering
    pub stage: String,
    /// Regex over file types this service accepts (empty = all)
    #[serde(default)]
    pub accepts: String,
    /// Regex over file types this service rejects (empty = none)
    #[serde(default)]
    pub rejects: String,
    /// Seconds a dispatch may remain outstanding before redispatch
    pub timeout: u64,
    /// Disabled services are invisible to the scheduler
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Service-specific submission parameter defaults
    #[serde(default)]
    pub submission_params: Vec<SubmissionParamDefault>,
}

fn default_enabled() -> bool {
    true
}

impl Service {
    /// Create an enabled service with empty accepts/rejects matchers.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        stage: impl Into<String>,
        timeout: u64,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            stage: stage.into(),
            accepts: String::new(),
            rejects: String::new(),
            timeout,
            enabled: true,
            submission_params: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_defaults_to_true() {
        let svc: Service = serde_json::from_str(
            r#"{"name": "av", "category": "Antivirus", "stage": "CORE", "timeout": 60}"#,
        )
        .unwrap();
        assert!(svc.enabled);
        assert_eq!(svc.accepts, "");
    }
}
