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

//! System configuration.
//!
//! ## Environment Variables
//! - `SIFTER_STAGES`: comma-separated global stage ordering
//!   (default: "SETUP,EXTRACT,CORE,SECONDARY,POST")
//! - `SIFTER_MAX_EXTRACTION_DEPTH`: extraction depth limit (default: 6)
//! - `SIFTER_DISPATCHER_TIMEOUT`: submission timeout in seconds
//!   (default: 900)
//! - `SIFTER_POLL_INTERVAL_MS`: queue poll interval in milliseconds
//!   (default: 100)
//! - `SIFTER_SERVICE_REFRESH_SECS`: service catalog refresh interval
//!   (default: 300)

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Framework-level configuration shared by all dispatcher instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Global stage ordering; a service's stage index is its position here
    pub stages: Vec<String>,
    /// Files at this extraction depth or deeper are never dispatched
    pub max_extraction_depth: u32,
    /// Submission timeout in seconds for the timeout watcher
    pub dispatcher_timeout: u64,
    /// Queue poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Service catalog refresh interval in seconds
    pub service_refresh_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            stages: ["SETUP", "EXTRACT", "CORE", "SECONDARY", "POST"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_extraction_depth: 6,
            dispatcher_timeout: 15 * 60,
            poll_interval_ms: 100,
            service_refresh_secs: 300,
        }
    }
}

impl SystemConfig {
    /// Load configuration from `SIFTER_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> CoreResult<Self> {
        let mut config = Self::default();

        if let Ok(stages) = std::env::var("SIFTER_STAGES") {
            config.stages = stages
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if config.stages.is_empty() {
                return Err(CoreError::Config(
                    "SIFTER_STAGES must name at least one stage".to_string(),
                ));
            }
        }
        if let Ok(depth) = std::env::var("SIFTER_MAX_EXTRACTION_DEPTH") {
            config.max_extraction_depth = depth
                .parse()
                .map_err(|_| CoreError::Config(format!("Invalid SIFTER_MAX_EXTRACTION_DEPTH: {depth}")))?;
        }
        if let Ok(timeout) = std::env::var("SIFTER_DISPATCHER_TIMEOUT") {
            config.dispatcher_timeout = timeout
                .parse()
                .map_err(|_| CoreError::Config(format!("Invalid SIFTER_DISPATCHER_TIMEOUT: {timeout}")))?;
        }
        if let Ok(poll) = std::env::var("SIFTER_POLL_INTERVAL_MS") {
            config.poll_interval_ms = poll
                .parse()
                .map_err(|_| CoreError::Config(format!("Invalid SIFTER_POLL_INTERVAL_MS: {poll}")))?;
        }
        if let Ok(refresh) = std::env::var("SIFTER_SERVICE_REFRESH_SECS") {
            config.service_refresh_secs = refresh
                .parse()
                .map_err(|_| CoreError::Config(format!("Invalid SIFTER_SERVICE_REFRESH_SECS: {refresh}")))?;
        }

        Ok(config)
    }

    /// Index of a stage name in the global ordering.
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.stages.len(), 5);
        assert_eq!(config.stage_index("CORE"), Some(2));
        assert_eq!(config.stage_index("NOPE"), None);
        assert_eq!(config.max_extraction_depth, 6);
    }
}
