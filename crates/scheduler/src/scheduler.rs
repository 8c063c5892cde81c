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

//! Staged schedule construction.
//!
//! ## Algorithm
//! 1. Expand category names in selected/excluded to their member services
//!    (transitively, each category expanded once)
//! 2. Empty selected set means every enabled service
//! 3. Final set = expanded(selected) − expanded(excluded)
//! 4. A service is admitted for a file type iff its accepts regex is empty
//!    or matches, and its rejects regex is empty or does not match
//! 5. Each admitted service lands in the stage given by the global stage
//!    ordering; empty stages are preserved so stage indices stay stable

use crate::catalog::ServiceCatalog;
use crate::{SchedulerError, SchedulerResult};
use regex::Regex;
use sifter_core::{Service, Submission, SystemConfig};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// An ordered sequence of stages; each stage maps service name → service.
pub type Schedule = Vec<HashMap<String, Service>>;

/// Builds per-file-type staged schedules from the service catalog.
pub struct Scheduler {
    config: SystemConfig,
    catalog: Arc<ServiceCatalog>,
}

impl Scheduler {
    /// Create a scheduler over a catalog view.
    pub fn new(config: SystemConfig, catalog: Arc<ServiceCatalog>) -> Self {
        Self { config, catalog }
    }

    /// The catalog this scheduler reads.
    pub fn catalog(&self) -> &Arc<ServiceCatalog> {
        &self.catalog
    }

    /// Verify every cataloged service declares a stage present in the
    /// global ordering. Run once at process startup: an unknown stage is a
    /// configuration error that would otherwise surface mid-dispatch.
    pub async fn validate(&self) -> SchedulerResult<()> {
        let services = self.catalog.services().await?;
        for service in services.values() {
            if self.config.stage_index(&service.stage).is_none() {
                return Err(SchedulerError::UnknownStage {
                    service: service.name.clone(),
                    stage: service.stage.clone(),
                });
            }
        }
        Ok(())
    }

    /// Build the schedule for one file type under a submission's selection
    /// parameters. The result always has one entry per configured stage.
    pub async fn build_schedule(
        &self,
        submission: &Submission,
        file_type: &str,
    ) -> SchedulerResult<Schedule> {
        let services = self.catalog.services().await?;
        let categories = self.catalog.categories().await?;

        let selected: HashSet<String> = if submission.params.selected.is_empty() {
            services.keys().cloned().collect()
        } else {
            Self::expand_categories(&submission.params.selected, &services, &categories)
        };
        let excluded =
            Self::expand_categories(&submission.params.excluded, &services, &categories);

        let mut schedule: Schedule = vec![HashMap::new(); self.config.stages.len()];
        for name in selected.difference(&excluded) {
            // Expansion only emits known names, so the lookup cannot miss.
            let Some(service) = services.get(name) else {
                continue;
            };
            if !Self::admits(service, file_type) {
                continue;
            }
            let index = self.config.stage_index(&service.stage).ok_or_else(|| {
                SchedulerError::UnknownStage {
                    service: service.name.clone(),
                    stage: service.stage.clone(),
                }
            })?;
            schedule[index].insert(service.name.clone(), service.clone());
        }
        Ok(schedule)
    }

    /// Expand a mixed list of category and service names into service
    /// names. Categories expand transitively with a seen-set; names that
    /// are neither a category nor a known service are dropped with a
    /// warning.
    fn expand_categories(
        names: &[String],
        services: &HashMap<String, Service>,
        categories: &HashMap<String, Vec<String>>,
    ) -> HashSet<String> {
        let mut found = HashSet::new();
        let mut seen_categories: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = names.to_vec();

        while let Some(name) = worklist.pop() {
            if let Some(members) = categories.get(&name) {
                if seen_categories.insert(name) {
                    worklist.extend(members.iter().cloned());
                }
            } else if services.contains_key(&name) {
                found.insert(name);
            } else {
                warn!(name = %name, "Unknown service or category in selection, skipping");
            }
        }
        found
    }

    /// Accepts/rejects admission for a file type. Empty patterns admit;
    /// invalid patterns are warned and treated as non-matching.
    fn admits(service: &Service, file_type: &str) -> bool {
        if !service.accepts.is_empty() {
            match Regex::new(&service.accepts) {
                Ok(re) => {
                    if !re.is_match(file_type) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(service = %service.name, %err, "Invalid accepts regex, skipping service");
                    return false;
                }
            }
        }
        if !service.rejects.is_empty() {
            match Regex::new(&service.rejects) {
                Ok(re) => {
                    if re.is_match(file_type) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(service = %service.name, %err, "Invalid rejects regex, skipping service");
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sifter_core::{SubmissionParams, SystemConfig};
    use sifter_datastore::{Datastore, InMemoryDatastore};
    use std::time::Duration;

    fn service(name: &str, category: &str, stage: &str, accepts: &str, rejects: &str) -> Service {
        let mut svc = Service::new(name, category, stage, 60);
        svc.accepts = accepts.to_string();
        svc.rejects = rejects.to_string();
        svc
    }

    async fn scheduler_with(services: Vec<Service>) -> Scheduler {
        let store = Arc::new(InMemoryDatastore::new());
        for svc in &services {
            store.save_service(svc).await.unwrap();
        }
        let catalog = Arc::new(ServiceCatalog::new(store, Duration::from_secs(300)));
        Scheduler::new(SystemConfig::default(), catalog)
    }

    fn submission(selected: &[&str], excluded: &[&str]) -> Submission {
        Submission::new(
            "sid-1",
            vec![],
            SubmissionParams {
                selected: selected.iter().map(|s| s.to_string()).collect(),
                excluded: excluded.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    fn stage_names(schedule: &Schedule, index: usize) -> Vec<String> {
        let mut names: Vec<String> = schedule[index].keys().cloned().collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_empty_selection_takes_all_enabled() {
        let scheduler = scheduler_with(vec![
            service("extract", "Extraction", "EXTRACT", "", ""),
            service("av", "Antivirus", "CORE", "", ""),
        ])
        .await;

        let schedule = scheduler
            .build_schedule(&submission(&[], &[]), "document/pdf")
            .await
            .unwrap();
        assert_eq!(schedule.len(), 5);
        assert_eq!(stage_names(&schedule, 1), vec!["extract"]);
        assert_eq!(stage_names(&schedule, 2), vec!["av"]);
    }

    #[tokio::test]
    async fn test_category_expansion_and_exclusion() {
        let scheduler = scheduler_with(vec![
            service("av-one", "Antivirus", "CORE", "", ""),
            service("av-two", "Antivirus", "CORE", "", ""),
            service("extract", "Extraction", "EXTRACT", "", ""),
        ])
        .await;

        let schedule = scheduler
            .build_schedule(&submission(&["Antivirus"], &["av-two"]), "any")
            .await
            .unwrap();
        assert_eq!(stage_names(&schedule, 2), vec!["av-one"]);
        assert!(schedule[1].is_empty());
    }

    #[tokio::test]
    async fn test_excluding_whole_category() {
        let scheduler = scheduler_with(vec![
            service("av-one", "Antivirus", "CORE", "", ""),
            service("extract", "Extraction", "EXTRACT", "", ""),
        ])
        .await;

        let schedule = scheduler
            .build_schedule(&submission(&[], &["Antivirus"]), "any")
            .await
            .unwrap();
        assert!(schedule[2].is_empty());
        assert_eq!(stage_names(&schedule, 1), vec!["extract"]);
    }

    #[tokio::test]
    async fn test_accepts_and_rejects_regexes() {
        let scheduler = scheduler_with(vec![
            service("pdf-only", "Static", "CORE", "document/pdf", ""),
            service("no-archives", "Static", "CORE", "", "archive/.*"),
            service("everything", "Static", "CORE", "", ""),
        ])
        .await;

        let schedule = scheduler
            .build_schedule(&submission(&[], &[]), "archive/zip")
            .await
            .unwrap();
        assert_eq!(stage_names(&schedule, 2), vec!["everything"]);

        let schedule = scheduler
            .build_schedule(&submission(&[], &[]), "document/pdf")
            .await
            .unwrap();
        assert_eq!(
            stage_names(&schedule, 2),
            vec!["everything", "no-archives", "pdf-only"]
        );
    }

    #[tokio::test]
    async fn test_unknown_selection_name_dropped() {
        let scheduler = scheduler_with(vec![service("av", "Antivirus", "CORE", "", "")]).await;

        let schedule = scheduler
            .build_schedule(&submission(&["av", "no-such-service"], &[]), "any")
            .await
            .unwrap();
        assert_eq!(stage_names(&schedule, 2), vec!["av"]);
    }

    #[tokio::test]
    async fn test_unknown_stage_is_fatal() {
        let scheduler = scheduler_with(vec![service("odd", "Static", "NOT_A_STAGE", "", "")]).await;

        let err = scheduler.validate().await.unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownStage { .. }));

        let err = scheduler
            .build_schedule(&submission(&[], &[]), "any")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownStage { .. }));
    }

    #[tokio::test]
    async fn test_schedule_length_matches_stage_count() {
        let scheduler = scheduler_with(vec![]).await;
        let schedule = scheduler
            .build_schedule(&submission(&[], &[]), "any")
            .await
            .unwrap();
        assert_eq!(schedule.len(), SystemConfig::default().stages.len());
        assert!(schedule.iter().all(HashMap::is_empty));
    }
}
