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

//! Submission-level dispatch.
//!
//! ## Purpose
//! Consumes the `submission` queue and performs one full dispatch pass per
//! message: register the submission, enumerate every file encountered so
//! far (roots plus extracted children), re-queue the unfinished ones as
//! file tasks, and finalize or cancel once nothing remains.
//!
//! ## Idempotence
//! A pass over an already-finished submission finds no pending files and
//! finalizes; a pass over untouched work re-queues it. Duplicate messages
//! and timeout re-entries therefore converge instead of corrupting state.

use crate::dispatch_hash::{DispatchHash, DispatchRecord};
use crate::names::{
    dispatch_task_hash_name, quota_hash_name, FILE_QUEUE, SUBMISSION_QUEUE, TASK_FIELD,
};
use crate::{
    DispatchEnv, DispatcherMetrics, DispatcherResult, TimeoutWatcher, WatcherNotifier,
};
use chrono::Utc;
use sifter_core::{
    ClassificationEngine, ErrorRecord, FileRef, FileTask, Submission, SubmissionMessage,
    SubmissionState, SubmissionTask, SystemConfig,
};
use sifter_coordination::{HashStore, JsonQueue, QueueBroker};
use sifter_scheduler::Scheduler;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Drives submissions: the consumer of the `submission` queue.
pub struct SubmissionDispatcher {
    env: DispatchEnv,
    scheduler: Arc<Scheduler>,
    config: SystemConfig,
    classification: ClassificationEngine,
    timeout_watcher: Arc<TimeoutWatcher>,
    notifier: WatcherNotifier,
    metrics: Arc<DispatcherMetrics>,
    queue: JsonQueue<SubmissionMessage>,
    file_queue: JsonQueue<FileTask>,
    shutdown: Arc<Notify>,
}

/// Aggregates collected while walking a submission's terminal records.
#[derive(Default)]
struct DispatchSummary {
    results: Vec<String>,
    errors: Vec<String>,
    max_score: i32,
    classifications: Vec<String>,
    files: Vec<SurveyedFile>,
}

struct SurveyedFile {
    file: FileRef,
    depth: u32,
    parent: Option<String>,
    pending: bool,
}

impl SubmissionDispatcher {
    /// Build a dispatcher over the shared environment.
    pub fn new(
        env: DispatchEnv,
        scheduler: Arc<Scheduler>,
        config: SystemConfig,
        timeout_watcher: Arc<TimeoutWatcher>,
        metrics: Arc<DispatcherMetrics>,
    ) -> Self {
        let queue = JsonQueue::new(env.queues.clone(), SUBMISSION_QUEUE);
        let file_queue = JsonQueue::new(env.queues.clone(), FILE_QUEUE);
        let notifier = WatcherNotifier::new(env.sets.clone(), env.queues.clone());
        Self {
            env,
            scheduler,
            config,
            classification: ClassificationEngine::default(),
            timeout_watcher,
            notifier,
            metrics,
            queue,
            file_queue,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Watcher registration interface for completion listeners.
    pub fn notifier(&self) -> &WatcherNotifier {
        &self.notifier
    }

    /// Consume the `submission` queue until [`SubmissionDispatcher::stop`].
    pub async fn run(&self) -> DispatcherResult<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        info!("Submission dispatcher started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Submission dispatcher stopping");
                    return Ok(());
                }
                message = self.queue.pop(poll) => {
                    match message {
                        Ok(Some(message)) => {
                            let sid = message.sid().to_string();
                            if let Err(err) = self.handle(message).await {
                                error!(sid = %sid, %err, "Submission dispatch pass failed");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => error!(%err, "Failed to pop submission queue"),
                    }
                }
            }
        }
    }

    /// Signal the consumer loop to stop after the current message.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    /// One full dispatch pass over a submission.
    pub async fn handle(&self, message: SubmissionMessage) -> DispatcherResult<()> {
        let task = match self.resolve_task(message).await? {
            Some(task) => task,
            None => return Ok(()),
        };
        let sid = task.submission.sid.clone();
        let dispatch = DispatchHash::new(self.env.hashes.clone(), self.env.sets.clone(), &sid);

        self.register(&task).await?;

        // Roots enter the file tree before enumeration so children found by
        // services always connect to something.
        for entry in &task.submission.files {
            dispatch.add_parent(&entry.sha256, None).await?;
        }

        let tree = dispatch.file_tree().await?;
        let unchecked = Self::enumerate_files(&task.submission, &tree);
        let refs = self.env.datastore.multi_get_files(&unchecked).await?;

        let missing: Vec<&String> = unchecked
            .iter()
            .zip(&refs)
            .filter(|(_, r)| r.is_none())
            .map(|(sha, _)| sha)
            .collect();
        if !missing.is_empty() {
            for sha256 in missing {
                warn!(sid = %sid, sha256 = %sha256, "File missing from storage, cancelling");
                let record =
                    ErrorRecord::missing_file(sha256.clone(), task.submission.expiry_ts);
                let key = record.build_key();
                self.env.datastore.save_error(&key, &record).await?;
                dispatch.add_error(&key).await?;
            }
            return self.cancel_submission(task, &dispatch).await;
        }

        let depths = Self::compute_depths(&tree);
        let summary = self.survey(&task.submission, &dispatch, &unchecked, &refs, &depths).await?;

        // Every surveyed file goes through admission, finished or not: a
        // file whose schedule is empty never produces a task but still
        // consumes budget and counts toward file_count.
        let mut queued = 0usize;
        for entry in &summary.files {
            if entry.depth >= self.config.max_extraction_depth {
                debug!(sid = %sid, sha256 = %entry.file.sha256, depth = entry.depth,
                    "Extraction depth limit reached, dropping file");
                continue;
            }
            if !dispatch
                .add_file(
                    &entry.file.sha256,
                    task.submission.max_files(),
                    entry.parent.as_deref(),
                )
                .await?
            {
                debug!(sid = %sid, sha256 = %entry.file.sha256,
                    "File budget exhausted, dropping file");
                continue;
            }
            if !entry.pending {
                continue;
            }
            self.file_queue
                .push(&FileTask {
                    sid: sid.clone(),
                    parent_hash: entry.parent.clone(),
                    file: entry.file.clone(),
                    depth: entry.depth,
                    max_files: task.submission.max_files(),
                })
                .await?;
            queued += 1;
        }

        if queued > 0 {
            debug!(sid = %sid, queued, "Queued file tasks");
            return Ok(());
        }
        // Nothing left in flight: every file is either terminal or was
        // dropped by the depth/budget limits, so the submission is done.
        self.finalize_submission(task, &dispatch, summary).await
    }

    /// Unpack the message into its task: full tasks pass through, re-entry
    /// sids are resolved against the active-tasks map.
    async fn resolve_task(
        &self,
        message: SubmissionMessage,
    ) -> DispatcherResult<Option<SubmissionTask>> {
        match message {
            SubmissionMessage::Task(task) => Ok(Some(*task)),
            SubmissionMessage::Entry { sid } => {
                let stored = self
                    .env
                    .hashes
                    .hget(&dispatch_task_hash_name(&sid), TASK_FIELD)
                    .await?;
                match stored {
                    Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                    None => {
                        warn!(sid = %sid, "Re-entry for unknown submission, dropping");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Register the submission in the TTL-bounded active-tasks map, arm its
    /// liveness deadline, and take its quota slot.
    async fn register(&self, task: &SubmissionTask) -> DispatcherResult<()> {
        let sid = &task.submission.sid;
        let hash = dispatch_task_hash_name(sid);
        let fresh = self
            .env
            .hashes
            .hset_if_absent(&hash, TASK_FIELD, serde_json::to_vec(task)?)
            .await?;
        // TTL twice the liveness timeout: the watcher must get a chance to
        // re-drive before the registration evaporates
        self.env
            .hashes
            .expire(&hash, Duration::from_secs(self.config.dispatcher_timeout * 2))
            .await?;

        self.timeout_watcher
            .touch(
                sid,
                Duration::from_secs(self.config.dispatcher_timeout),
                SUBMISSION_QUEUE,
                serde_json::to_vec(&SubmissionMessage::Entry { sid: sid.clone() })?,
            )
            .await;

        let params = &task.submission.params;
        if fresh && params.quota_item && !params.submitter.is_empty() {
            self.env
                .hashes
                .hset(&quota_hash_name(&params.submitter), sid, b"1".to_vec())
                .await?;
        }
        Ok(())
    }

    /// Every sha encountered so far: roots first, then tree entries.
    fn enumerate_files(
        submission: &Submission,
        tree: &HashMap<String, Vec<Option<String>>>,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();
        for entry in &submission.files {
            if seen.insert(entry.sha256.clone()) {
                files.push(entry.sha256.clone());
            }
        }
        let mut extracted: Vec<&String> = tree.keys().collect();
        extracted.sort();
        for sha256 in extracted {
            if seen.insert(sha256.clone()) {
                files.push(sha256.clone());
            }
        }
        files
    }

    /// Extraction depth per file: breadth-first from the roots, so a file
    /// reachable through several parents gets the depth of its shallowest
    /// one. Files not connected to any root are absent from the result.
    fn compute_depths(tree: &HashMap<String, Vec<Option<String>>>) -> HashMap<String, u32> {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut depths = HashMap::new();

        for (sha256, parents) in tree {
            for parent in parents {
                match parent {
                    Some(parent) => children.entry(parent.as_str()).or_default().push(sha256),
                    None => {
                        if !depths.contains_key(sha256) {
                            depths.insert(sha256.clone(), 0);
                            queue.push_back(sha256.as_str());
                        }
                    }
                }
            }
        }
        while let Some(sha256) = queue.pop_front() {
            let depth = depths[sha256];
            if let Some(kids) = children.get(sha256) {
                for &child in kids {
                    if !depths.contains_key(child) {
                        depths.insert(child.to_string(), depth + 1);
                        queue.push_back(child);
                    }
                }
            }
        }
        depths
    }

    /// The shallowest concrete parent of a file, used to account fan-out
    /// against one parent rather than all of them.
    fn shallowest_parent(
        tree: &HashMap<String, Vec<Option<String>>>,
        depths: &HashMap<String, u32>,
        sha256: &str,
    ) -> Option<String> {
        tree.get(sha256)?
            .iter()
            .flatten()
            .min_by_key(|parent| depths.get(*parent).copied().unwrap_or(u32::MAX))
            .cloned()
    }

    /// Walk every file's schedule against the terminal records, aggregating
    /// terminal outcomes and flagging the files that still have work.
    async fn survey(
        &self,
        submission: &Submission,
        dispatch: &DispatchHash,
        unchecked: &[String],
        refs: &[Option<FileRef>],
        depths: &HashMap<String, u32>,
    ) -> DispatcherResult<DispatchSummary> {
        let tree = dispatch.file_tree().await?;
        let results = dispatch.all_results().await?;
        let mut summary = DispatchSummary::default();

        for (sha256, file) in unchecked.iter().zip(refs) {
            let Some(file) = file else { continue };
            let Some(depth) = depths.get(sha256).copied() else {
                // disconnected from every root, ignore
                continue;
            };

            let schedule = match dispatch.get_schedule(sha256).await? {
                Some(schedule) => schedule,
                None => {
                    let full = self
                        .scheduler
                        .build_schedule(submission, &file.file_type)
                        .await?;
                    let names: Vec<Vec<String>> = full
                        .iter()
                        .map(|stage| {
                            let mut names: Vec<String> = stage.keys().cloned().collect();
                            names.sort();
                            names
                        })
                        .collect();
                    dispatch.set_schedule(sha256, &names).await?;
                    names
                }
            };

            let mut file_pending = false;
            for stage in &schedule {
                let mut dropped = false;
                for service in stage {
                    match results.get(sha256).and_then(|r| r.get(service)) {
                        None => file_pending = true,
                        Some(DispatchRecord::Result {
                            key,
                            score,
                            drop,
                            classification,
                            ..
                        }) => {
                            summary.results.push(key.clone());
                            summary.max_score = summary.max_score.max(*score);
                            if !classification.is_empty() {
                                summary.classifications.push(classification.clone());
                            }
                            if *drop && !submission.params.ignore_filtering {
                                dropped = true;
                            }
                        }
                        Some(DispatchRecord::Error { key }) => {
                            summary.errors.push(key.clone());
                        }
                    }
                }
                if file_pending || dropped {
                    break;
                }
            }

            summary.files.push(SurveyedFile {
                file: file.clone(),
                depth,
                parent: Self::shallowest_parent(&tree, depths, sha256),
                pending: file_pending,
            });
        }
        Ok(summary)
    }

    /// Write the submission back in `Completed` state with its aggregated
    /// outcomes, then tear down its transient state.
    async fn finalize_submission(
        &self,
        task: SubmissionTask,
        dispatch: &DispatchHash,
        summary: DispatchSummary,
    ) -> DispatcherResult<()> {
        let mut submission = task.submission.clone();

        submission.classification = summary
            .classifications
            .iter()
            .fold(submission.params.classification.clone(), |acc, label| {
                self.classification.max_classification(&acc, label).to_string()
            });
        submission.max_score = summary.max_score;
        submission.file_count = dispatch.admitted_count().await? as u32;

        let mut results = summary.results;
        results.sort();
        results.dedup();
        submission.results = results;

        let mut errors = summary.errors;
        errors.extend(dispatch.all_extra_errors().await?);
        errors.sort();
        errors.dedup();
        submission.errors = errors;

        submission.state = SubmissionState::Completed;
        submission.times.completed = Some(Utc::now());
        self.env.datastore.save_submission(&submission).await?;

        info!(sid = %submission.sid, score = submission.max_score,
            files = submission.file_count, "Submission completed");
        self.cleanup_submission(&task, &submission, dispatch).await
    }

    /// Write the submission back in `Failed` state carrying the error keys
    /// accumulated so far, then tear down its transient state.
    async fn cancel_submission(
        &self,
        task: SubmissionTask,
        dispatch: &DispatchHash,
    ) -> DispatcherResult<()> {
        let mut submission = task.submission.clone();
        let mut errors = dispatch.all_extra_errors().await?;
        errors.sort();
        submission.errors = errors;
        submission.state = SubmissionState::Failed;
        submission.times.completed = Some(Utc::now());
        self.env.datastore.save_submission(&submission).await?;

        warn!(sid = %submission.sid, errors = submission.errors.len(),
            "Submission cancelled");
        self.cleanup_submission(&task, &submission, dispatch).await
    }

    /// Transient-state teardown shared by finalize and cancel. Every step
    /// tolerates having already run, so a crashed teardown can be replayed;
    /// the dispatch state goes last, since a re-entry replaying the
    /// teardown needs it to observe the submission as finished.
    async fn cleanup_submission(
        &self,
        task: &SubmissionTask,
        submission: &Submission,
        dispatch: &DispatchHash,
    ) -> DispatcherResult<()> {
        let sid = &submission.sid;
        let params = &submission.params;
        if params.quota_item && !params.submitter.is_empty() {
            self.env
                .hashes
                .hdel(&quota_hash_name(&params.submitter), sid)
                .await?;
        }
        if let Some(queue) = &task.completed_queue {
            self.env
                .queues
                .push(queue, serde_json::to_vec(submission)?)
                .await?;
        }
        self.notifier.stop_all(sid).await?;
        self.timeout_watcher.clear(sid).await;
        self.env
            .hashes
            .delete_hash(&dispatch_task_hash_name(sid))
            .await?;
        dispatch.delete().await?;
        self.metrics.increment_submissions_completed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(edges: &[(&str, Option<&str>)]) -> HashMap<String, Vec<Option<String>>> {
        let mut tree: HashMap<String, Vec<Option<String>>> = HashMap::new();
        for (sha256, parent) in edges {
            tree.entry((*sha256).to_string())
                .or_default()
                .push(parent.map(str::to_string));
        }
        tree
    }

    #[test]
    fn test_depths_take_shallowest_path() {
        let tree = tree_of(&[
            ("root", None),
            ("child", Some("root")),
            ("grand", Some("child")),
            // also directly attached to the root
            ("grand", Some("root")),
        ]);
        let depths = SubmissionDispatcher::compute_depths(&tree);
        assert_eq!(depths["root"], 0);
        assert_eq!(depths["child"], 1);
        assert_eq!(depths["grand"], 1);
    }

    #[test]
    fn test_disconnected_files_have_no_depth() {
        let tree = tree_of(&[("root", None), ("orphan", Some("nowhere"))]);
        let depths = SubmissionDispatcher::compute_depths(&tree);
        assert_eq!(depths.len(), 1);
        assert!(!depths.contains_key("orphan"));
    }

    #[test]
    fn test_shallowest_parent_prefers_lower_depth() {
        let tree = tree_of(&[
            ("root", None),
            ("mid", Some("root")),
            ("leaf", Some("mid")),
            ("leaf", Some("root")),
        ]);
        let depths = SubmissionDispatcher::compute_depths(&tree);
        assert_eq!(
            SubmissionDispatcher::shallowest_parent(&tree, &depths, "leaf"),
            Some("root".to_string())
        );
        assert_eq!(
            SubmissionDispatcher::shallowest_parent(&tree, &depths, "root"),
            None
        );
    }
}
