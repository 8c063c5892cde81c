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

//! File-level dispatch.
//!
//! ## Purpose
//! Consumes the `file` queue. Each pass walks the file's cached schedule to
//! the first stage with outstanding services and dispatches a task per
//! outstanding service; once every stage is terminal the file is counted
//! complete and the submission is poked to re-check itself.
//!
//! ## Redispatch
//! Dispatching records a timestamp. A later pass (driven by the timeout
//! watcher) skips pairs younger than the service's timeout and re-pushes
//! the rest, so lost service tasks self-heal without per-task acks.

use crate::dispatch_hash::{DispatchHash, DispatchRecord};
use crate::names::{
    dispatch_task_hash_name, service_queue_name, tags_set_name, FILE_QUEUE, SUBMISSION_QUEUE,
    TASK_FIELD,
};
use crate::{DispatchEnv, DispatcherMetrics, DispatcherResult, TimeoutWatcher};
use sifter_core::{
    now_seconds, FileTask, Service, ServiceTask, SubmissionMessage, SubmissionParams,
    SubmissionTask, SystemConfig,
};
use sifter_coordination::{HashStore, JsonQueue, QueueBroker, SetStore};
use sifter_scheduler::Scheduler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Drives single files: the consumer of the `file` queue.
pub struct FileDispatcher {
    env: DispatchEnv,
    scheduler: Arc<Scheduler>,
    config: SystemConfig,
    timeout_watcher: Arc<TimeoutWatcher>,
    metrics: Arc<DispatcherMetrics>,
    queue: JsonQueue<FileTask>,
    submission_queue: JsonQueue<SubmissionMessage>,
    shutdown: Arc<Notify>,
}

impl FileDispatcher {
    /// Build a dispatcher over the shared environment.
    pub fn new(
        env: DispatchEnv,
        scheduler: Arc<Scheduler>,
        config: SystemConfig,
        timeout_watcher: Arc<TimeoutWatcher>,
        metrics: Arc<DispatcherMetrics>,
    ) -> Self {
        let queue = JsonQueue::new(env.queues.clone(), FILE_QUEUE);
        let submission_queue = JsonQueue::new(env.queues.clone(), SUBMISSION_QUEUE);
        Self {
            env,
            scheduler,
            config,
            timeout_watcher,
            metrics,
            queue,
            submission_queue,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Consume the `file` queue until [`FileDispatcher::stop`].
    pub async fn run(&self) -> DispatcherResult<()> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        info!("File dispatcher started");
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("File dispatcher stopping");
                    return Ok(());
                }
                task = self.queue.pop(poll) => {
                    match task {
                        Ok(Some(task)) => {
                            let sid = task.sid.clone();
                            let sha256 = task.file.sha256.clone();
                            if let Err(err) = self.handle(task).await {
                                error!(sid = %sid, sha256 = %sha256, %err,
                                    "File dispatch pass failed");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => error!(%err, "Failed to pop file queue"),
                    }
                }
            }
        }
    }

    /// Signal the consumer loop to stop after the current message.
    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    /// One dispatch pass over a single file.
    pub async fn handle(&self, task: FileTask) -> DispatcherResult<()> {
        let sid = &task.sid;
        let sha256 = &task.file.sha256;

        let stored = self
            .env
            .hashes
            .hget(&dispatch_task_hash_name(sid), TASK_FIELD)
            .await?;
        let Some(stored) = stored else {
            warn!(sid = %sid, sha256 = %sha256, "File task for inactive submission, dropping");
            return Ok(());
        };
        let submission_task: SubmissionTask = serde_json::from_slice(&stored)?;
        let params = &submission_task.submission.params;

        // File-level activity keeps the registration alive too; steady file
        // traffic holds off the liveness re-entry, so without this the
        // active-task TTL would lapse mid-submission.
        self.env
            .hashes
            .expire(
                &dispatch_task_hash_name(sid),
                Duration::from_secs(self.config.dispatcher_timeout * 2),
            )
            .await?;
        self.timeout_watcher
            .touch(
                sid,
                Duration::from_secs(self.config.dispatcher_timeout),
                SUBMISSION_QUEUE,
                serde_json::to_vec(&SubmissionMessage::Entry { sid: sid.clone() })?,
            )
            .await;

        let dispatch = DispatchHash::new(self.env.hashes.clone(), self.env.sets.clone(), sid);
        let mut schedule = match dispatch.get_schedule(sha256).await? {
            Some(schedule) => schedule,
            None => {
                let full = self
                    .scheduler
                    .build_schedule(&submission_task.submission, &task.file.file_type)
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

        // Walk to the first stage with outstanding services. A drop record
        // truncates every later stage; its own stage still runs to
        // completion.
        let mut outstanding: Vec<String> = Vec::new();
        let mut truncate_after: Option<usize> = None;
        for (index, stage) in schedule.iter().enumerate() {
            let mut dropped = false;
            for service in stage {
                match dispatch.finished(sha256, service).await? {
                    None => outstanding.push(service.clone()),
                    Some(record) => {
                        if record.is_drop() && !params.ignore_filtering {
                            dropped = true;
                        }
                    }
                }
            }
            if dropped {
                truncate_after = Some(index);
                break;
            }
            if !outstanding.is_empty() {
                break;
            }
        }

        if let Some(index) = truncate_after {
            schedule.truncate(index + 1);
            dispatch.set_schedule(sha256, &schedule).await?;
            debug!(sid = %sid, sha256 = %sha256, stages = schedule.len(),
                "Schedule truncated by drop result");
        }

        if outstanding.is_empty() {
            return self.complete_file(&dispatch, &task, params).await;
        }

        let services = self.scheduler.catalog().services().await?;
        let dispatches = dispatch.all_dispatches().await?;
        for name in &outstanding {
            let Some(service) = services.get(name) else {
                // vanished from the catalog between scheduling and now; the
                // next timeout pass retries against a refreshed catalog
                warn!(sid = %sid, service = %name, "Scheduled service not in catalog");
                continue;
            };
            let dispatched_at = dispatches
                .get(sha256)
                .and_then(|times| times.get(name))
                .copied()
                .unwrap_or(0.0);
            if now_seconds() - dispatched_at < service.timeout as f64 {
                continue;
            }
            dispatch.dispatch(sha256, name).await?;
            let service_task = ServiceTask {
                sid: sid.clone(),
                service_name: name.clone(),
                service_config: Self::merge_service_config(service, params),
                file: task.file.clone(),
                depth: task.depth,
                max_files: task.max_files,
                ttl: params.ttl,
                ignore_cache: params.ignore_cache,
            };
            self.env
                .queues
                .push(&service_queue_name(name), serde_json::to_vec(&service_task)?)
                .await?;
            debug!(sid = %sid, sha256 = %sha256, service = %name, "Dispatched service task");
        }
        Ok(())
    }

    /// All stages terminal: clean up per-file state and poke the submission
    /// to re-check completion.
    async fn complete_file(
        &self,
        dispatch: &DispatchHash,
        task: &FileTask,
        params: &SubmissionParams,
    ) -> DispatcherResult<()> {
        // duplicate passes over a finished file stop here
        if !dispatch.mark_file_completed(&task.file.sha256).await? {
            return Ok(());
        }
        // TODO: keep tag buffers until result post-processing consumes them
        self.env
            .sets
            .delete_set(&tags_set_name(&task.sid, &task.file.sha256))
            .await?;
        self.metrics.increment_files_completed();
        debug!(sid = %task.sid, sha256 = %task.file.sha256, "File completed");

        if dispatch.all_finished(params.ignore_filtering).await? {
            self.submission_queue
                .push(&SubmissionMessage::Entry {
                    sid: task.sid.clone(),
                })
                .await?;
        }
        Ok(())
    }

    /// Service configuration handed to a task: catalog defaults overlaid
    /// with the submission's per-service overrides. Non-object overrides
    /// are ignored.
    fn merge_service_config(service: &Service, params: &SubmissionParams) -> serde_json::Value {
        let mut config = serde_json::Map::new();
        for default in &service.submission_params {
            config.insert(default.name.clone(), default.value.clone());
        }
        if let Some(serde_json::Value::Object(overrides)) = params.service_spec.get(&service.name)
        {
            for (key, value) in overrides {
                config.insert(key.clone(), value.clone());
            }
        }
        serde_json::Value::Object(config)
    }
}
