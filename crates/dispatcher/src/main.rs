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

//! Dispatcher daemon.
//!
//! Wires the full stack from environment configuration: coordination
//! backend, datastore, service catalog, scheduler, timeout watcher, and the
//! two consumer loops. Runs until SIGINT.
//!
//! Configuration comes from `SIFTER_*` environment variables (see
//! [`sifter_core::SystemConfig::from_env`]) and `RUST_LOG` for log
//! filtering.

use sifter_coordination::InMemoryCoordination;
use sifter_datastore::InMemoryDatastore;
use sifter_dispatcher::{
    DispatchEnv, DispatcherMetrics, FileDispatcher, SubmissionDispatcher, TimeoutWatcher,
};
use sifter_scheduler::{Scheduler, ServiceCatalog};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let config = sifter_core::SystemConfig::from_env()?;

    let coord = Arc::new(InMemoryCoordination::new());
    let store = Arc::new(InMemoryDatastore::new());
    let env = DispatchEnv::new(coord.clone(), store.clone());

    let catalog = Arc::new(ServiceCatalog::new(
        store,
        Duration::from_secs(config.service_refresh_secs),
    ));
    let scheduler = Arc::new(Scheduler::new(config.clone(), catalog));
    // a service declaring an unknown stage is fatal here, not at dispatch
    scheduler.validate().await?;

    let timeout_watcher = Arc::new(TimeoutWatcher::new(coord, Duration::from_secs(1)));
    let watcher_handle = timeout_watcher.start();

    let metrics = Arc::new(DispatcherMetrics::new());
    let submission_dispatcher = Arc::new(SubmissionDispatcher::new(
        env.clone(),
        scheduler.clone(),
        config.clone(),
        timeout_watcher.clone(),
        metrics.clone(),
    ));
    let file_dispatcher = Arc::new(FileDispatcher::new(
        env,
        scheduler,
        config,
        timeout_watcher.clone(),
        metrics,
    ));

    info!("Sifter dispatcher starting");
    let submission_loop = {
        let dispatcher = submission_dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };
    let file_loop = {
        let dispatcher = file_dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    submission_dispatcher.stop();
    file_dispatcher.stop();
    timeout_watcher.stop();

    if let Err(err) = submission_loop.await? {
        error!(%err, "Submission loop exited with error");
    }
    if let Err(err) = file_loop.await? {
        error!(%err, "File loop exited with error");
    }
    watcher_handle.await?;
    info!("Sifter dispatcher stopped");
    Ok(())
}
