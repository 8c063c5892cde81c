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

//! Cached enabled-services view over the datastore catalog.
//!
//! ## Design
//! The catalog is refreshed lazily: a read that finds the cache older than
//! the refresh interval refetches from the datastore. Disabled services are
//! filtered out at fetch time so every consumer sees only dispatchable
//! services.

use crate::{SchedulerError, SchedulerResult};
use sifter_core::Service;
use sifter_datastore::Datastore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct CatalogCache {
    fetched_at: Instant,
    services: Arc<HashMap<String, Service>>,
}

/// Cached, periodically refreshed view of the enabled services.
pub struct ServiceCatalog {
    datastore: Arc<dyn Datastore>,
    refresh_interval: Duration,
    cache: RwLock<Option<CatalogCache>>,
}

impl ServiceCatalog {
    /// Create a catalog view refreshed at most every `refresh_interval`.
    pub fn new(datastore: Arc<dyn Datastore>, refresh_interval: Duration) -> Self {
        Self {
            datastore,
            refresh_interval,
            cache: RwLock::new(None),
        }
    }

    /// Enabled services by name. Refetches when the cache is stale.
    pub async fn services(&self) -> SchedulerResult<Arc<HashMap<String, Service>>> {
        {
            let cache = self.cache.read().await;
            if let Some(state) = cache.as_ref() {
                if state.fetched_at.elapsed() < self.refresh_interval {
                    return Ok(Arc::clone(&state.services));
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(state) = cache.as_ref() {
            if state.fetched_at.elapsed() < self.refresh_interval {
                return Ok(Arc::clone(&state.services));
            }
        }

        let services: HashMap<String, Service> = self
            .datastore
            .list_services()
            .await
            .map_err(SchedulerError::from)?
            .into_iter()
            .filter(|s| s.enabled)
            .map(|s| (s.name.clone(), s))
            .collect();
        debug!(count = services.len(), "Refreshed service catalog");

        let services = Arc::new(services);
        *cache = Some(CatalogCache {
            fetched_at: Instant::now(),
            services: Arc::clone(&services),
        });
        Ok(services)
    }

    /// Category name → sorted member service names, over enabled services.
    pub async fn categories(&self) -> SchedulerResult<HashMap<String, Vec<String>>> {
        let services = self.services().await?;
        let mut categories: HashMap<String, Vec<String>> = HashMap::new();
        for service in services.values() {
            categories
                .entry(service.category.clone())
                .or_default()
                .push(service.name.clone());
        }
        for members in categories.values_mut() {
            members.sort();
        }
        Ok(categories)
    }

    /// Drop the cache so the next read refetches. Test convenience.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
