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

//! # Sifter Scheduler
//!
//! ## Purpose
//! Builds, per file type, the staged service schedule a file moves through:
//! which services run, and in which stage, respecting the submission's
//! selected/excluded sets and each service's accepts/rejects matchers.
//!
//! ## Architecture Context
//! Both dispatchers consult the scheduler: the submission dispatcher to cache
//! a schedule per file, the file dispatcher to walk it stage by stage. The
//! services catalog is read through a cached view refreshed on an interval,
//! so schedule building never hits the datastore on the hot path.
//!
//! ## Key Components
//! - [`Scheduler`]: schedule construction
//! - [`ServiceCatalog`]: cached enabled-services view
//! - [`SchedulerError`]: configuration and lookup failures

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod error;
pub mod scheduler;

pub use catalog::ServiceCatalog;
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{Schedule, Scheduler};
