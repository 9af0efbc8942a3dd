// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lookup table for jobs that outlived their caller's deadline.
//!
//! Entries stay until removed explicitly through [`JobRegistry::remove`] or
//! [`JobRegistry::prune_finished`]; nothing is evicted automatically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::handle::JobId;
use crate::status::{JobState, JobStatus, JobStatusSnapshot};

/// Count of registered jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
	pub running: usize,
	pub complete: usize,
	pub error: usize,
}

impl RegistrySummary {
	pub fn total(&self) -> usize {
		self.running + self.complete + self.error
	}
}

/// Concurrency-safe map from [`JobId`] to the job's shared status.
///
/// Cloning is cheap and yields a handle onto the same map.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
	entries: Arc<RwLock<HashMap<JobId, JobStatus>>>,
}

impl JobRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, id: JobId, status: JobStatus) {
		self.entries.write().insert(id, status);
	}

	pub fn get(&self, id: &JobId) -> Option<JobStatus> {
		self.entries.read().get(id).cloned()
	}

	pub fn snapshot(&self, id: &JobId) -> Option<JobStatusSnapshot> {
		let status = self.get(id)?;
		Some(status.snapshot())
	}

	pub fn remove(&self, id: &JobId) -> Option<JobStatus> {
		self.entries.write().remove(id)
	}

	pub fn contains(&self, id: &JobId) -> bool {
		self.entries.read().contains_key(id)
	}

	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	pub fn ids(&self) -> Vec<JobId> {
		self.entries.read().keys().copied().collect()
	}

	/// Removes finished jobs whose completion is at least `older_than` ago.
	///
	/// Running jobs are never removed. Returns the number of entries dropped.
	pub fn prune_finished(&self, older_than: Duration) -> usize {
		let Ok(window) = chrono::Duration::from_std(older_than) else {
			return 0;
		};
		let now = Utc::now();

		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|_, status| match status.completed_at() {
			Some(done) => now - done < window,
			None => true,
		});
		before - entries.len()
	}

	pub fn summary(&self) -> RegistrySummary {
		let entries = self.entries.read();
		let mut summary = RegistrySummary::default();
		for status in entries.values() {
			match status.state() {
				JobState::Running => summary.running += 1,
				JobState::Complete => summary.complete += 1,
				JobState::Error => summary.error += 1,
			}
		}
		summary
	}
}
