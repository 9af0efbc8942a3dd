// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared status record for a single job.
//!
//! A [`JobStatus`] is written by exactly one job body (through its
//! [`JobHandle`](crate::JobHandle)) and read by any number of pollers. Reads
//! go through [`JobStatus::snapshot`], which copies the record under the lock
//! so callers never observe a half-applied update.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::error::{BoxError, JobError, JobPanic};
use crate::handle::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
	Running,
	Complete,
	Error,
}

impl JobState {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobState::Complete | JobState::Error)
	}
}

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			JobState::Running => write!(f, "running"),
			JobState::Complete => write!(f, "complete"),
			JobState::Error => write!(f, "error"),
		}
	}
}

/// The failure that terminated a job body.
///
/// Keeps the original error so pollers can inspect it with
/// [`JobFailure::downcast_ref`]. Serializes as its message.
#[derive(Debug, Clone)]
pub struct JobFailure {
	message: String,
	source: Arc<dyn Error + Send + Sync + 'static>,
}

impl JobFailure {
	pub fn new<E>(error: E) -> Self
	where
		E: Error + Send + Sync + 'static,
	{
		Self {
			message: error.to_string(),
			source: Arc::new(error),
		}
	}

	pub fn from_boxed(error: BoxError) -> Self {
		Self {
			message: error.to_string(),
			source: Arc::from(error),
		}
	}

	/// Unwraps the body's own error out of a [`JobError`] where there is one.
	pub(crate) fn from_job_error(error: JobError) -> Self {
		match error {
			JobError::Execution { source, .. } => Self::from_boxed(source),
			JobError::Panicked { message, .. } => Self::new(JobPanic(message)),
			other => Self::new(other),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
		self.source.as_ref()
	}

	pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
		self.source.downcast_ref::<E>()
	}
}

impl fmt::Display for JobFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message)
	}
}

impl Serialize for JobFailure {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.message)
	}
}

/// Point-in-time copy of a [`JobStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusSnapshot {
	pub job_id: JobId,
	pub state: JobState,
	pub current: u64,
	pub total: u64,
	pub message: Option<String>,
	pub result: Option<serde_json::Value>,
	pub error: Option<JobFailure>,
	pub started_at: DateTime<Utc>,
	pub first_result_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub duration_ms: Option<i64>,
}

impl JobStatusSnapshot {
	pub fn is_terminal(&self) -> bool {
		self.state.is_terminal()
	}
}

#[derive(Debug)]
struct StatusInner {
	job_id: JobId,
	state: JobState,
	current: u64,
	total: u64,
	message: Option<String>,
	result: Option<serde_json::Value>,
	error: Option<JobFailure>,
	started_at: DateTime<Utc>,
	first_result_at: Option<DateTime<Utc>>,
	completed_at: Option<DateTime<Utc>>,
}

impl StatusInner {
	fn mark_first_result(&mut self) {
		if self.first_result_at.is_none() {
			self.first_result_at = Some(Utc::now());
		}
	}

	fn finish(&mut self, state: JobState) {
		self.state = state;
		self.completed_at = Some(Utc::now());
		self.mark_first_result();
	}
}

/// Mutable status of one job, shared between its body and pollers.
#[derive(Debug, Clone)]
pub struct JobStatus {
	inner: Arc<RwLock<StatusInner>>,
}

impl JobStatus {
	pub(crate) fn new(job_id: JobId) -> Self {
		Self {
			inner: Arc::new(RwLock::new(StatusInner {
				job_id,
				state: JobState::Running,
				current: 0,
				total: 0,
				message: None,
				result: None,
				error: None,
				started_at: Utc::now(),
				first_result_at: None,
				completed_at: None,
			})),
		}
	}

	pub fn job_id(&self) -> JobId {
		self.inner.read().job_id
	}

	pub fn state(&self) -> JobState {
		self.inner.read().state
	}

	pub fn completed_at(&self) -> Option<DateTime<Utc>> {
		self.inner.read().completed_at
	}

	pub fn first_result_at(&self) -> Option<DateTime<Utc>> {
		self.inner.read().first_result_at
	}

	pub fn snapshot(&self) -> JobStatusSnapshot {
		let inner = self.inner.read();
		JobStatusSnapshot {
			job_id: inner.job_id,
			state: inner.state,
			current: inner.current,
			total: inner.total,
			message: inner.message.clone(),
			result: inner.result.clone(),
			error: inner.error.clone(),
			started_at: inner.started_at,
			first_result_at: inner.first_result_at,
			completed_at: inner.completed_at,
			duration_ms: inner
				.completed_at
				.map(|done| (done - inner.started_at).num_milliseconds()),
		}
	}

	pub(crate) fn set_progress(&self, current: u64, total: u64) -> bool {
		self.update("set_progress", |inner| {
			inner.total = total;
			inner.current = current.min(total);
			inner.mark_first_result();
		})
	}

	pub(crate) fn set_progress_with_message(
		&self,
		message: String,
		current: u64,
		total: u64,
	) -> bool {
		self.update("set_progress_with_message", |inner| {
			inner.message = Some(message);
			inner.total = total;
			inner.current = current.min(total);
			inner.mark_first_result();
		})
	}

	pub(crate) fn set_message(&self, message: String) -> bool {
		self.update("set_message", |inner| {
			inner.message = Some(message);
		})
	}

	pub(crate) fn increment_current(&self, by: u64) -> bool {
		self.update("increment_current", |inner| {
			inner.current = inner.current.saturating_add(by).min(inner.total);
			inner.mark_first_result();
		})
	}

	pub(crate) fn complete(&self, result: serde_json::Value) -> bool {
		self.update("complete", |inner| {
			inner.result = Some(result);
			inner.finish(JobState::Complete);
		})
	}

	pub(crate) fn fail(&self, failure: JobFailure) -> bool {
		self.update("fail", |inner| {
			inner.error = Some(failure);
			inner.finish(JobState::Error);
		})
	}

	/// Applies `op` unless the job already reached a terminal state.
	fn update(&self, op: &'static str, apply: impl FnOnce(&mut StatusInner)) -> bool {
		let mut inner = self.inner.write();
		if inner.state.is_terminal() {
			debug!(
				job_id = %inner.job_id,
				op,
				state = %inner.state,
				"Ignoring update to finished job"
			);
			return false;
		}
		apply(&mut inner);
		true
	}
}
