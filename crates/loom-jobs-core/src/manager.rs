// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded-wait job execution.
//!
//! [`JobManager::start_job`] spawns the job body on its own task and waits for
//! it up to a deadline. Which side wins is settled exactly once through a
//! shared delivery slot holding the caller's result channel:
//!
//! - the worker takes the slot when it finishes and sends its result to the
//!   waiting caller;
//! - the caller takes the slot when its deadline passes, registers the job
//!   and returns [`JobOutcome::WentAsync`]. The worker then finds the slot
//!   empty and records its result in the shared status instead.
//!
//! The body is never cancelled by the manager.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::config::JobsConfig;
use crate::error::{JobError, Result};
use crate::handle::{JobHandle, JobId};
use crate::registry::JobRegistry;
use crate::status::{JobFailure, JobStatus, JobStatusSnapshot};

/// What the caller of [`JobManager::start_job`] gets back.
#[derive(Debug)]
pub enum JobOutcome<T> {
	/// The body finished before the deadline.
	Value(T),
	/// The deadline passed; poll [`JobManager::get_status`] with this id.
	WentAsync(JobId),
	/// The body failed or panicked before the deadline.
	Failed(JobError),
}

impl<T> JobOutcome<T> {
	pub fn is_went_async(&self) -> bool {
		matches!(self, JobOutcome::WentAsync(_))
	}

	/// The id to poll, if the job went async.
	pub fn job_id(&self) -> Option<JobId> {
		match self {
			JobOutcome::WentAsync(id) => Some(*id),
			_ => None,
		}
	}

	pub fn value(self) -> Option<T> {
		match self {
			JobOutcome::Value(value) => Some(value),
			_ => None,
		}
	}

	/// Collapses the outcome into a `Result`, reporting a detached job as
	/// [`JobError::WentAsync`].
	pub fn into_result(self) -> Result<T> {
		match self {
			JobOutcome::Value(value) => Ok(value),
			JobOutcome::WentAsync(id) => Err(JobError::WentAsync(id)),
			JobOutcome::Failed(err) => Err(err),
		}
	}
}

type Delivery<T> = Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>;

/// Runs job bodies with a bounded wait and tracks the ones that outlive it.
#[derive(Debug, Clone)]
pub struct JobManager {
	registry: JobRegistry,
	config: JobsConfig,
	limiter: Option<Arc<Semaphore>>,
}

impl JobManager {
	pub fn new() -> Self {
		Self::with_config(JobsConfig::default())
	}

	pub fn with_config(config: JobsConfig) -> Self {
		Self::with_registry(JobRegistry::new(), config)
	}

	pub fn with_registry(registry: JobRegistry, config: JobsConfig) -> Self {
		let limiter = config
			.max_concurrent_jobs
			.map(|permits| Arc::new(Semaphore::new(permits.clamp(1, Semaphore::MAX_PERMITS))));
		Self {
			registry,
			config,
			limiter,
		}
	}

	pub fn registry(&self) -> &JobRegistry {
		&self.registry
	}

	pub fn config(&self) -> &JobsConfig {
		&self.config
	}

	/// Runs `body` and waits up to `timeout` for it.
	///
	/// When the concurrency limit is configured, time spent waiting for a free
	/// slot counts against `timeout`.
	#[instrument(
		skip(self, timeout, body),
		fields(job_id = tracing::field::Empty, timeout_ms = timeout.as_millis() as u64)
	)]
	pub async fn start_job<T, E, F, Fut>(&self, timeout: Duration, body: F) -> JobOutcome<T>
	where
		T: Serialize + Send + 'static,
		E: std::error::Error + Send + Sync + 'static,
		F: FnOnce(JobHandle) -> Fut + Send + 'static,
		Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
	{
		let job_id = JobId::new();
		tracing::Span::current().record("job_id", tracing::field::display(job_id));

		let handle = JobHandle::new(job_id);
		let status = handle.status().clone();
		let (tx, rx) = oneshot::channel();
		let delivery: Delivery<T> = Arc::new(Mutex::new(Some(tx)));

		tokio::spawn(run_worker(
			job_id,
			handle,
			body,
			Arc::clone(&delivery),
			self.limiter.clone(),
		));

		await_delivery(&self.registry, status, timeout, &delivery, rx).await
	}

	pub async fn start_job_with_default_timeout<T, E, F, Fut>(&self, body: F) -> JobOutcome<T>
	where
		T: Serialize + Send + 'static,
		E: std::error::Error + Send + Sync + 'static,
		F: FnOnce(JobHandle) -> Fut + Send + 'static,
		Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
	{
		self.start_job(self.config.default_timeout(), body).await
	}

	/// Current status of a job that went async. `None` for unknown ids.
	pub fn get_status(&self, job_id: &JobId) -> Option<JobStatusSnapshot> {
		self.registry.snapshot(job_id)
	}

	pub fn require_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot> {
		self.get_status(job_id).ok_or(JobError::NotFound(*job_id))
	}

	/// Drops finished jobs older than the configured retention window.
	///
	/// Does nothing when no retention is configured.
	#[instrument(skip(self))]
	pub fn prune_expired(&self) -> usize {
		let Some(retention) = self.config.retention() else {
			return 0;
		};
		let pruned = self.registry.prune_finished(retention);
		if pruned > 0 {
			info!(pruned, remaining = self.registry.len(), "Pruned finished jobs");
		}
		pruned
	}
}

impl Default for JobManager {
	fn default() -> Self {
		Self::new()
	}
}

/// Waits for the worker's result, or claims the delivery slot once `timeout`
/// passes and registers the job.
async fn await_delivery<T>(
	registry: &JobRegistry,
	status: JobStatus,
	timeout: Duration,
	delivery: &Delivery<T>,
	mut rx: oneshot::Receiver<Result<T>>,
) -> JobOutcome<T> {
	let job_id = status.job_id();
	match tokio::time::timeout(timeout, &mut rx).await {
		Ok(Ok(result)) => deliver(job_id, result),
		Ok(Err(_)) => JobOutcome::Failed(JobError::WorkerLost(job_id)),
		Err(_elapsed) => {
			let mut slot = delivery.lock();
			if slot.take().is_some() {
				registry.insert(job_id, status);
				drop(slot);
				info!(job_id = %job_id, "Job exceeded its deadline, continuing in background");
				return JobOutcome::WentAsync(job_id);
			}
			drop(slot);

			// The worker claimed the slot first, so its result is already sent.
			match rx.try_recv() {
				Ok(result) => deliver(job_id, result),
				Err(_) => JobOutcome::Failed(JobError::WorkerLost(job_id)),
			}
		}
	}
}

fn deliver<T>(job_id: JobId, result: Result<T>) -> JobOutcome<T> {
	match result {
		Ok(value) => {
			debug!(job_id = %job_id, "Job finished before its deadline");
			JobOutcome::Value(value)
		}
		Err(err) => {
			debug!(job_id = %job_id, error = %err, "Job failed before its deadline");
			JobOutcome::Failed(err)
		}
	}
}

async fn run_worker<T, E, F, Fut>(
	job_id: JobId,
	handle: JobHandle,
	body: F,
	delivery: Delivery<T>,
	limiter: Option<Arc<Semaphore>>,
) where
	T: Serialize + Send + 'static,
	E: std::error::Error + Send + Sync + 'static,
	F: FnOnce(JobHandle) -> Fut + Send + 'static,
	Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
	let _permit = match limiter {
		Some(limiter) => limiter.acquire_owned().await.ok(),
		None => None,
	};

	let status = handle.status().clone();
	let result = match AssertUnwindSafe(async move { body(handle).await })
		.catch_unwind()
		.await
	{
		Ok(Ok(value)) => Ok(value),
		Ok(Err(err)) => Err(JobError::Execution {
			job_id,
			source: Box::new(err),
		}),
		Err(payload) => Err(JobError::Panicked {
			job_id,
			message: panic_message(payload.as_ref()),
		}),
	};

	let result = {
		let mut slot = delivery.lock();
		match slot.take() {
			Some(tx) => match tx.send(result) {
				Ok(()) => return,
				// The waiting caller was dropped before its deadline.
				Err(result) => result,
			},
			None => result,
		}
	};

	record_background_result(job_id, &status, result);
}

fn record_background_result<T: Serialize>(job_id: JobId, status: &JobStatus, result: Result<T>) {
	match result.and_then(|value| serde_json::to_value(value).map_err(JobError::from)) {
		Ok(value) => {
			status.complete(value);
			info!(
				job_id = %job_id,
				duration_ms = status.snapshot().duration_ms,
				"Background job completed"
			);
		}
		Err(err) => {
			warn!(job_id = %job_id, error = %err, "Background job failed");
			status.fail(JobFailure::from_job_error(err));
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"unknown panic payload".to_string()
	}
}
