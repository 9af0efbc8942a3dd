// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::{JobStatus, JobStatusSnapshot};

/// Opaque identifier of a started job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// Capability handed to a job body for reporting progress into its own status.
///
/// The body never learns whether its caller is still waiting; it only reports.
/// All reporting methods clamp out-of-range input and never fail. Updates made
/// after the job reached a terminal state are ignored.
#[derive(Debug, Clone)]
pub struct JobHandle {
	id: JobId,
	status: JobStatus,
}

impl JobHandle {
	pub(crate) fn new(id: JobId) -> Self {
		Self {
			id,
			status: JobStatus::new(id),
		}
	}

	pub fn id(&self) -> JobId {
		self.id
	}

	pub(crate) fn status(&self) -> &JobStatus {
		&self.status
	}

	pub fn snapshot(&self) -> JobStatusSnapshot {
		self.status.snapshot()
	}

	/// Replaces both counters. `current` is clamped to `total`.
	pub fn set_progress(&self, current: u64, total: u64) {
		self.status.set_progress(current, total);
	}

	pub fn set_progress_with_message(&self, message: impl Into<String>, current: u64, total: u64) {
		self.status
			.set_progress_with_message(message.into(), current, total);
	}

	pub fn set_message(&self, message: impl Into<String>) {
		self.status.set_message(message.into());
	}

	pub fn increment_current(&self) {
		self.increment_current_by(1);
	}

	/// Adds `n` to the current counter, never going past `total`.
	pub fn increment_current_by(&self, n: u64) {
		self.status.increment_current(n);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_job_id_roundtrips_through_string() {
		let id = JobId::new();
		let parsed: JobId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn test_job_id_rejects_garbage() {
		assert!("not-a-job".parse::<JobId>().is_err());
	}

	#[test]
	fn test_job_ids_are_unique() {
		assert_ne!(JobId::new(), JobId::new());
	}

	#[test]
	fn test_handle_reports_into_its_status() {
		let handle = JobHandle::new(JobId::new());
		handle.set_progress_with_message("loading", 3, 2);
		handle.increment_current();

		let snapshot = handle.snapshot();
		assert_eq!(snapshot.job_id, handle.id());
		assert_eq!(snapshot.message.as_deref(), Some("loading"));
		assert_eq!(snapshot.current, 2);
		assert_eq!(snapshot.total, 2);
	}

	#[test]
	fn test_clones_share_status() {
		let handle = JobHandle::new(JobId::new());
		let clone = handle.clone();
		clone.set_progress(4, 8);
		assert_eq!(handle.snapshot().current, 4);
	}

	#[derive(Debug, Clone)]
	enum Op {
		SetProgress(u64, u64),
		SetProgressWithMessage(u64, u64),
		Increment,
		IncrementBy(u64),
		SetMessage,
	}

	fn op_strategy() -> impl Strategy<Value = Op> {
		prop_oneof![
			(0u64..100, 0u64..100).prop_map(|(c, t)| Op::SetProgress(c, t)),
			(0u64..100, 0u64..100).prop_map(|(c, t)| Op::SetProgressWithMessage(c, t)),
			Just(Op::Increment),
			any::<u64>().prop_map(Op::IncrementBy),
			Just(Op::SetMessage),
		]
	}

	proptest! {
		/// No sequence of reporting calls can push current past total.
		#[test]
		fn current_never_exceeds_total(ops in prop::collection::vec(op_strategy(), 0..64)) {
			let handle = JobHandle::new(JobId::new());
			for op in ops {
				match op {
					Op::SetProgress(c, t) => handle.set_progress(c, t),
					Op::SetProgressWithMessage(c, t) => {
						handle.set_progress_with_message("step", c, t)
					}
					Op::Increment => handle.increment_current(),
					Op::IncrementBy(n) => handle.increment_current_by(n),
					Op::SetMessage => handle.set_message("tick"),
				}
				let snapshot = handle.snapshot();
				prop_assert!(snapshot.current <= snapshot.total);
			}
		}

		/// set_progress is a reset: prior counters never carry over.
		#[test]
		fn set_progress_resets_counters(
			prior in prop::collection::vec(op_strategy(), 0..16),
			current in 0u64..1000,
			total in 0u64..1000,
		) {
			let handle = JobHandle::new(JobId::new());
			for op in prior {
				if let Op::SetProgress(c, t) = op {
					handle.set_progress(c, t);
				} else {
					handle.increment_current();
				}
			}
			handle.set_progress(current, total);
			let snapshot = handle.snapshot();
			prop_assert_eq!(snapshot.total, total);
			prop_assert_eq!(snapshot.current, current.min(total));
		}
	}
}
