// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded-wait job execution for Loom.
//!
//! [`JobManager::start_job`] runs a job body on its own task and waits for it
//! up to a deadline. Fast jobs hand their value straight back to the caller;
//! slow jobs keep running in the background and are tracked in a
//! [`JobRegistry`] so anyone holding the [`JobId`] can poll their progress,
//! result or failure through [`JobManager::get_status`].
//!
//! ```rust,ignore
//! let manager = JobManager::new();
//! match manager
//! 	.start_job(Duration::from_millis(200), |handle| async move {
//! 		handle.set_progress(0, 10);
//! 		rebuild_index(&handle).await
//! 	})
//! 	.await
//! {
//! 	JobOutcome::Value(stats) => render(stats),
//! 	JobOutcome::WentAsync(job_id) => reply_accepted(job_id),
//! 	JobOutcome::Failed(err) => return Err(err.into()),
//! }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod status;

pub use config::{load_config, JobsConfig, JobsConfigLayer};
pub use error::{BoxError, ConfigError, JobError, JobPanic, Result};
pub use handle::{JobHandle, JobId};
pub use logging::{init_tracing, LoggingConfig, LoggingConfigLayer};
pub use manager::{JobManager, JobOutcome};
pub use registry::{JobRegistry, RegistrySummary};
pub use status::{JobFailure, JobState, JobStatus, JobStatusSnapshot};
