// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use crate::handle::JobId;

/// Boxed error produced by a job body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	#[error("Job {job_id} failed: {source}")]
	Execution {
		job_id: JobId,
		#[source]
		source: BoxError,
	},

	#[error("Job {job_id} panicked: {message}")]
	Panicked { job_id: JobId, message: String },

	#[error("Job {0} exited without reporting a result")]
	WorkerLost(JobId),

	#[error("Job {0} is still running in the background")]
	WentAsync(JobId),

	#[error("Job not found: {0}")]
	NotFound(JobId),

	#[error("Failed to serialize job result: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Configuration error: {0}")]
	Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Failure recorded when a job body panics after its caller stopped waiting.
#[derive(Debug, Clone, thiserror::Error)]
#[error("job panicked: {0}")]
pub struct JobPanic(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid value for {key}: {message}")]
	InvalidValue { key: String, message: String },

	#[error("Failed to parse TOML config at {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Failed to read config file {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Validation error: {0}")]
	Validation(String),
}
