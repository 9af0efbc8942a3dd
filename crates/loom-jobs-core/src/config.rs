// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Jobs configuration: layered defaults, TOML file and environment.
//!
//! Layers merge in precedence order (defaults < file < environment) and are
//! then finalized into a [`JobsConfig`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::logging::{LoggingConfig, LoggingConfigLayer};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_DEFAULT_TIMEOUT_MS: &str = "LOOM_JOBS_DEFAULT_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT: &str = "LOOM_JOBS_MAX_CONCURRENT";
pub const ENV_RETENTION_SECS: &str = "LOOM_JOBS_RETENTION_SECS";
pub const ENV_LOG_LEVEL: &str = "LOOM_JOBS_LOG_LEVEL";
pub const ENV_LOG_JSON: &str = "LOOM_JOBS_LOG_JSON";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub default_timeout_ms: Option<u64>,
	pub max_concurrent_jobs: Option<usize>,
	pub retention_secs: Option<u64>,
	pub logging: Option<LoggingConfigLayer>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_timeout_ms.is_some() {
			self.default_timeout_ms = other.default_timeout_ms;
		}
		if other.max_concurrent_jobs.is_some() {
			self.max_concurrent_jobs = other.max_concurrent_jobs;
		}
		if other.retention_secs.is_some() {
			self.retention_secs = other.retention_secs;
		}
		if let Some(overlay) = other.logging {
			self.logging.get_or_insert_with(Default::default).merge(overlay);
		}
	}

	pub fn finalize(self) -> JobsConfig {
		JobsConfig {
			default_timeout_ms: self.default_timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
			max_concurrent_jobs: self.max_concurrent_jobs,
			retention_secs: self.retention_secs,
			logging: self.logging.unwrap_or_default().finalize(),
		}
	}

	pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
		toml::from_str(contents).map_err(|source| ConfigError::TomlParse {
			path: PathBuf::new(),
			source,
		})
	}

	/// Reads a layer from `path`. A missing file yields an empty layer.
	pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
		if !path.exists() {
			trace!(path = %path.display(), "config file not found, skipping");
			return Ok(Self::default());
		}

		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(path = %path.display(), "loading jobs config file");
		toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_vars(|key| std::env::var(key).ok())
	}

	/// Builds a layer from `LOOM_JOBS_*` variables resolved through `lookup`.
	pub fn from_env_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let level = lookup(ENV_LOG_LEVEL);
		let json: Option<bool> = parse_var(&lookup, ENV_LOG_JSON)?;
		let logging =
			(level.is_some() || json.is_some()).then_some(LoggingConfigLayer { level, json });

		Ok(Self {
			default_timeout_ms: parse_var(&lookup, ENV_DEFAULT_TIMEOUT_MS)?,
			max_concurrent_jobs: parse_var(&lookup, ENV_MAX_CONCURRENT)?,
			retention_secs: parse_var(&lookup, ENV_RETENTION_SECS)?,
			logging,
		})
	}
}

fn parse_var<T>(
	lookup: &impl Fn(&str) -> Option<String>,
	key: &str,
) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	let Some(raw) = lookup(key) else {
		return Ok(None);
	};
	raw.trim()
		.parse()
		.map(Some)
		.map_err(|e: T::Err| ConfigError::InvalidValue {
			key: key.to_string(),
			message: e.to_string(),
		})
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
	pub default_timeout_ms: u64,
	pub max_concurrent_jobs: Option<usize>,
	pub retention_secs: Option<u64>,
	pub logging: LoggingConfig,
}

impl JobsConfig {
	pub fn default_timeout(&self) -> Duration {
		Duration::from_millis(self.default_timeout_ms)
	}

	/// How long finished jobs stay registered. `None` keeps them forever.
	pub fn retention(&self) -> Option<Duration> {
		self.retention_secs.map(Duration::from_secs)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_concurrent_jobs == Some(0) {
			return Err(ConfigError::Validation(
				"max_concurrent_jobs must be at least 1".to_string(),
			));
		}
		if let Some(permits) = self.max_concurrent_jobs {
			if permits > Semaphore::MAX_PERMITS {
				return Err(ConfigError::Validation(format!(
					"max_concurrent_jobs must be at most {}",
					Semaphore::MAX_PERMITS
				)));
			}
		}
		Ok(())
	}
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			default_timeout_ms: DEFAULT_TIMEOUT_MS,
			max_concurrent_jobs: None,
			retention_secs: None,
			logging: LoggingConfig::default(),
		}
	}
}

/// Loads defaults, then `path` (if given), then the environment.
pub fn load_config(path: Option<&Path>) -> Result<JobsConfig, ConfigError> {
	let mut layer = JobsConfigLayer::default();
	if let Some(path) = path {
		layer.merge(JobsConfigLayer::from_toml_file(path)?);
	}
	layer.merge(JobsConfigLayer::from_env()?);

	let config = layer.finalize();
	config.validate()?;
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;

	fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn test_default_values() {
		let config = JobsConfig::default();
		assert_eq!(config.default_timeout(), Duration::from_secs(30));
		assert!(config.max_concurrent_jobs.is_none());
		assert!(config.retention().is_none());
		assert_eq!(config.logging, LoggingConfig::default());
	}

	#[test]
	fn test_layer_finalize_defaults() {
		assert_eq!(JobsConfigLayer::default().finalize(), JobsConfig::default());
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = JobsConfigLayer {
			default_timeout_ms: Some(1_000),
			retention_secs: Some(600),
			logging: Some(LoggingConfigLayer {
				level: Some("info".to_string()),
				json: Some(true),
			}),
			..Default::default()
		};
		let overlay = JobsConfigLayer {
			default_timeout_ms: Some(250),
			max_concurrent_jobs: Some(4),
			logging: Some(LoggingConfigLayer {
				level: Some("debug".to_string()),
				json: None,
			}),
			..Default::default()
		};
		base.merge(overlay);

		let config = base.finalize();
		assert_eq!(config.default_timeout_ms, 250);
		assert_eq!(config.max_concurrent_jobs, Some(4));
		assert_eq!(config.retention(), Some(Duration::from_secs(600)));
		assert_eq!(config.logging.level, "debug");
		assert!(config.logging.json);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer = JobsConfigLayer::from_toml_str(
			r#"
default_timeout_ms = 500

[logging]
level = "warn"
"#,
		)
		.unwrap();
		assert_eq!(layer.default_timeout_ms, Some(500));
		assert!(layer.max_concurrent_jobs.is_none());
		assert_eq!(
			layer.logging.and_then(|l| l.level).as_deref(),
			Some("warn")
		);
	}

	#[test]
	fn test_deserialize_layer_rejects_bad_types() {
		let err = JobsConfigLayer::from_toml_str("default_timeout_ms = \"soon\"").unwrap_err();
		match err {
			ConfigError::TomlParse { path, .. } => assert!(path.as_os_str().is_empty()),
			e => panic!("Expected TomlParse error, got: {:?}", e),
		}
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = JobsConfig {
			default_timeout_ms: 1_500,
			max_concurrent_jobs: Some(8),
			retention_secs: Some(3_600),
			logging: LoggingConfig {
				level: "debug".to_string(),
				json: true,
			},
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: JobsConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}

	#[test]
	fn test_missing_file_is_empty_layer() {
		let dir = tempfile::tempdir().unwrap();
		let layer = JobsConfigLayer::from_toml_file(&dir.path().join("jobs.toml")).unwrap();
		assert_eq!(layer, JobsConfigLayer::default());
	}

	#[test]
	fn test_file_layer() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "max_concurrent_jobs = 2\nretention_secs = 60").unwrap();

		let layer = JobsConfigLayer::from_toml_file(file.path()).unwrap();
		assert_eq!(layer.max_concurrent_jobs, Some(2));
		assert_eq!(layer.retention_secs, Some(60));
	}

	#[test]
	fn test_file_parse_error_names_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "max_concurrent_jobs = [").unwrap();

		match JobsConfigLayer::from_toml_file(file.path()).unwrap_err() {
			ConfigError::TomlParse { path, .. } => assert_eq!(path, file.path()),
			e => panic!("Expected TomlParse error, got: {:?}", e),
		}
	}

	#[test]
	fn test_env_layer() {
		let layer = JobsConfigLayer::from_env_vars(env(&[
			(ENV_DEFAULT_TIMEOUT_MS, "750"),
			(ENV_MAX_CONCURRENT, " 3 "),
			(ENV_LOG_JSON, "true"),
		]))
		.unwrap();
		assert_eq!(layer.default_timeout_ms, Some(750));
		assert_eq!(layer.max_concurrent_jobs, Some(3));
		assert!(layer.retention_secs.is_none());
		let logging = layer.logging.unwrap();
		assert_eq!(logging.json, Some(true));
		assert!(logging.level.is_none());
	}

	#[test]
	fn test_env_layer_empty() {
		let layer = JobsConfigLayer::from_env_vars(env(&[])).unwrap();
		assert_eq!(layer, JobsConfigLayer::default());
	}

	#[test]
	fn test_env_layer_invalid_value() {
		let err =
			JobsConfigLayer::from_env_vars(env(&[(ENV_RETENTION_SECS, "a day")])).unwrap_err();
		match err {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, ENV_RETENTION_SECS),
			e => panic!("Expected InvalidValue error, got: {:?}", e),
		}
	}

	#[test]
	fn test_validate_rejects_zero_concurrency() {
		let config = JobsConfig {
			max_concurrent_jobs: Some(0),
			..Default::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
	}

	#[test]
	fn test_validate_rejects_concurrency_above_semaphore_limit() {
		let layer = JobsConfigLayer::from_env_vars(env(&[(
			ENV_MAX_CONCURRENT,
			usize::MAX.to_string().as_str(),
		)]))
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.max_concurrent_jobs, Some(usize::MAX));
		assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

		let at_limit = JobsConfig {
			max_concurrent_jobs: Some(Semaphore::MAX_PERMITS),
			..Default::default()
		};
		assert!(at_limit.validate().is_ok());
	}
}
