//! Configuration for a synchronized folder
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (TOML or JSON5, picked by extension)
//!
//! Filters never see the mutable `Config`; they are built from a
//! [`FilterConfig`] snapshot. Changing the ignore lists means building a
//! new filter chain.

use crate::error::SyncError;
use crate::strategies::ConflictResolution;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Smallest accepted transfer chunk
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Largest accepted transfer chunk
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Configuration of one synchronized local folder / remote folder pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// ROOTS & STATE
	// ========================================================================
	/// Local folder being synchronized
	pub local_root: PathBuf,

	/// Remote folder path in the repository
	pub remote_root: String,

	/// Metadata database file; in-memory storage when unset
	pub database_path: Option<PathBuf>,

	// ========================================================================
	// FILTERS
	// ========================================================================
	/// Glob patterns for file names that are never synchronized
	pub ignored_file_names: Vec<String>,

	/// Glob patterns for folder names that are never synchronized
	pub ignored_folder_names: Vec<String>,

	/// Remote path prefixes that are never synchronized
	pub ignored_paths: Vec<String>,

	/// Synchronize symbolic link targets instead of ignoring links
	pub follow_symlinks: bool,

	// ========================================================================
	// CONFLICTS & RETRIES
	// ========================================================================
	/// Policy for concurrent content changes
	pub conflict_resolution: ConflictResolution,

	/// Text placed in conflict copy names
	pub conflict_suffix: String,

	/// Requeue limit per event; unlimited when unset
	pub max_retries: Option<u32>,

	// ========================================================================
	// TRANSFERS & POLLING
	// ========================================================================
	/// Transfer chunk size in bytes
	pub chunk_size: usize,

	/// Transfer bandwidth limit in bytes per second
	pub bandwidth_limit: Option<u64>,

	/// Seconds between incremental change log polls
	pub poll_interval_secs: u64,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			local_root: PathBuf::new(),
			remote_root: "/".to_string(),
			database_path: None,

			ignored_file_names: vec![],
			ignored_folder_names: vec![],
			ignored_paths: vec![],
			follow_symlinks: false,

			conflict_resolution: ConflictResolution::KeepBoth,
			conflict_suffix: "conflict copy".to_string(),
			max_retries: None,

			chunk_size: 1024 * 1024,
			bandwidth_limit: None,
			poll_interval_secs: 5,
		}
	}
}

impl Config {
	/// Configuration for the given roots with everything else at defaults
	pub fn new(local_root: impl Into<PathBuf>, remote_root: impl Into<String>) -> Self {
		Config { local_root: local_root.into(), remote_root: remote_root.into(), ..Config::default() }
	}

	/// Load a configuration file, TOML or JSON5 depending on the extension
	pub fn load(path: &Path) -> Result<Self, SyncError> {
		let text = std::fs::read_to_string(path)?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
		let config: Config = match ext.as_str() {
			"toml" => toml::from_str(&text).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?,
			"json" | "json5" => json5::from_str(&text).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			})?,
			_ => {
				return Err(SyncError::InvalidConfig {
					message: format!("Unsupported config file type: {}", path.display()),
				})
			}
		};
		config.validate()?;
		Ok(config)
	}

	/// Check the configuration for values the engine cannot work with
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.local_root.as_os_str().is_empty() {
			return Err(invalid("localRoot is not set"));
		}
		if !self.remote_root.starts_with('/') {
			return Err(invalid(format!("remoteRoot must be absolute: {}", self.remote_root)));
		}
		if self.chunk_size < MIN_CHUNK_SIZE || self.chunk_size > MAX_CHUNK_SIZE {
			return Err(invalid(format!(
				"chunkSize must be between {} and {} bytes",
				MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
			)));
		}
		if self.max_retries == Some(0) {
			return Err(invalid("maxRetries must be at least 1"));
		}
		if self.bandwidth_limit == Some(0) {
			return Err(invalid("bandwidthLimit must be positive"));
		}
		if self.poll_interval_secs == 0 {
			return Err(invalid("pollIntervalSecs must be positive"));
		}
		if self.conflict_suffix.trim().is_empty() {
			return Err(invalid("conflictSuffix must not be empty"));
		}
		for pattern in self.ignored_file_names.iter().chain(&self.ignored_folder_names) {
			Glob::new(pattern).map_err(|e| invalid(format!("Bad pattern '{}': {}", pattern, e)))?;
		}
		Ok(())
	}

	/// Immutable snapshot of everything the filter chain needs
	pub fn filter_config(&self) -> FilterConfig {
		FilterConfig {
			ignored_file_names: self.ignored_file_names.clone(),
			ignored_folder_names: self.ignored_folder_names.clone(),
			ignored_paths: self.ignored_paths.iter().map(|p| normalize_remote_prefix(p)).collect(),
			follow_symlinks: self.follow_symlinks,
		}
	}
}

fn invalid(message: impl Into<String>) -> SyncError {
	SyncError::InvalidConfig { message: message.into() }
}

fn normalize_remote_prefix(path: &str) -> String {
	let trimmed = path.trim_end_matches('/');
	if trimmed.starts_with('/') {
		trimmed.to_string()
	} else {
		format!("/{}", trimmed)
	}
}

// ============================================================================
// FILTER SNAPSHOT
// ============================================================================

/// Read-only filter settings, taken from [`Config`] when a filter chain is built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
	pub ignored_file_names: Vec<String>,
	pub ignored_folder_names: Vec<String>,
	/// Normalized remote path prefixes, no trailing slash
	pub ignored_paths: Vec<String>,
	pub follow_symlinks: bool,
}


// vim: ts=4
