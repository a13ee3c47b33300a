//! Ignored remote folders

use super::{EventFilter, Subject};
use crate::config::FilterConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::storage::PathMatcher;

/// Ignores everything at or below configured remote paths
pub struct IgnoredPathsFilter {
	prefixes: Vec<String>,
	matcher: PathMatcher,
}

impl IgnoredPathsFilter {
	pub fn new(config: &FilterConfig, matcher: PathMatcher) -> Self {
		IgnoredPathsFilter { prefixes: config.ignored_paths.clone(), matcher }
	}

	fn ignored_prefix(&self, path: &str) -> Option<&str> {
		let path = path.trim_end_matches('/');
		self.prefixes
			.iter()
			.find(|prefix| {
				// "/" trims to "" and so covers every absolute path
				let prefix = prefix.trim_end_matches('/');
				path == prefix
					|| (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
			})
			.map(|p| p.as_str())
	}
}

impl EventFilter for IgnoredPathsFilter {
	fn name(&self) -> &str {
		"IgnoredPathsFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		if self.prefixes.is_empty() {
			return Ok(None);
		}
		let path = match Subject::of(event).and_then(|s| s.remote_path(&self.matcher)) {
			Some(path) => path,
			None => return Ok(None),
		};
		Ok(self
			.ignored_prefix(&path)
			.map(|prefix| format!("Remote path '{}' is below ignored path '{}'", path, prefix)))
	}
}


// vim: ts=4
