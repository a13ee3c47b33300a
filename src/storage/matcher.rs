//! Translation between local paths and remote paths

use std::path::{Component, Path, PathBuf};

/// Maps the local sync root onto the remote sync root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatcher {
	local_root: PathBuf,
	remote_root: String,
}

impl PathMatcher {
	/// Create a matcher
	///
	/// The remote root is normalized to start with `/` and to carry no
	/// trailing separator (except for the repository root `/` itself).
	pub fn new(local_root: impl Into<PathBuf>, remote_root: &str) -> Self {
		let trimmed = remote_root.trim_end_matches('/');
		let remote_root = if trimmed.is_empty() {
			"/".to_string()
		} else if trimmed.starts_with('/') {
			trimmed.to_string()
		} else {
			format!("/{}", trimmed)
		};
		PathMatcher { local_root: local_root.into(), remote_root }
	}

	pub fn local_root(&self) -> &Path {
		&self.local_root
	}

	pub fn remote_root(&self) -> &str {
		&self.remote_root
	}

	/// Path relative to the local root, `None` when outside of it
	pub fn relative_local_path(&self, local: &Path) -> Option<PathBuf> {
		let rel = local.strip_prefix(&self.local_root).ok()?;
		if rel.components().any(|c| matches!(c, Component::ParentDir)) {
			return None;
		}
		Some(rel.to_path_buf())
	}

	/// Remote path segments below the remote root, `None` when outside of it
	pub fn relative_remote_segments<'a>(&self, remote_path: &'a str) -> Option<Vec<&'a str>> {
		let rest = if self.remote_root == "/" {
			remote_path.strip_prefix('/')?
		} else {
			let rest = remote_path.strip_prefix(self.remote_root.as_str())?;
			if rest.is_empty() {
				rest
			} else {
				rest.strip_prefix('/')?
			}
		};
		Some(rest.split('/').filter(|s| !s.is_empty()).collect())
	}

	pub fn can_create_local_path(&self, remote_path: &str) -> bool {
		self.relative_remote_segments(remote_path).is_some()
	}

	pub fn can_create_remote_path(&self, local: &Path) -> bool {
		self.relative_local_path(local).is_some()
	}

	pub fn create_local_path(&self, remote_path: &str) -> Option<PathBuf> {
		let segments = self.relative_remote_segments(remote_path)?;
		let mut path = self.local_root.clone();
		for segment in segments {
			path.push(segment);
		}
		Some(path)
	}

	pub fn create_remote_path(&self, local: &Path) -> Option<String> {
		let rel = self.relative_local_path(local)?;
		let mut remote = self.remote_root.clone();
		for component in rel.components() {
			if let Component::Normal(name) = component {
				if !remote.ends_with('/') {
					remote.push('/');
				}
				remote.push_str(name.to_str()?);
			}
		}
		Some(remote)
	}
}


// vim: ts=4
