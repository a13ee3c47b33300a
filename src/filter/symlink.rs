//! Symbolic link filter

use super::{EventFilter, Subject};
use crate::config::FilterConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::local::LocalFileSystem;

/// Ignores local symbolic links unless links are followed
pub struct SymlinkFilter {
	follow: bool,
	fs: LocalFileSystem,
}

impl SymlinkFilter {
	pub fn new(config: &FilterConfig, fs: LocalFileSystem) -> Self {
		SymlinkFilter { follow: config.follow_symlinks, fs }
	}
}

impl EventFilter for SymlinkFilter {
	fn name(&self) -> &str {
		"SymlinkFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		if self.follow {
			return Ok(None);
		}
		let path = match Subject::of(event).and_then(|s| s.local_path) {
			Some(path) => path,
			None => return Ok(None),
		};
		// A path that vanished or cannot be read is not a link we know of
		match self.fs.info(path) {
			Ok(Some(info)) if info.is_symlink => {
				Ok(Some(format!("'{}' is a symbolic link", path.display())))
			}
			_ => Ok(None),
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use crate::events::{FsEvent, FsEventType};
	use tempfile::TempDir;

	#[test]
	fn test_symlinks_ignored_unless_followed() {
		let dir = TempDir::new().unwrap();
		let target = dir.path().join("target");
		let link = dir.path().join("link");
		std::fs::write(&target, b"x").unwrap();
		std::os::unix::fs::symlink(&target, &link).unwrap();

		let link_event = SyncEvent::Fs(FsEvent::new(FsEventType::Created, &link, Some(false)));
		let file_event = SyncEvent::Fs(FsEvent::new(FsEventType::Created, &target, Some(false)));
		let missing = SyncEvent::Fs(FsEvent::new(FsEventType::Created, dir.path().join("gone"), None));

		let filter = SymlinkFilter::new(&FilterConfig::default(), LocalFileSystem::new());
		assert!(filter.check(&link_event).unwrap().is_some());
		assert!(filter.check(&file_event).unwrap().is_none());
		assert!(filter.check(&missing).unwrap().is_none());

		let config = FilterConfig { follow_symlinks: true, ..FilterConfig::default() };
		let filter = SymlinkFilter::new(&config, LocalFileSystem::new());
		assert!(filter.check(&link_event).unwrap().is_none());
	}
}

// vim: ts=4
