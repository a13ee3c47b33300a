//! Local sync root availability

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::callbacks::SyncListener;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::manager::{priority, SyncEventHandler};
use crate::queue::EventSink;

/// Absorbs local and object events and sync requests while the local root is missing
///
/// The listener hears about every availability transition exactly once.
/// When the root comes back a full sync is requested.
pub struct RootFolderFilter {
	root: PathBuf,
	fs: LocalFileSystem,
	available: Mutex<bool>,
	queue: Arc<dyn EventSink>,
	listener: Arc<dyn SyncListener>,
}

impl RootFolderFilter {
	pub fn new(
		root: &Path,
		fs: LocalFileSystem,
		queue: Arc<dyn EventSink>,
		listener: Arc<dyn SyncListener>,
	) -> Self {
		RootFolderFilter { root: root.to_path_buf(), fs, available: Mutex::new(true), queue, listener }
	}

	fn root_exists(&self) -> bool {
		matches!(self.fs.info(&self.root), Ok(Some(info)) if info.is_dir)
	}

	/// Current availability, notifying on a transition
	pub fn check_availability(&self) -> bool {
		let exists = self.root_exists();
		let mut available = self.available.lock().unwrap_or_else(|e| e.into_inner());
		if *available != exists {
			*available = exists;
			if exists {
				info!("Sync root {:?} is available again", self.root);
				self.queue.add_event(SyncEvent::full_sync());
			} else {
				warn!("Sync root {:?} is missing, pausing synchronization", self.root);
			}
			self.listener.on_root_availability(exists);
		}
		exists
	}
}

#[async_trait]
impl SyncEventHandler for RootFolderFilter {
	fn priority(&self) -> i32 {
		priority::CRITICAL
	}

	fn name(&self) -> &str {
		"RootFolderFilter"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match event {
			SyncEvent::Fs(_) | SyncEvent::Object(_) | SyncEvent::StartNextSync(_) => {
				Ok(!self.check_availability())
			}
			_ => Ok(false),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::ListenerBuilder;
	use crate::events::{FsEvent, FsEventType, ObjectEvent};
	use crate::queue::EventCollector;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_absorbs_while_missing_and_notifies_once_per_transition() {
		let dir = TempDir::new().unwrap();
		let root = dir.path().join("root");
		std::fs::create_dir(&root).unwrap();

		let transitions = Arc::new(Mutex::new(Vec::new()));
		let seen = transitions.clone();
		let listener = ListenerBuilder::new()
			.on_root_availability(move |available| seen.lock().unwrap().push(available))
			.build();
		let queue = Arc::new(EventCollector::new());
		let filter = RootFolderFilter::new(&root, LocalFileSystem::new(), queue.clone(), listener);

		let fs_event = SyncEvent::Fs(FsEvent::new(FsEventType::Created, root.join("a"), Some(false)));
		let folder_event = SyncEvent::Object(ObjectEvent::folder(Some(root.join("d")), None));
		assert!(!filter.handle(&fs_event).await.unwrap());

		std::fs::remove_dir(&root).unwrap();
		assert!(filter.handle(&fs_event).await.unwrap());
		assert!(filter.handle(&folder_event).await.unwrap());
		assert!(filter.handle(&SyncEvent::full_sync()).await.unwrap());
		assert_eq!(*transitions.lock().unwrap(), vec![false]);
		assert!(queue.is_empty());

		std::fs::create_dir(&root).unwrap();
		assert!(!filter.handle(&fs_event).await.unwrap());
		assert!(!filter.handle(&folder_event).await.unwrap());
		assert_eq!(*transitions.lock().unwrap(), vec![false, true]);
		assert_eq!(queue.take(), vec![SyncEvent::full_sync()]);
	}
}

// vim: ts=4
