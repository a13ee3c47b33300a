//! Filters for changes the engine already applied itself
//!
//! Every solver write on one side produces a watcher or change log event
//! on that same side. Comparing the live object with the stored mapping
//! shows whether the event only reports what storage already knows.

use std::path::Path;
use std::sync::Arc;

use super::EventFilter;
use crate::error::SyncError;
use crate::events::{ContentChangeEvent, FsEvent, FsEventType, SyncEvent};
use crate::local::LocalFileSystem;
use crate::remote::ChangeType;
use crate::situation::mapped_object_for_path;
use crate::storage::MetaDataStorage;

/// Ignores filesystem events that match the stored state
pub struct AlreadyHandledFsEventFilter {
	storage: Arc<dyn MetaDataStorage>,
	fs: LocalFileSystem,
}

impl AlreadyHandledFsEventFilter {
	pub fn new(storage: Arc<dyn MetaDataStorage>, fs: LocalFileSystem) -> Self {
		AlreadyHandledFsEventFilter { storage, fs }
	}

	/// Whether the object at `path` is mapped at exactly that path with the same content state
	fn is_in_sync(&self, path: &Path) -> Result<bool, SyncError> {
		let info = match self.fs.info(path) {
			Ok(Some(info)) => info,
			_ => return Ok(false),
		};
		let storage = self.storage.as_ref();
		let mapped = match mapped_object_for_path(storage, &self.fs, path)? {
			Some(mapped) => mapped,
			None => return Ok(false),
		};
		if storage.get_local_path(&mapped)?.as_deref() != Some(path) {
			return Ok(false);
		}
		if info.is_dir {
			return Ok(mapped.is_folder());
		}
		Ok(!mapped.is_folder()
			&& mapped.last_content_size == Some(info.length)
			&& mapped.last_local_write_time_utc.is_some()
			&& mapped.last_local_write_time_utc == info.last_write_time_utc)
	}

	fn check_fs_event(&self, event: &FsEvent) -> Result<bool, SyncError> {
		match event.event_type {
			FsEventType::Created | FsEventType::Changed | FsEventType::Renamed => {
				self.is_in_sync(&event.path)
			}
			FsEventType::Deleted => Ok(!self.fs.exists(&event.path)
				&& self.storage.get_object_by_local_path(&event.path)?.is_none()),
		}
	}
}

impl EventFilter for AlreadyHandledFsEventFilter {
	fn name(&self) -> &str {
		"AlreadyHandledFsEventFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		let fs_event = match event {
			SyncEvent::Fs(e) => e,
			_ => return Ok(None),
		};
		if self.check_fs_event(fs_event)? {
			Ok(Some(format!(
				"{:?} of '{}' is already synchronized",
				fs_event.event_type,
				fs_event.path.display()
			)))
		} else {
			Ok(None)
		}
	}
}

/// Ignores remote change log entries that match the stored state
pub struct AlreadyHandledContentChangeFilter {
	storage: Arc<dyn MetaDataStorage>,
}

impl AlreadyHandledContentChangeFilter {
	pub fn new(storage: Arc<dyn MetaDataStorage>) -> Self {
		AlreadyHandledContentChangeFilter { storage }
	}

	fn is_handled(&self, event: &ContentChangeEvent) -> Result<bool, SyncError> {
		let mapped = self.storage.get_object_by_remote_id(&event.object_id)?;
		if event.change_type == ChangeType::Deleted {
			return Ok(mapped.is_none());
		}
		match (mapped, &event.object) {
			(Some(mapped), Some(object)) => Ok(mapped.last_change_token == object.change_token
				&& mapped.parent_id == object.parent_id),
			_ => Ok(false),
		}
	}
}

impl EventFilter for AlreadyHandledContentChangeFilter {
	fn name(&self) -> &str {
		"AlreadyHandledContentChangeFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		let change = match event {
			SyncEvent::ContentChange(e) => e,
			_ => return Ok(None),
		};
		if self.is_handled(change)? {
			Ok(Some(format!(
				"{:?} of remote object {} is already synchronized",
				change.change_type, change.object_id
			)))
		} else {
			Ok(None)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::remote::{RemoteObject, RemoteObjectType};
	use crate::storage::{MappedObject, MappedObjectType, MetaDataStore, PathMatcher};
	use tempfile::TempDir;

	fn storage(root: &Path, fs: &LocalFileSystem) -> Arc<MetaDataStore> {
		let storage = MetaDataStore::in_memory(PathMatcher::new(root, "/")).unwrap();
		let root = MappedObject::new("", "root", MappedObjectType::Folder, None, None)
			.with_guid(fs.uuid(root).unwrap());
		storage.save_mapped_object(&root).unwrap();
		Arc::new(storage)
	}

	#[test]
	fn test_fs_event_matching_storage_is_ignored() {
		let dir = TempDir::new().unwrap();
		let fs = LocalFileSystem::new();
		let storage = storage(dir.path(), &fs);
		let path = dir.path().join("a.txt");
		std::fs::write(&path, b"abc").unwrap();
		let info = fs.info(&path).unwrap().unwrap();

		let mut mapped = MappedObject::new("a.txt", "doc-1", MappedObjectType::File, Some("root".into()), None)
			.with_guid(info.uuid);
		mapped.set_content("hash", 3);
		mapped.last_local_write_time_utc = info.last_write_time_utc;
		storage.save_mapped_object(&mapped).unwrap();

		let filter = AlreadyHandledFsEventFilter::new(storage.clone(), fs);
		let changed = SyncEvent::Fs(FsEvent::new(FsEventType::Changed, &path, Some(false)));
		assert!(filter.check(&changed).unwrap().is_some());

		// An external edit changes size and time
		std::fs::write(&path, b"abcdef").unwrap();
		assert!(filter.check(&changed).unwrap().is_none());
	}

	#[test]
	fn test_unknown_file_passes() {
		let dir = TempDir::new().unwrap();
		let fs = LocalFileSystem::new();
		let storage = storage(dir.path(), &fs);
		let path = dir.path().join("new.txt");
		std::fs::write(&path, b"").unwrap();

		let filter = AlreadyHandledFsEventFilter::new(storage, fs);
		let created = SyncEvent::Fs(FsEvent::new(FsEventType::Created, &path, Some(false)));
		assert!(filter.check(&created).unwrap().is_none());
	}

	#[test]
	fn test_deleted_event() {
		let dir = TempDir::new().unwrap();
		let fs = LocalFileSystem::new();
		let storage = storage(dir.path(), &fs);
		let filter = AlreadyHandledFsEventFilter::new(storage.clone(), fs);

		let deleted = SyncEvent::Fs(FsEvent::new(FsEventType::Deleted, dir.path().join("gone"), None));
		assert!(filter.check(&deleted).unwrap().is_some());

		storage
			.save_mapped_object(&MappedObject::new(
				"gone",
				"doc-2",
				MappedObjectType::File,
				Some("root".into()),
				None,
			))
			.unwrap();
		assert!(filter.check(&deleted).unwrap().is_none());
	}

	fn remote(token: &str, parent: &str) -> RemoteObject {
		RemoteObject {
			id: "doc-1".to_string(),
			name: "a.txt".to_string(),
			parent_id: Some(parent.to_string()),
			paths: vec!["/a.txt".to_string()],
			object_type: RemoteObjectType::Document,
			change_token: Some(token.to_string()),
			last_modification_date: None,
			content_length: Some(0),
			content_hash: None,
			read_only: false,
		}
	}

	#[test]
	fn test_content_change_filter() {
		let dir = TempDir::new().unwrap();
		let fs = LocalFileSystem::new();
		let storage = storage(dir.path(), &fs);
		storage
			.save_mapped_object(&MappedObject::new(
				"a.txt",
				"doc-1",
				MappedObjectType::File,
				Some("root".into()),
				Some("5".into()),
			))
			.unwrap();
		let filter = AlreadyHandledContentChangeFilter::new(storage.clone());

		let event = |change_type, object| {
			SyncEvent::ContentChange(ContentChangeEvent {
				object_id: "doc-1".to_string(),
				change_type,
				object,
			})
		};
		assert!(filter.check(&event(ChangeType::Updated, Some(remote("5", "root")))).unwrap().is_some());
		assert!(filter.check(&event(ChangeType::Updated, Some(remote("6", "root")))).unwrap().is_none());
		assert!(filter.check(&event(ChangeType::Updated, Some(remote("5", "other")))).unwrap().is_none());
		// Still mapped locally, so the deletion has to be processed
		assert!(filter.check(&event(ChangeType::Deleted, None)).unwrap().is_none());

		let mapped = storage.get_object_by_remote_id("doc-1").unwrap().unwrap();
		storage.remove_object(&mapped).unwrap();
		let deleted = event(ChangeType::Deleted, None);
		let first = filter.check(&deleted).unwrap();
		assert!(first.is_some());
		assert_eq!(first, filter.check(&deleted).unwrap());
	}
}

// vim: ts=4
