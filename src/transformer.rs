//! Translation of raw producer events into object events
//!
//! Watcher notifications and change log entries say little about the
//! object itself. The transformers look up the live state and the stored
//! mapping, decide whether a file or a folder is concerned and enqueue the
//! resulting [`ObjectEvent`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SyncError;
use crate::events::{
	ContentChangeEvent, ContentChangeType, FsEvent, FsEventType, MetaDataChangeType, ObjectEvent,
	SyncEvent,
};
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::manager::{priority, SyncEventHandler};
use crate::queue::EventSink;
use crate::remote::{ChangeType, RemoteObject};
use crate::storage::{MappedObject, MetaDataStorage};

/// Turns filesystem watcher events into local object events
pub struct FsEventTransformer {
	storage: Arc<dyn MetaDataStorage>,
	fs: LocalFileSystem,
	queue: Arc<dyn EventSink>,
}

impl FsEventTransformer {
	pub fn new(storage: Arc<dyn MetaDataStorage>, fs: LocalFileSystem, queue: Arc<dyn EventSink>) -> Self {
		FsEventTransformer { storage, fs, queue }
	}

	/// Decide file or folder: live object first, then the stored mapping, then the event
	fn is_folder(&self, event: &FsEvent) -> Result<bool, SyncError> {
		if let Ok(Some(info)) = self.fs.info(&event.path) {
			return Ok(info.is_dir);
		}
		if let Some(mapped) = self.storage.get_object_by_local_path(&event.path)? {
			return Ok(mapped.is_folder());
		}
		Ok(event.is_directory.unwrap_or(false))
	}

	pub fn transform(&self, event: &FsEvent) -> Result<ObjectEvent, SyncError> {
		let is_folder = self.is_folder(event)?;
		let path = Some(event.path.clone());
		let object = if is_folder { ObjectEvent::folder(path, None) } else { ObjectEvent::file(path, None) };
		let object = match event.event_type {
			FsEventType::Created => {
				let object = object.with_local(MetaDataChangeType::Created);
				if is_folder {
					object
				} else {
					object.with_local_content(ContentChangeType::Created)
				}
			}
			FsEventType::Changed => {
				if is_folder {
					object.with_local(MetaDataChangeType::Changed)
				} else {
					object.with_local_content(ContentChangeType::Changed)
				}
			}
			FsEventType::Deleted => object.with_local(MetaDataChangeType::Deleted),
			FsEventType::Renamed => match &event.old_path {
				Some(old) => object.moved_locally_from(old.clone()),
				None => object.with_local(MetaDataChangeType::Changed),
			},
		};
		Ok(object)
	}
}

#[async_trait]
impl SyncEventHandler for FsEventTransformer {
	fn priority(&self) -> i32 {
		priority::TRANSFORMER
	}

	fn name(&self) -> &str {
		"FsEventTransformer"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		let fs_event = match event {
			SyncEvent::Fs(e) => e,
			_ => return Ok(false),
		};
		let object = self.transform(fs_event)?;
		debug!("{} became {}", event, object);
		self.queue.add_event(SyncEvent::Object(object));
		Ok(true)
	}
}

/// Turns remote change log entries into remote object events
pub struct ContentChangeTransformer {
	storage: Arc<dyn MetaDataStorage>,
	queue: Arc<dyn EventSink>,
}

impl ContentChangeTransformer {
	pub fn new(storage: Arc<dyn MetaDataStorage>, queue: Arc<dyn EventSink>) -> Self {
		ContentChangeTransformer { storage, queue }
	}

	fn deleted(&self, mapped: &MappedObject) -> Result<ObjectEvent, SyncError> {
		let path = self.storage.get_local_path(mapped)?;
		let object = if mapped.is_folder() {
			ObjectEvent::folder(path, None)
		} else {
			ObjectEvent::file(path, None)
		};
		Ok(object.with_remote(MetaDataChangeType::Deleted))
	}

	fn updated(&self, object: &RemoteObject, mapped: Option<&MappedObject>) -> Result<ObjectEvent, SyncError> {
		let path = match mapped {
			Some(mapped) => self.storage.get_local_path(mapped)?,
			None => None,
		};
		let event = if object.is_folder() {
			ObjectEvent::folder(path, Some(object.clone()))
		} else {
			ObjectEvent::file(path, Some(object.clone()))
		};
		let mapped = match mapped {
			Some(mapped) => mapped,
			None => {
				let event = event.with_remote(MetaDataChangeType::Created);
				return Ok(if object.is_document() {
					event.with_remote_content(ContentChangeType::Created)
				} else {
					event
				});
			}
		};
		let event = event.with_remote(MetaDataChangeType::Changed);
		let content_changed = object.is_document()
			&& (object.content_length != mapped.last_content_size
				|| (object.content_hash.is_some() && object.content_hash != mapped.last_checksum));
		Ok(if content_changed {
			event.with_remote_content(ContentChangeType::Changed)
		} else {
			event
		})
	}

	/// `None` when there is nothing left to synchronize
	pub fn transform(&self, event: &ContentChangeEvent) -> Result<Option<ObjectEvent>, SyncError> {
		let mapped = self.storage.get_object_by_remote_id(&event.object_id)?;
		let object = match (&event.object, event.change_type) {
			(_, ChangeType::Deleted) | (None, _) => match mapped {
				Some(mapped) => Some(self.deleted(&mapped)?),
				None => None,
			},
			(Some(object), _) => Some(self.updated(object, mapped.as_ref())?),
		};
		Ok(object)
	}
}

#[async_trait]
impl SyncEventHandler for ContentChangeTransformer {
	fn priority(&self) -> i32 {
		priority::TRANSFORMER
	}

	fn name(&self) -> &str {
		"ContentChangeTransformer"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		let change = match event {
			SyncEvent::ContentChange(e) => e,
			_ => return Ok(false),
		};
		match self.transform(change)? {
			Some(object) => {
				debug!("{} became {}", event, object);
				self.queue.add_event(SyncEvent::Object(object));
			}
			None => debug!("{} needs no synchronization", event),
		}
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::queue::EventCollector;
	use crate::remote::RemoteObjectType;
	use crate::storage::{MappedObjectType, MetaDataStore, PathMatcher};
	use std::path::Path;
	use tempfile::TempDir;

	fn storage(root: &Path) -> Arc<MetaDataStore> {
		let storage = MetaDataStore::in_memory(PathMatcher::new(root, "/")).unwrap();
		storage
			.save_mapped_object(&MappedObject::new("", "root", MappedObjectType::Folder, None, None))
			.unwrap();
		Arc::new(storage)
	}

	fn only_object(queue: &EventCollector) -> ObjectEvent {
		match queue.take().as_slice() {
			[SyncEvent::Object(e)] => e.clone(),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_fs_events() {
		let dir = TempDir::new().unwrap();
		let storage = storage(dir.path());
		let queue = Arc::new(EventCollector::new());
		let t = FsEventTransformer::new(storage.clone(), LocalFileSystem::new(), queue.clone());

		let file = dir.path().join("a.txt");
		std::fs::write(&file, b"").unwrap();
		assert!(t.handle(&SyncEvent::Fs(FsEvent::new(FsEventType::Created, &file, None))).await.unwrap());
		let e = only_object(&queue);
		assert!(e.is_file());
		assert_eq!(e.local, MetaDataChangeType::Created);
		assert_eq!(e.local_content, ContentChangeType::Created);

		let folder = dir.path().join("d");
		std::fs::create_dir(&folder).unwrap();
		t.handle(&SyncEvent::Fs(FsEvent::new(FsEventType::Changed, &folder, None))).await.unwrap();
		let e = only_object(&queue);
		assert!(e.is_folder());
		assert_eq!(e.local, MetaDataChangeType::Changed);

		t.handle(&SyncEvent::Fs(FsEvent::renamed(&file, dir.path().join("b.txt"), Some(false))))
			.await
			.unwrap();
		let e = only_object(&queue);
		assert_eq!(e.local, MetaDataChangeType::Moved);
		assert_eq!(e.old_local_path.as_deref(), Some(file.as_path()));
	}

	#[tokio::test]
	async fn test_deleted_kind_from_storage() {
		let dir = TempDir::new().unwrap();
		let storage = storage(dir.path());
		storage
			.save_mapped_object(&MappedObject::new(
				"gone",
				"f1",
				MappedObjectType::Folder,
				Some("root".into()),
				None,
			))
			.unwrap();
		let queue = Arc::new(EventCollector::new());
		let t = FsEventTransformer::new(storage, LocalFileSystem::new(), queue.clone());

		t.handle(&SyncEvent::Fs(FsEvent::new(FsEventType::Deleted, dir.path().join("gone"), None)))
			.await
			.unwrap();
		let e = only_object(&queue);
		assert!(e.is_folder());
		assert_eq!(e.local, MetaDataChangeType::Deleted);
	}

	fn remote(id: &str, token: &str, length: u64) -> RemoteObject {
		RemoteObject {
			id: id.to_string(),
			name: "a.txt".to_string(),
			parent_id: Some("root".to_string()),
			paths: vec!["/a.txt".to_string()],
			object_type: RemoteObjectType::Document,
			change_token: Some(token.to_string()),
			last_modification_date: None,
			content_length: Some(length),
			content_hash: None,
			read_only: false,
		}
	}

	#[tokio::test]
	async fn test_content_changes() {
		let dir = TempDir::new().unwrap();
		let storage = storage(dir.path());
		let queue = Arc::new(EventCollector::new());
		let t = ContentChangeTransformer::new(storage.clone(), queue.clone());

		let created = ContentChangeEvent {
			object_id: "doc-1".to_string(),
			change_type: ChangeType::Created,
			object: Some(remote("doc-1", "1", 3)),
		};
		t.handle(&SyncEvent::ContentChange(created)).await.unwrap();
		let e = only_object(&queue);
		assert_eq!(e.remote, MetaDataChangeType::Created);
		assert_eq!(e.remote_content, ContentChangeType::Created);
		assert_eq!(e.local_path, None);

		let mut mapped =
			MappedObject::new("a.txt", "doc-1", MappedObjectType::File, Some("root".into()), Some("1".into()));
		mapped.set_content("x", 3);
		storage.save_mapped_object(&mapped).unwrap();

		let updated = ContentChangeEvent {
			object_id: "doc-1".to_string(),
			change_type: ChangeType::Updated,
			object: Some(remote("doc-1", "2", 5)),
		};
		t.handle(&SyncEvent::ContentChange(updated)).await.unwrap();
		let e = only_object(&queue);
		assert_eq!(e.remote, MetaDataChangeType::Changed);
		assert_eq!(e.remote_content, ContentChangeType::Changed);
		assert_eq!(e.local_path, Some(dir.path().join("a.txt")));

		// Updated but gone by the time it was fetched
		let vanished = ContentChangeEvent {
			object_id: "doc-1".to_string(),
			change_type: ChangeType::Updated,
			object: None,
		};
		t.handle(&SyncEvent::ContentChange(vanished)).await.unwrap();
		let e = only_object(&queue);
		assert_eq!(e.remote, MetaDataChangeType::Deleted);
		assert!(e.is_file());

		let unknown = ContentChangeEvent {
			object_id: "doc-9".to_string(),
			change_type: ChangeType::Deleted,
			object: None,
		};
		assert!(t.handle(&SyncEvent::ContentChange(unknown)).await.unwrap());
		assert!(queue.is_empty());
	}
}

// vim: ts=4
