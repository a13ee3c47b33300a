//! Local side situation detection

use std::path::Path;

use super::{Detection, SituationDetection, SituationType};
use crate::error::StorageError;
use crate::events::{MetaDataChangeType, ObjectEvent};
use crate::local::LocalFileSystem;
use crate::storage::{MappedObject, MetaDataStorage};

/// Detects local situations from the event's `local` change and the filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalSituationDetection {
	fs: LocalFileSystem,
}

impl LocalSituationDetection {
	pub fn new(fs: LocalFileSystem) -> Self {
		LocalSituationDetection { fs }
	}

	fn analyse_move(
		&self,
		storage: &dyn MetaDataStorage,
		event: &ObjectEvent,
	) -> Result<SituationType, StorageError> {
		let path = match event.local_path.as_deref() {
			Some(path) => path,
			None => return Ok(SituationType::Moved),
		};
		let mut mapped = mapped_by_identity(storage, &self.fs, path)?;
		if mapped.is_none() {
			if let Some(old) = event.old_local_path.as_deref() {
				mapped = storage.get_object_by_local_path(old)?;
			}
		}
		let mapped = match mapped {
			Some(mapped) => mapped,
			None => return Ok(SituationType::Moved),
		};

		let parent = match path.parent() {
			Some(parent) => mapped_object_for_path(storage, &self.fs, parent)?,
			None => None,
		};
		match parent {
			Some(parent) if Some(&parent.remote_object_id) == mapped.parent_id.as_ref() => {
				Ok(SituationType::Renamed)
			}
			_ => Ok(SituationType::Moved),
		}
	}

	fn analyse_change(
		&self,
		storage: &dyn MetaDataStorage,
		event: &ObjectEvent,
	) -> Result<SituationType, StorageError> {
		if event.is_file() && event.local_content.is_change() {
			return Ok(SituationType::Changed);
		}
		let path = match event.local_path.as_deref() {
			Some(path) => path,
			None => return Ok(SituationType::Changed),
		};
		if let Some(mapped) = mapped_by_identity(storage, &self.fs, path)? {
			let name = path.file_name().and_then(|n| n.to_str());
			if name.is_some() && name != Some(mapped.name.as_str()) {
				return Ok(SituationType::Renamed);
			}
		}
		Ok(SituationType::Changed)
	}
}

impl SituationDetection for LocalSituationDetection {
	fn analyse(
		&self,
		storage: &dyn MetaDataStorage,
		event: &ObjectEvent,
	) -> Result<Detection, StorageError> {
		let situation = match event.local {
			MetaDataChangeType::Created => SituationType::Added,
			MetaDataChangeType::Deleted => SituationType::Removed,
			MetaDataChangeType::Moved => self.analyse_move(storage, event)?,
			MetaDataChangeType::Changed => self.analyse_change(storage, event)?,
			MetaDataChangeType::None => {
				if event.is_file() && event.local_content.is_change() {
					SituationType::Changed
				} else {
					SituationType::NoChange
				}
			}
		};
		Ok(Detection::new(situation))
	}
}

/// Stored mapping of the live object at `path`, found by its stable identity
fn mapped_by_identity(
	storage: &dyn MetaDataStorage,
	fs: &LocalFileSystem,
	path: &Path,
) -> Result<Option<MappedObject>, StorageError> {
	// A vanished object simply has no identity any more
	let guid = fs.uuid(path).ok().flatten();
	match guid {
		Some(guid) => storage.get_object_by_guid(guid),
		None => Ok(None),
	}
}

/// Stored mapping for a local path, by identity first and by path second
pub(crate) fn mapped_object_for_path(
	storage: &dyn MetaDataStorage,
	fs: &LocalFileSystem,
	path: &Path,
) -> Result<Option<MappedObject>, StorageError> {
	match mapped_by_identity(storage, fs, path)? {
		Some(mapped) => Ok(Some(mapped)),
		None => storage.get_object_by_local_path(path),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::ContentChangeType;
	use crate::storage::{MappedObjectType, MetaDataStore, PathMatcher};
	use std::fs;
	use std::path::PathBuf;
	use tempfile::TempDir;

	struct Fixture {
		temp_dir: TempDir,
		storage: MetaDataStore,
		fs: LocalFileSystem,
	}

	impl Fixture {
		fn new() -> Self {
			let temp_dir = TempDir::new().unwrap();
			let storage =
				MetaDataStore::in_memory(PathMatcher::new(temp_dir.path(), "/remote")).unwrap();
			let fs = LocalFileSystem::new();
			let root = MappedObject::new("remote", "root", MappedObjectType::Folder, None, None)
				.with_guid(fs.uuid(temp_dir.path()).unwrap());
			storage.save_mapped_object(&root).unwrap();
			Fixture { temp_dir, storage, fs }
		}

		fn path(&self, rel: &str) -> PathBuf {
			self.temp_dir.path().join(rel)
		}

		fn map_dir(&self, rel: &str, id: &str, parent: &str) {
			let path = self.path(rel);
			fs::create_dir_all(&path).unwrap();
			let name = path.file_name().unwrap().to_str().unwrap().to_string();
			let obj = MappedObject::new(name, id, MappedObjectType::Folder, Some(parent.into()), None)
				.with_guid(self.fs.uuid(&path).unwrap());
			self.storage.save_mapped_object(&obj).unwrap();
		}

		fn map_file(&self, rel: &str, id: &str, parent: &str) {
			let path = self.path(rel);
			fs::write(&path, b"x").unwrap();
			let name = path.file_name().unwrap().to_str().unwrap().to_string();
			let obj = MappedObject::new(name, id, MappedObjectType::File, Some(parent.into()), None)
				.with_guid(self.fs.uuid(&path).unwrap());
			self.storage.save_mapped_object(&obj).unwrap();
		}

		fn analyse(&self, event: &ObjectEvent) -> SituationType {
			LocalSituationDetection::new(self.fs)
				.analyse(&self.storage, event)
				.unwrap()
				.situation
		}
	}

	#[test]
	fn test_no_change() {
		let f = Fixture::new();
		let e = ObjectEvent::file(Some(f.path("a")), None);
		assert_eq!(f.analyse(&e), SituationType::NoChange);
	}

	#[test]
	fn test_created_and_deleted() {
		let f = Fixture::new();
		let created = ObjectEvent::file(Some(f.path("a")), None).with_local(MetaDataChangeType::Created);
		assert_eq!(f.analyse(&created), SituationType::Added);

		let deleted = ObjectEvent::file(Some(f.path("a")), None).with_local(MetaDataChangeType::Deleted);
		assert_eq!(f.analyse(&deleted), SituationType::Removed);
	}

	#[test]
	fn test_created_wins_over_content_change() {
		let f = Fixture::new();
		let e = ObjectEvent::file(Some(f.path("a")), None)
			.with_local(MetaDataChangeType::Created)
			.with_local_content(ContentChangeType::Changed);
		assert_eq!(f.analyse(&e), SituationType::Added);
	}

	#[test]
	fn test_content_change() {
		let f = Fixture::new();
		let e = ObjectEvent::file(Some(f.path("a")), None).with_local_content(ContentChangeType::Changed);
		assert_eq!(f.analyse(&e), SituationType::Changed);

		// Folders have no content
		let e = ObjectEvent::folder(Some(f.path("d")), None).with_local_content(ContentChangeType::Changed);
		assert_eq!(f.analyse(&e), SituationType::NoChange);
	}

	#[test]
	fn test_moved_without_mapping() {
		let f = Fixture::new();
		fs::write(f.path("new"), b"x").unwrap();
		let e = ObjectEvent::file(Some(f.path("new")), None).moved_locally_from(f.path("old"));
		assert_eq!(f.analyse(&e), SituationType::Moved);
	}

	#[test]
	fn test_rename_in_same_parent() {
		let f = Fixture::new();
		f.map_file("old", "d1", "root");
		fs::rename(f.path("old"), f.path("new")).unwrap();
		let e = ObjectEvent::file(Some(f.path("new")), None).moved_locally_from(f.path("old"));
		assert_eq!(f.analyse(&e), SituationType::Renamed);
	}

	#[test]
	fn test_move_to_other_parent() {
		let f = Fixture::new();
		f.map_dir("target", "f1", "root");
		f.map_file("a.txt", "d1", "root");
		fs::rename(f.path("a.txt"), f.path("target/a.txt")).unwrap();
		let e = ObjectEvent::file(Some(f.path("target/a.txt")), None).moved_locally_from(f.path("a.txt"));
		assert_eq!(f.analyse(&e), SituationType::Moved);
	}

	#[test]
	fn test_folder_changed_with_new_name_is_rename() {
		let f = Fixture::new();
		f.map_dir("before", "f1", "root");
		fs::rename(f.path("before"), f.path("after")).unwrap();
		let e = ObjectEvent::folder(Some(f.path("after")), None).with_local(MetaDataChangeType::Changed);
		assert_eq!(f.analyse(&e), SituationType::Renamed);

		let e = ObjectEvent::folder(Some(f.path("unknown")), None).with_local(MetaDataChangeType::Changed);
		assert_eq!(f.analyse(&e), SituationType::Changed);
	}

	#[test]
	fn test_analyse_is_pure() {
		let f = Fixture::new();
		f.map_file("old", "d1", "root");
		fs::rename(f.path("old"), f.path("new")).unwrap();
		let e = ObjectEvent::file(Some(f.path("new")), None).moved_locally_from(f.path("old"));
		let first = f.analyse(&e);
		let second = f.analyse(&e);
		assert_eq!(first, second);
		assert_eq!(f.storage.get_object_list().unwrap().len(), 2);
	}
}

// vim: ts=4
