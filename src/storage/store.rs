//! redb-backed metadata storage
//!
//! Records are JSON5 encoded and keyed by remote object id. Secondary
//! tables index them by local identity and by (parent id, name), which is
//! all path resolution needs.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use super::{MappedObject, MetaDataStorage, PathMatcher};
use crate::error::StorageError;

/// Key: remote object id, value: serialized MappedObject
const OBJECTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Key: guid, value: remote object id
const GUIDS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("guids");

/// Key: "<parent id>\0<name>", value: remote object id
const CHILDREN_TABLE: TableDefinition<&str, &str> = TableDefinition::new("children");

/// Key: setting name, value: setting
const META_TABLE: TableDefinition<&str, &str> = TableDefinition::new("meta");

const META_ROOT: &str = "root";
const META_CHANGE_LOG_TOKEN: &str = "changeLogToken";

/// Parent chains deeper than this are treated as a cycle
const MAX_DEPTH: usize = 4096;

fn child_key(parent_id: &str, name: &str) -> String {
	format!("{}\0{}", parent_id, name)
}

fn decode(bytes: &[u8]) -> Result<MappedObject, StorageError> {
	Ok(json5::from_str(std::str::from_utf8(bytes)?)?)
}

/// Metadata storage backed by a redb database
pub struct MetaDataStore {
	db: redb::Database,
	matcher: PathMatcher,
}

impl MetaDataStore {
	/// Open or create the database file
	pub fn open(db_path: &Path, matcher: PathMatcher) -> Result<Self, StorageError> {
		let db = redb::Database::create(db_path)?;
		Self::init(db, matcher)
	}

	/// Volatile storage, nothing survives the process
	pub fn in_memory(matcher: PathMatcher) -> Result<Self, StorageError> {
		let db = redb::Database::builder()
			.create_with_backend(redb::backends::InMemoryBackend::new())?;
		Self::init(db, matcher)
	}

	fn init(db: redb::Database, matcher: PathMatcher) -> Result<Self, StorageError> {
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(OBJECTS_TABLE)?;
			let _ = write_txn.open_table(GUIDS_TABLE)?;
			let _ = write_txn.open_table(CHILDREN_TABLE)?;
			let _ = write_txn.open_table(META_TABLE)?;
			write_txn.commit()?;
		}
		Ok(MetaDataStore { db, matcher })
	}

	fn get_meta(&self, key: &str) -> Result<Option<String>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(META_TABLE)?;
		Ok(table.get(key)?.map(|v| v.value().to_string()))
	}

	fn root(&self) -> Result<Option<MappedObject>, StorageError> {
		match self.get_meta(META_ROOT)? {
			Some(id) => self.get_object_by_remote_id(&id),
			None => Ok(None),
		}
	}

	fn get_child(&self, parent_id: &str, name: &str) -> Result<Option<MappedObject>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let children = read_txn.open_table(CHILDREN_TABLE)?;
		let id = match children.get(child_key(parent_id, name).as_str())? {
			Some(id) => id.value().to_string(),
			None => return Ok(None),
		};
		let objects = read_txn.open_table(OBJECTS_TABLE)?;
		let object = match objects.get(id.as_str())? {
			Some(bytes) => Some(decode(bytes.value())?),
			None => None,
		};
		Ok(object)
	}

	fn child_ids<T>(table: &T, parent_id: &str) -> Result<Vec<String>, StorageError>
	where
		T: ReadableTable<&'static str, &'static str>,
	{
		let start = format!("{}\0", parent_id);
		let end = format!("{}\u{1}", parent_id);
		let mut ids = Vec::new();
		for entry in table.range(start.as_str()..end.as_str())? {
			let (_, id) = entry?;
			ids.push(id.value().to_string());
		}
		Ok(ids)
	}

	/// Walk up the parent chain; returns names from the object up to (excluding) the root
	fn name_chain(&self, object: &MappedObject) -> Result<Option<Vec<String>>, StorageError> {
		let mut names = Vec::new();
		let mut current = object.clone();
		for _ in 0..MAX_DEPTH {
			let parent_id = match current.parent_id.clone() {
				None => return Ok(Some(names)),
				Some(parent_id) => parent_id,
			};
			names.push(current.name.clone());
			current = match self.get_object_by_remote_id(&parent_id)? {
				Some(parent) => parent,
				None => return Ok(None),
			};
		}
		Err(StorageError::Corrupted {
			message: format!("Parent chain of {} does not end at the root", object.remote_object_id),
		})
	}
}

impl MetaDataStorage for MetaDataStore {
	fn matcher(&self) -> &PathMatcher {
		&self.matcher
	}

	fn get_object_by_local_path(&self, path: &Path) -> Result<Option<MappedObject>, StorageError> {
		let rel = match self.matcher.relative_local_path(path) {
			Some(rel) => rel,
			None => return Ok(None),
		};
		let mut current = match self.root()? {
			Some(root) => root,
			None => return Ok(None),
		};
		for component in rel.components() {
			let name = match component {
				Component::Normal(name) => match name.to_str() {
					Some(name) => name,
					None => return Ok(None),
				},
				Component::CurDir => continue,
				_ => return Ok(None),
			};
			current = match self.get_child(&current.remote_object_id, name)? {
				Some(child) => child,
				None => return Ok(None),
			};
		}
		Ok(Some(current))
	}

	fn get_object_by_guid(&self, guid: Uuid) -> Result<Option<MappedObject>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let guids = read_txn.open_table(GUIDS_TABLE)?;
		let id = match guids.get(guid.to_string().as_str())? {
			Some(id) => id.value().to_string(),
			None => return Ok(None),
		};
		let objects = read_txn.open_table(OBJECTS_TABLE)?;
		let object = match objects.get(id.as_str())? {
			Some(bytes) => Some(decode(bytes.value())?),
			None => None,
		};
		Ok(object)
	}

	fn get_object_by_remote_id(&self, id: &str) -> Result<Option<MappedObject>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let objects = read_txn.open_table(OBJECTS_TABLE)?;
		let object = match objects.get(id)? {
			Some(bytes) => Some(decode(bytes.value())?),
			None => None,
		};
		Ok(object)
	}

	fn save_mapped_object(&self, object: &MappedObject) -> Result<(), StorageError> {
		let bytes = json5::to_string(object)?.into_bytes();
		let id = object.remote_object_id.as_str();

		let write_txn = self.db.begin_write()?;
		{
			let mut objects = write_txn.open_table(OBJECTS_TABLE)?;
			let mut guids = write_txn.open_table(GUIDS_TABLE)?;
			let mut children = write_txn.open_table(CHILDREN_TABLE)?;
			let mut meta = write_txn.open_table(META_TABLE)?;

			if let Some(guid) = object.guid {
				let key = guid.to_string();
				let existing = guids.get(key.as_str())?.map(|v| v.value().to_string());
				if let Some(existing) = existing {
					if existing != id {
						return Err(StorageError::DuplicateGuid {
							guid: key,
							existing_remote_id: existing,
						});
					}
				}
			}

			let previous = match objects.get(id)? {
				Some(bytes) => Some(decode(bytes.value())?),
				None => None,
			};
			if let Some(previous) = previous {
				if let Some(guid) = previous.guid {
					guids.remove(guid.to_string().as_str())?;
				}
				if let Some(parent_id) = previous.parent_id.as_deref() {
					children.remove(child_key(parent_id, &previous.name).as_str())?;
				}
			}

			if let Some(guid) = object.guid {
				guids.insert(guid.to_string().as_str(), id)?;
			}
			match object.parent_id.as_deref() {
				Some(parent_id) => {
					children.insert(child_key(parent_id, &object.name).as_str(), id)?;
				}
				None => {
					meta.insert(META_ROOT, id)?;
				}
			}
			objects.insert(id, bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	fn remove_object(&self, object: &MappedObject) -> Result<(), StorageError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut objects = write_txn.open_table(OBJECTS_TABLE)?;
			let mut guids = write_txn.open_table(GUIDS_TABLE)?;
			let mut children = write_txn.open_table(CHILDREN_TABLE)?;
			let mut meta = write_txn.open_table(META_TABLE)?;

			let mut pending = vec![object.remote_object_id.clone()];
			while let Some(id) = pending.pop() {
				pending.extend(Self::child_ids(&children, &id)?);

				let stored = match objects.remove(id.as_str())? {
					Some(bytes) => Some(decode(bytes.value())?),
					None => None,
				};
				if let Some(stored) = stored {
					if let Some(guid) = stored.guid {
						guids.remove(guid.to_string().as_str())?;
					}
					match stored.parent_id.as_deref() {
						Some(parent_id) => {
							children.remove(child_key(parent_id, &stored.name).as_str())?;
						}
						None => {
							meta.remove(META_ROOT)?;
						}
					}
				}
			}
		}
		write_txn.commit()?;
		Ok(())
	}

	fn get_children(&self, object: &MappedObject) -> Result<Vec<MappedObject>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let children = read_txn.open_table(CHILDREN_TABLE)?;
		let objects = read_txn.open_table(OBJECTS_TABLE)?;
		let mut result = Vec::new();
		for id in Self::child_ids(&children, &object.remote_object_id)? {
			if let Some(bytes) = objects.get(id.as_str())? {
				result.push(decode(bytes.value())?);
			}
		}
		Ok(result)
	}

	fn get_object_list(&self) -> Result<Vec<MappedObject>, StorageError> {
		let read_txn = self.db.begin_read()?;
		let objects = read_txn.open_table(OBJECTS_TABLE)?;
		let mut result = Vec::new();
		for entry in objects.iter()? {
			let (_, bytes) = entry?;
			result.push(decode(bytes.value())?);
		}
		Ok(result)
	}

	fn get_local_path(&self, object: &MappedObject) -> Result<Option<PathBuf>, StorageError> {
		let names = match self.name_chain(object)? {
			Some(names) => names,
			None => return Ok(None),
		};
		let mut path = self.matcher.local_root().to_path_buf();
		for name in names.iter().rev() {
			path.push(name);
		}
		Ok(Some(path))
	}

	fn get_remote_path(&self, object: &MappedObject) -> Result<Option<String>, StorageError> {
		let names = match self.name_chain(object)? {
			Some(names) => names,
			None => return Ok(None),
		};
		let mut path = self.matcher.remote_root().to_string();
		for name in names.iter().rev() {
			if !path.ends_with('/') {
				path.push('/');
			}
			path.push_str(name);
		}
		Ok(Some(path))
	}

	fn change_log_token(&self) -> Result<Option<String>, StorageError> {
		self.get_meta(META_CHANGE_LOG_TOKEN)
	}

	fn set_change_log_token(&self, token: Option<&str>) -> Result<(), StorageError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut meta = write_txn.open_table(META_TABLE)?;
			match token {
				Some(token) => {
					meta.insert(META_CHANGE_LOG_TOKEN, token)?;
				}
				None => {
					meta.remove(META_CHANGE_LOG_TOKEN)?;
				}
			}
		}
		write_txn.commit()?;
		Ok(())
	}
}


// vim: ts=4
