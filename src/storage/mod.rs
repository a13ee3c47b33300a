//! Persistent mapping between local objects and remote objects
//!
//! Every object that has been synchronized once is remembered as a
//! [`MappedObject`]: the last state both sides agreed on. Situation
//! detection compares live objects against these records and solvers
//! update them after every successful reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::StorageError;

mod matcher;
mod store;

pub use matcher::PathMatcher;
pub use store::MetaDataStore;

/// Name of the checksum algorithm recorded in [`MappedObject::checksum_algorithm_name`]
pub const CHECKSUM_ALGORITHM: &str = "BLAKE3";

/// Kind of a mapped object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappedObjectType {
	File,
	Folder,
}

/// Last synchronized snapshot of a local/remote object pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedObject {
	#[serde(rename = "nm")]
	pub name: String,
	#[serde(rename = "rid")]
	pub remote_object_id: String,
	/// Remote id of the parent folder, `None` for the sync root
	#[serde(rename = "pid")]
	pub parent_id: Option<String>,
	/// Stable local identity
	#[serde(rename = "gd")]
	pub guid: Option<Uuid>,
	#[serde(rename = "tp")]
	pub object_type: MappedObjectType,
	#[serde(rename = "ct")]
	pub last_change_token: Option<String>,
	#[serde(rename = "lw")]
	pub last_local_write_time_utc: Option<DateTime<Utc>>,
	#[serde(rename = "rw")]
	pub last_remote_write_time_utc: Option<DateTime<Utc>>,
	#[serde(rename = "cs")]
	pub last_checksum: Option<String>,
	#[serde(rename = "ca")]
	pub checksum_algorithm_name: Option<String>,
	#[serde(rename = "sz")]
	pub last_content_size: Option<u64>,
	#[serde(rename = "ro", default)]
	pub is_read_only: bool,
}

impl MappedObject {
	/// Create a record with identity fields only
	pub fn new(
		name: impl Into<String>,
		remote_object_id: impl Into<String>,
		object_type: MappedObjectType,
		parent_id: Option<String>,
		last_change_token: Option<String>,
	) -> Self {
		MappedObject {
			name: name.into(),
			remote_object_id: remote_object_id.into(),
			parent_id,
			guid: None,
			object_type,
			last_change_token,
			last_local_write_time_utc: None,
			last_remote_write_time_utc: None,
			last_checksum: None,
			checksum_algorithm_name: None,
			last_content_size: None,
			is_read_only: false,
		}
	}

	pub fn with_guid(mut self, guid: Option<Uuid>) -> Self {
		self.guid = guid;
		self
	}

	pub fn is_folder(&self) -> bool {
		self.object_type == MappedObjectType::Folder
	}

	/// Record the content state of a file
	pub fn set_content(&mut self, checksum: &str, size: u64) {
		self.last_checksum = Some(checksum.to_string());
		self.checksum_algorithm_name = Some(CHECKSUM_ALGORITHM.to_string());
		self.last_content_size = Some(size);
	}

	/// Check the File/Folder content invariant
	pub fn has_consistent_content(&self) -> bool {
		match self.object_type {
			MappedObjectType::Folder => {
				self.last_checksum.is_none() && self.last_content_size.is_none()
			}
			MappedObjectType::File => {
				self.last_checksum.is_none() == self.last_content_size.is_none()
					&& self.last_checksum.is_none() == self.checksum_algorithm_name.is_none()
			}
		}
	}
}

/// Access to the persistent object mapping
///
/// All access is serialized by the single-consumer event queue, so
/// implementations only need to be safe to share, not to interleave
/// solver transactions.
pub trait MetaDataStorage: Send + Sync {
	/// Local root / remote root translation
	fn matcher(&self) -> &PathMatcher;

	fn get_object_by_local_path(&self, path: &Path) -> Result<Option<MappedObject>, StorageError>;

	fn get_object_by_guid(&self, guid: Uuid) -> Result<Option<MappedObject>, StorageError>;

	fn get_object_by_remote_id(&self, id: &str) -> Result<Option<MappedObject>, StorageError>;

	/// Insert or replace the record keyed by its remote id
	fn save_mapped_object(&self, object: &MappedObject) -> Result<(), StorageError>;

	/// Remove the record and every record below it
	fn remove_object(&self, object: &MappedObject) -> Result<(), StorageError>;

	fn get_children(&self, object: &MappedObject) -> Result<Vec<MappedObject>, StorageError>;

	fn get_object_list(&self) -> Result<Vec<MappedObject>, StorageError>;

	/// Absolute local path of a stored object, derived from the parent chain
	fn get_local_path(&self, object: &MappedObject) -> Result<Option<PathBuf>, StorageError>;

	/// Absolute remote path of a stored object, derived from the parent chain
	fn get_remote_path(&self, object: &MappedObject) -> Result<Option<String>, StorageError>;

	fn change_log_token(&self) -> Result<Option<String>, StorageError>;

	fn set_change_log_token(&self, token: Option<&str>) -> Result<(), StorageError>;
}


// vim: ts=4
