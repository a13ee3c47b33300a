//! Remote object repository interface
//!
//! The sync engine never speaks CMIS itself. Everything it needs from the
//! server is expressed by [`RemoteRepository`]; a binding for a concrete
//! CMIS client implements this trait. [`MemoryRepository`] is an
//! in-process implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

mod memory;

pub use memory::MemoryRepository;

/// Result type for repository operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Base type of a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteObjectType {
	Document,
	Folder,
}

/// Properties of a remote document or folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
	pub id: String,
	pub name: String,
	/// Id of the containing folder, `None` for the repository root
	pub parent_id: Option<String>,
	pub paths: Vec<String>,
	pub object_type: RemoteObjectType,
	/// Optimistic concurrency token, changes with every modification
	pub change_token: Option<String>,
	pub last_modification_date: Option<DateTime<Utc>>,
	pub content_length: Option<u64>,
	/// Hex encoded BLAKE3 hash of the content, when the server provides one
	pub content_hash: Option<String>,
	pub read_only: bool,
}

impl RemoteObject {
	pub fn is_folder(&self) -> bool {
		self.object_type == RemoteObjectType::Folder
	}

	pub fn is_document(&self) -> bool {
		self.object_type == RemoteObjectType::Document
	}

	/// First path of the object, if the server reports one
	pub fn path(&self) -> Option<&str> {
		self.paths.first().map(|p| p.as_str())
	}
}

/// Kind of a change log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
	Created,
	Updated,
	Deleted,
	Security,
}

/// One entry of the repository change log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogEntry {
	pub object_id: String,
	pub change_type: ChangeType,
	pub change_time: Option<DateTime<Utc>>,
}

/// A page of change log entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogPage {
	pub entries: Vec<ChangeLogEntry>,
	/// Token to continue from
	pub latest_token: Option<String>,
	pub has_more: bool,
}

/// Operations the sync engine needs from the remote repository
#[async_trait]
pub trait RemoteRepository: Send + Sync {
	async fn get_object_by_id(&self, id: &str) -> RemoteResult<RemoteObject>;

	async fn get_object_by_path(&self, path: &str) -> RemoteResult<RemoteObject>;

	/// Direct children of a folder
	async fn get_children(&self, folder_id: &str) -> RemoteResult<Vec<RemoteObject>>;

	async fn create_folder(&self, parent_id: &str, name: &str) -> RemoteResult<RemoteObject>;

	/// Create a document, optionally with initial content
	async fn create_document(
		&self,
		parent_id: &str,
		name: &str,
		content: Option<&[u8]>,
	) -> RemoteResult<RemoteObject>;

	/// Replace the content stream
	async fn set_content_stream(&self, id: &str, content: &[u8]) -> RemoteResult<RemoteObject>;

	/// Append to the content stream; `is_last` finishes the upload
	async fn append_content_stream(
		&self,
		id: &str,
		chunk: &[u8],
		is_last: bool,
	) -> RemoteResult<RemoteObject>;

	/// Read `length` bytes from `offset`; a short read means end of content
	async fn get_content_stream(
		&self,
		id: &str,
		offset: u64,
		length: u64,
	) -> RemoteResult<Vec<u8>>;

	async fn move_object(
		&self,
		id: &str,
		source_folder_id: &str,
		target_folder_id: &str,
	) -> RemoteResult<RemoteObject>;

	async fn rename(&self, id: &str, new_name: &str) -> RemoteResult<RemoteObject>;

	/// Delete a document or an empty folder
	async fn delete(&self, id: &str) -> RemoteResult<()>;

	/// Delete a folder and everything below it
	async fn delete_tree(&self, folder_id: &str) -> RemoteResult<()>;

	/// Change log entries after `token` (`None` starts from the beginning)
	async fn get_content_changes(
		&self,
		token: Option<&str>,
		max_items: usize,
	) -> RemoteResult<ChangeLogPage>;

	/// Token of the most recent change log entry
	async fn latest_change_log_token(&self) -> RemoteResult<Option<String>>;
}

// vim: ts=4
