//! Events flowing through the sync event queue
//!
//! Producers (filesystem watcher, change log poller, crawler) put raw
//! events on the queue; transformers turn them into [`ObjectEvent`]s, the
//! unit of work consumed by the sync mechanism.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::InteractionNeeded;
use crate::remote::{ChangeType, RemoteObject};

/// What happened to an object's metadata on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetaDataChangeType {
	#[default]
	None,
	Created,
	Changed,
	Deleted,
	Moved,
}

/// What happened to a file's content on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentChangeType {
	#[default]
	None,
	Created,
	Changed,
	Appended,
	Deleted,
}

impl ContentChangeType {
	pub fn is_change(self) -> bool {
		self != ContentChangeType::None
	}
}

/// File or folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
	File,
	Folder,
}

/// A file or folder change, possibly observed on both sides
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
	pub kind: ObjectKind,
	/// Current local path, absent for objects only known remotely
	pub local_path: Option<PathBuf>,
	/// Current remote object, absent for objects only known locally
	pub remote_object: Option<RemoteObject>,
	pub local: MetaDataChangeType,
	pub remote: MetaDataChangeType,
	pub local_content: ContentChangeType,
	pub remote_content: ContentChangeType,
	/// Previous local path of a moved object
	pub old_local_path: Option<PathBuf>,
	/// Previous remote path of a moved object
	pub old_remote_path: Option<String>,
	pub retry_count: u32,
}

impl ObjectEvent {
	fn new(kind: ObjectKind, local_path: Option<PathBuf>, remote_object: Option<RemoteObject>) -> Self {
		ObjectEvent {
			kind,
			local_path,
			remote_object,
			local: MetaDataChangeType::None,
			remote: MetaDataChangeType::None,
			local_content: ContentChangeType::None,
			remote_content: ContentChangeType::None,
			old_local_path: None,
			old_remote_path: None,
			retry_count: 0,
		}
	}

	pub fn file(local_path: Option<PathBuf>, remote_object: Option<RemoteObject>) -> Self {
		Self::new(ObjectKind::File, local_path, remote_object)
	}

	pub fn folder(local_path: Option<PathBuf>, remote_object: Option<RemoteObject>) -> Self {
		Self::new(ObjectKind::Folder, local_path, remote_object)
	}

	pub fn with_local(mut self, change: MetaDataChangeType) -> Self {
		self.local = change;
		self
	}

	pub fn with_remote(mut self, change: MetaDataChangeType) -> Self {
		self.remote = change;
		self
	}

	pub fn with_local_content(mut self, change: ContentChangeType) -> Self {
		self.local_content = change;
		self
	}

	pub fn with_remote_content(mut self, change: ContentChangeType) -> Self {
		self.remote_content = change;
		self
	}

	/// Mark as a local move from `old_path`
	pub fn moved_locally_from(mut self, old_path: impl Into<PathBuf>) -> Self {
		self.local = MetaDataChangeType::Moved;
		self.old_local_path = Some(old_path.into());
		self
	}

	/// Mark as a remote move from `old_path`
	pub fn moved_remotely_from(mut self, old_path: impl Into<String>) -> Self {
		self.remote = MetaDataChangeType::Moved;
		self.old_remote_path = Some(old_path.into());
		self
	}

	pub fn is_file(&self) -> bool {
		self.kind == ObjectKind::File
	}

	pub fn is_folder(&self) -> bool {
		self.kind == ObjectKind::Folder
	}

	/// Whether this is a moved event (carries a previous location)
	pub fn is_moved_event(&self) -> bool {
		self.old_local_path.is_some() || self.old_remote_path.is_some()
	}

	pub fn remote_id(&self) -> Option<&str> {
		self.remote_object.as_ref().map(|o| o.id.as_str())
	}

	/// Name of the object on the local side, or else the remote side
	pub fn name(&self) -> Option<&str> {
		self.local_path
			.as_deref()
			.and_then(|p| p.file_name())
			.and_then(|n| n.to_str())
			.or_else(|| self.remote_object.as_ref().map(|o| o.name.as_str()))
	}
}

impl fmt::Display for ObjectEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{:?}[local={:?}/{:?} remote={:?}/{:?} path={:?} id={:?} retry={}]",
			self.kind,
			self.local,
			self.local_content,
			self.remote,
			self.remote_content,
			self.local_path,
			self.remote_id(),
			self.retry_count
		)
	}
}

/// Kind of a raw filesystem watcher notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventType {
	Created,
	Changed,
	Deleted,
	Renamed,
}

/// Raw filesystem watcher notification
#[derive(Debug, Clone, PartialEq)]
pub struct FsEvent {
	pub event_type: FsEventType,
	pub path: PathBuf,
	/// Previous path of a renamed object
	pub old_path: Option<PathBuf>,
	/// Known for created/changed objects; deleted objects may be unknown
	pub is_directory: Option<bool>,
}

impl FsEvent {
	pub fn new(event_type: FsEventType, path: impl Into<PathBuf>, is_directory: Option<bool>) -> Self {
		FsEvent { event_type, path: path.into(), old_path: None, is_directory }
	}

	pub fn renamed(old_path: impl Into<PathBuf>, path: impl Into<PathBuf>, is_directory: Option<bool>) -> Self {
		FsEvent {
			event_type: FsEventType::Renamed,
			path: path.into(),
			old_path: Some(old_path.into()),
			is_directory,
		}
	}

	pub fn name(&self) -> Option<&str> {
		self.path.file_name().and_then(|n| n.to_str())
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

/// Remote change log entry, with the live object fetched when it still exists
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChangeEvent {
	pub object_id: String,
	pub change_type: ChangeType,
	pub object: Option<RemoteObject>,
}

/// Request for the next synchronization round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartNextSyncEvent {
	/// Full crawl instead of an incremental change log poll
	pub full_sync_requested: bool,
}

/// Notification that a human has to decide something
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionNeededEvent {
	pub interaction: InteractionNeeded,
	/// Event whose processing raised the problem
	pub source: Option<Box<ObjectEvent>>,
}

/// Everything that can travel through the event queue
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
	Fs(FsEvent),
	ContentChange(ContentChangeEvent),
	Object(ObjectEvent),
	StartNextSync(StartNextSyncEvent),
	InteractionNeeded(InteractionNeededEvent),
}

impl SyncEvent {
	pub fn full_sync() -> Self {
		SyncEvent::StartNextSync(StartNextSyncEvent { full_sync_requested: true })
	}

	pub fn incremental_sync() -> Self {
		SyncEvent::StartNextSync(StartNextSyncEvent { full_sync_requested: false })
	}
}

impl fmt::Display for SyncEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncEvent::Fs(e) => write!(f, "FsEvent[{:?} {:?}]", e.event_type, e.path),
			SyncEvent::ContentChange(e) => {
				write!(f, "ContentChangeEvent[{:?} {}]", e.change_type, e.object_id)
			}
			SyncEvent::Object(e) => write!(f, "{}", e),
			SyncEvent::StartNextSync(e) => {
				write!(f, "StartNextSyncEvent[full={}]", e.full_sync_requested)
			}
			SyncEvent::InteractionNeeded(e) => write!(f, "InteractionNeededEvent[{}]", e.interaction),
		}
	}
}


// vim: ts=4
