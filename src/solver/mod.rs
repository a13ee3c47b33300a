//! Solvers
//!
//! A solver reconciles one (local situation, remote situation) pair: it
//! performs the remote and local operations that bring both sides into
//! the same state and records that state in the metadata storage. The
//! [`SolverMatrix`] maps every supported pair to its solver; a pair
//! without an entry is not implemented.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{RemoteError, SolveError};
use crate::events::{ObjectEvent, SyncEvent};
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::queue::EventSink;
use crate::remote::{RemoteObject, RemoteRepository};
use crate::situation::{mapped_object_for_path, SituationType};
use crate::storage::{MappedObject, MappedObjectType, MetaDataStorage};
use crate::strategies::ConflictResolution;
use crate::transmission::{self, TransferResult, TransmissionManager};

mod both;
mod composite;
mod conflict;
mod local;
mod remote;

pub use both::{
	BothAdded, BothChanged, BothDeleted, BothMoved, BothRenamed, LocalChangedRemoteDeleted,
	LocalDeletedRemoteChanged, LocalDeletedRemoteMoved, LocalMovedRemoteDeleted,
};
pub use composite::Composite;
pub use conflict::conflict_copy_name;
pub use local::{LocalAdded, LocalChanged, LocalDeleted, LocalMoved, LocalRenamed};
pub use remote::{RemoteAdded, RemoteChanged, RemoteDeleted, RemoteMoved, RemoteRenamed};

/// `Ok(())` on success, otherwise how the reconciliation failed
pub type SolveResult = Result<(), SolveError>;

/// Reconciles one situation pair
#[async_trait]
pub trait Solver: Send + Sync {
	/// Name used in logs
	fn name(&self) -> &str;

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult;
}

/// Solver of the NOCHANGE / NOCHANGE pair
#[derive(Debug, Default)]
pub struct Nothing;

#[async_trait]
impl Solver for Nothing {
	fn name(&self) -> &str {
		"Nothing"
	}

	async fn solve(&self, _ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		trace!("Nothing to do for {}", event);
		Ok(())
	}
}

/// Everything a solver works with
pub struct SolverContext {
	pub storage: Arc<dyn MetaDataStorage>,
	pub repo: Arc<dyn RemoteRepository>,
	pub fs: LocalFileSystem,
	pub transmissions: Arc<TransmissionManager>,
	pub queue: Arc<dyn EventSink>,
	pub conflict_resolution: ConflictResolution,
	pub conflict_suffix: String,
	pub chunk_size: usize,
}

impl SolverContext {
	/// Context with default conflict and transfer settings
	pub fn new(
		storage: Arc<dyn MetaDataStorage>,
		repo: Arc<dyn RemoteRepository>,
		transmissions: Arc<TransmissionManager>,
		queue: Arc<dyn EventSink>,
	) -> Self {
		let defaults = Config::default();
		SolverContext {
			storage,
			repo,
			fs: LocalFileSystem::new(),
			transmissions,
			queue,
			conflict_resolution: defaults.conflict_resolution,
			conflict_suffix: defaults.conflict_suffix,
			chunk_size: defaults.chunk_size,
		}
	}

	/// Take conflict and transfer settings from `config`
	pub fn with_config(mut self, config: &Config) -> Self {
		self.conflict_resolution = config.conflict_resolution;
		self.conflict_suffix = config.conflict_suffix.clone();
		self.chunk_size = config.chunk_size;
		self
	}

	pub fn storage(&self) -> &dyn MetaDataStorage {
		self.storage.as_ref()
	}

	/// Stored mapping of the event's object: remote id, local identity, old local path
	pub(crate) fn mapping_for(&self, event: &ObjectEvent) -> Result<Option<MappedObject>, SolveError> {
		if let Some(id) = event.remote_id() {
			if let Some(mapped) = self.storage.get_object_by_remote_id(id)? {
				return Ok(Some(mapped));
			}
		}
		if let Some(path) = event.local_path.as_deref() {
			if let Some(mapped) = mapped_object_for_path(self.storage(), &self.fs, path)? {
				return Ok(Some(mapped));
			}
		}
		if let Some(old) = event.old_local_path.as_deref() {
			return Ok(self.storage.get_object_by_local_path(old)?);
		}
		Ok(None)
	}

	/// Local path of a stored object
	pub(crate) fn local_path(&self, mapped: &MappedObject) -> Result<PathBuf, SolveError> {
		self.storage.get_local_path(mapped)?.ok_or_else(|| {
			SolveError::fatal(format!("No local path for remote object {}", mapped.remote_object_id))
		})
	}

	/// Mapping of the folder containing `path`
	///
	/// A parent that is not synchronized yet may be on its way through the
	/// queue, so this asks for a retry.
	pub(crate) fn local_parent(&self, path: &Path) -> Result<MappedObject, SolveError> {
		let parent = path
			.parent()
			.ok_or_else(|| SolveError::fatal(format!("{} has no parent", path.display())))?;
		match mapped_object_for_path(self.storage(), &self.fs, parent)? {
			Some(mapped) if mapped.is_folder() => Ok(mapped),
			_ => Err(SolveError::retry(format!(
				"Parent folder {} is not synchronized yet",
				parent.display()
			))),
		}
	}

	/// Local target path of a remote object, below its mapped parent
	pub(crate) fn local_target(&self, remote: &RemoteObject) -> Result<PathBuf, SolveError> {
		let parent_id = remote
			.parent_id
			.as_deref()
			.ok_or_else(|| SolveError::fatal(format!("Remote object {} has no parent", remote.id)))?;
		let parent = match self.storage.get_object_by_remote_id(parent_id)? {
			Some(parent) => parent,
			None => {
				return Err(SolveError::retry(format!(
					"Parent folder {} of {} is not synchronized yet",
					parent_id, remote.name
				)))
			}
		};
		Ok(self.local_path(&parent)?.join(&remote.name))
	}

	/// Record describing both sides as they are now
	pub(crate) fn snapshot(
		&self,
		remote: &RemoteObject,
		local_path: &Path,
		content: Option<&TransferResult>,
	) -> Result<MappedObject, SolveError> {
		let object_type =
			if remote.is_folder() { MappedObjectType::Folder } else { MappedObjectType::File };
		let info = self.fs.info(local_path)?;
		let mut mapped = MappedObject::new(
			remote.name.clone(),
			remote.id.clone(),
			object_type,
			remote.parent_id.clone(),
			remote.change_token.clone(),
		)
		.with_guid(info.as_ref().and_then(|i| i.uuid));
		mapped.last_local_write_time_utc = info.and_then(|i| i.last_write_time_utc);
		mapped.last_remote_write_time_utc = remote.last_modification_date;
		mapped.is_read_only = remote.read_only;
		if let (MappedObjectType::File, Some(content)) = (object_type, content) {
			mapped.set_content(&content.checksum, content.size);
		}
		Ok(mapped)
	}

	/// Upload the local file's content into `remote_id`
	pub(crate) async fn upload(&self, path: &Path, remote_id: &str) -> Result<TransferResult, SolveError> {
		transmission::upload(&self.transmissions, self.repo.as_ref(), path, remote_id, self.chunk_size).await
	}

	/// Download the remote document into `target` and take over its modification time
	pub(crate) async fn download(
		&self,
		remote: &RemoteObject,
		target: &Path,
	) -> Result<TransferResult, SolveError> {
		let result = transmission::download(
			&self.transmissions,
			self.repo.as_ref(),
			&self.fs,
			remote,
			target,
			self.chunk_size,
		)
		.await?;
		if let Some(date) = remote.last_modification_date {
			self.fs.set_last_write_time_utc(target, date)?;
		}
		Ok(result)
	}

	/// Upload and record the new state of both sides
	pub(crate) async fn upload_and_save(
		&self,
		path: &Path,
		remote: RemoteObject,
	) -> Result<MappedObject, SolveError> {
		let content = self.upload(path, &remote.id).await?;
		let remote = content.remote.clone().unwrap_or(remote);
		let mapped = self.snapshot(&remote, path, Some(&content))?;
		self.storage.save_mapped_object(&mapped)?;
		Ok(mapped)
	}

	/// Download and record the new state of both sides
	pub(crate) async fn download_and_save(
		&self,
		remote: &RemoteObject,
		path: &Path,
	) -> Result<MappedObject, SolveError> {
		let content = self.download(remote, path).await?;
		let mapped = self.snapshot(remote, path, Some(&content))?;
		self.storage.save_mapped_object(&mapped)?;
		Ok(mapped)
	}

	/// Current remote object, `None` once it is gone
	pub(crate) async fn fetch(&self, id: &str) -> Result<Option<RemoteObject>, SolveError> {
		match self.repo.get_object_by_id(id).await {
			Ok(object) => Ok(Some(object)),
			Err(RemoteError::NotFound { .. }) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Whether the local file differs from the stored content
	pub(crate) fn local_content_changed(&self, path: &Path, mapped: &MappedObject) -> Result<bool, SolveError> {
		if mapped.last_checksum.is_none() {
			return Ok(true);
		}
		let (checksum, size) = self.fs.checksum(path)?;
		Ok(Some(checksum) != mapped.last_checksum || Some(size) != mapped.last_content_size)
	}

	/// Whether the remote document differs from the stored content
	pub(crate) fn remote_content_changed(&self, remote: &RemoteObject, mapped: &MappedObject) -> bool {
		if remote.content_length != mapped.last_content_size {
			return true;
		}
		match &remote.content_hash {
			Some(hash) => Some(hash) != mapped.last_checksum.as_ref(),
			None => remote.change_token != mapped.last_change_token,
		}
	}

	/// Folder subtrees changed wholesale; let the crawler sort out the children
	pub(crate) fn request_full_sync(&self) {
		debug!("Requesting full synchronization");
		self.queue.add_event(SyncEvent::full_sync());
	}
}

/// Final component of a local path
pub(crate) fn file_name(path: &Path) -> Result<&str, SolveError> {
	path.file_name()
		.and_then(|n| n.to_str())
		.ok_or_else(|| SolveError::fatal(format!("{} has no usable file name", path.display())))
}

/// Copy of `event` pointing at other objects, for handing over to another solver
pub(crate) fn redirect(
	event: &ObjectEvent,
	local_path: Option<PathBuf>,
	remote: Option<RemoteObject>,
) -> ObjectEvent {
	let mut event = event.clone();
	event.local_path = local_path;
	event.remote_object = remote;
	event
}

/// Fixed table of solvers indexed by (local situation, remote situation)
#[derive(Clone, Default)]
pub struct SolverMatrix {
	solvers: HashMap<(SituationType, SituationType), Arc<dyn Solver>>,
}

impl SolverMatrix {
	/// Empty matrix
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the solver of a cell
	pub fn with(mut self, local: SituationType, remote: SituationType, solver: Arc<dyn Solver>) -> Self {
		self.solvers.insert((local, remote), solver);
		self
	}

	pub fn get(&self, local: SituationType, remote: SituationType) -> Option<&Arc<dyn Solver>> {
		self.solvers.get(&(local, remote))
	}

	pub fn len(&self) -> usize {
		self.solvers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.solvers.is_empty()
	}

	/// The complete set of solvers
	pub fn standard() -> Self {
		use SituationType::*;

		let local_added: Arc<dyn Solver> = Arc::new(LocalAdded);
		let remote_added: Arc<dyn Solver> = Arc::new(RemoteAdded);
		let local_changed: Arc<dyn Solver> = Arc::new(LocalChanged);
		let remote_changed: Arc<dyn Solver> = Arc::new(RemoteChanged);
		let local_moved: Arc<dyn Solver> = Arc::new(LocalMoved);
		let local_renamed: Arc<dyn Solver> = Arc::new(LocalRenamed);
		let remote_moved: Arc<dyn Solver> = Arc::new(RemoteMoved);
		let remote_renamed: Arc<dyn Solver> = Arc::new(RemoteRenamed);
		let local_deleted_remote_moved: Arc<dyn Solver> = Arc::new(LocalDeletedRemoteMoved);
		let local_moved_remote_deleted: Arc<dyn Solver> = Arc::new(LocalMovedRemoteDeleted);

		SolverMatrix::new()
			.with(NoChange, NoChange, Arc::new(Nothing))
			.with(NoChange, Added, remote_added.clone())
			.with(NoChange, Removed, Arc::new(RemoteDeleted))
			.with(NoChange, Changed, remote_changed.clone())
			.with(NoChange, Moved, remote_moved.clone())
			.with(NoChange, Renamed, remote_renamed.clone())
			.with(Added, NoChange, local_added.clone())
			.with(Added, Added, Arc::new(BothAdded))
			.with(Added, Removed, local_added)
			.with(Removed, NoChange, Arc::new(LocalDeleted))
			.with(Removed, Added, remote_added)
			.with(Removed, Removed, Arc::new(BothDeleted))
			.with(Removed, Changed, Arc::new(LocalDeletedRemoteChanged))
			.with(Removed, Moved, local_deleted_remote_moved.clone())
			.with(Removed, Renamed, local_deleted_remote_moved)
			.with(Changed, NoChange, local_changed.clone())
			.with(Changed, Removed, Arc::new(LocalChangedRemoteDeleted))
			.with(Changed, Changed, Arc::new(BothChanged))
			.with(
				Changed,
				Moved,
				Arc::new(Composite::new("RemoteMoved+LocalChanged", vec![remote_moved, local_changed.clone()])),
			)
			.with(
				Changed,
				Renamed,
				Arc::new(Composite::new("RemoteRenamed+LocalChanged", vec![remote_renamed, local_changed])),
			)
			.with(Moved, NoChange, local_moved.clone())
			.with(Moved, Removed, local_moved_remote_deleted.clone())
			.with(
				Moved,
				Changed,
				Arc::new(Composite::new("LocalMoved+RemoteChanged", vec![local_moved, remote_changed.clone()])),
			)
			.with(Moved, Moved, Arc::new(BothMoved))
			.with(Renamed, NoChange, local_renamed.clone())
			.with(Renamed, Removed, local_moved_remote_deleted)
			.with(
				Renamed,
				Changed,
				Arc::new(Composite::new("LocalRenamed+RemoteChanged", vec![local_renamed, remote_changed])),
			)
			.with(Renamed, Renamed, Arc::new(BothRenamed))
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_standard_matrix_is_deterministic() {
		let matrix = SolverMatrix::standard();
		assert_eq!(matrix.len(), 28);
		for local in SituationType::ALL {
			for remote in SituationType::ALL {
				match (matrix.get(local, remote), matrix.get(local, remote)) {
					(Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
					(None, None) => {}
					_ => panic!("lookup of {}/{} changed", local, remote),
				}
			}
		}
		assert_eq!(matrix.get(SituationType::Removed, SituationType::NoChange).unwrap().name(), "LocalDeleted");
		assert_eq!(
			matrix.get(SituationType::Changed, SituationType::Moved).unwrap().name(),
			"RemoteMoved+LocalChanged"
		);
		assert!(matrix.get(SituationType::Added, SituationType::Changed).is_none());
		assert!(matrix.get(SituationType::Moved, SituationType::Renamed).is_none());
	}
}

// vim: ts=4
