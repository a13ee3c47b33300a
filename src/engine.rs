//! Engine assembly
//!
//! [`SyncEngine`] opens the metadata storage, makes sure the sync root is
//! mapped, builds the handler chain (filters, transformers, crawlers,
//! dispatcher, interaction reporter) and drives the event queue.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::callbacks::SyncListener;
use crate::config::Config;
use crate::crawler::{ContentChanges, DescendantsCrawler};
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::filter::build_filter_chain;
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::manager::SyncEventManager;
use crate::mechanism::{InteractionReporter, SyncMechanism};
use crate::queue::{EventSink, QueueHandle, SyncEventQueue};
use crate::remote::RemoteRepository;
use crate::situation::{LocalSituationDetection, RemoteSituationDetection};
use crate::solver::{SolverContext, SolverMatrix};
use crate::storage::{MappedObject, MappedObjectType, MetaDataStorage, MetaDataStore, PathMatcher};
use crate::transformer::{ContentChangeTransformer, FsEventTransformer};
use crate::transmission::TransmissionManager;

/// A configured synchronization between one local folder and one remote folder
pub struct SyncEngine {
	config: Config,
	storage: Arc<dyn MetaDataStorage>,
	queue: SyncEventQueue,
	handle: QueueHandle,
	manager: Arc<SyncEventManager>,
	listener: Arc<dyn SyncListener>,
	transmissions: Arc<TransmissionManager>,
}

impl SyncEngine {
	/// Build an engine; creates the local root and maps it on first use
	pub async fn new(
		config: Config,
		repo: Arc<dyn RemoteRepository>,
		listener: Arc<dyn SyncListener>,
	) -> Result<Self, SyncError> {
		config.validate()?;
		let fs = LocalFileSystem::new();
		let matcher = PathMatcher::new(&config.local_root, &config.remote_root);
		let store = match &config.database_path {
			Some(path) => MetaDataStore::open(path, matcher)?,
			None => MetaDataStore::in_memory(matcher)?,
		};
		let storage: Arc<dyn MetaDataStorage> = Arc::new(store);
		map_root(&config, storage.as_ref(), repo.as_ref(), &fs).await?;

		let queue = SyncEventQueue::new();
		let handle = queue.handle();
		let sink: Arc<dyn EventSink> = Arc::new(handle.clone());
		let transmissions = Arc::new(TransmissionManager::new(config.bandwidth_limit, listener.clone()));
		let ctx = SolverContext::new(storage.clone(), repo.clone(), transmissions.clone(), sink.clone())
			.with_config(&config);

		let mut manager = SyncEventManager::new();
		let filters =
			build_filter_chain(&config.filter_config(), storage.clone(), fs, sink.clone(), listener.clone())?;
		for handler in filters {
			manager.add_handler(handler);
		}
		manager.add_handler(Arc::new(FsEventTransformer::new(storage.clone(), fs, sink.clone())));
		manager.add_handler(Arc::new(ContentChangeTransformer::new(storage.clone(), sink.clone())));
		manager.add_handler(Arc::new(DescendantsCrawler::new(storage.clone(), repo.clone(), fs, sink.clone())));
		manager.add_handler(Arc::new(ContentChanges::new(storage.clone(), repo.clone(), sink)));
		manager.add_handler(Arc::new(
			SyncMechanism::new(
				Arc::new(LocalSituationDetection::new(fs)),
				Arc::new(RemoteSituationDetection::new()),
				SolverMatrix::standard(),
				Arc::new(ctx),
				listener.clone(),
			)
			.with_max_retries(config.max_retries),
		));
		manager.add_handler(Arc::new(InteractionReporter::new(listener.clone())));
		debug!("Handler chain has {} handlers", manager.handler_count());

		Ok(SyncEngine {
			config,
			storage,
			queue,
			handle,
			manager: Arc::new(manager),
			listener,
			transmissions,
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> Arc<dyn MetaDataStorage> {
		self.storage.clone()
	}

	pub fn transmissions(&self) -> Arc<TransmissionManager> {
		self.transmissions.clone()
	}

	/// Producer handle for watchers and other event sources
	pub fn queue(&self) -> QueueHandle {
		self.handle.clone()
	}

	pub fn add_event(&self, event: SyncEvent) {
		self.handle.add_event(event);
	}

	/// Process queued events until none are left, returns how many were processed
	pub async fn process_pending(&mut self) -> usize {
		self.queue.drain(&self.manager, self.listener.as_ref()).await
	}

	/// Run a full synchronization and everything it triggers
	pub async fn sync_once(&mut self) -> usize {
		self.add_event(SyncEvent::full_sync());
		self.process_pending().await
	}

	/// Synchronize until `shutdown` turns true
	///
	/// Starts with a full synchronization and polls the change log every
	/// `pollIntervalSecs` afterwards. Running transfers are aborted on shutdown.
	pub async fn run(self, shutdown: watch::Receiver<bool>) {
		info!(
			"Synchronizing {} with {}",
			self.config.local_root.display(),
			self.config.remote_root
		);
		self.handle.add_event(SyncEvent::full_sync());

		let poller = {
			let handle = self.handle.clone();
			let mut shutdown = shutdown.clone();
			let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
			tokio::spawn(async move {
				let mut interval = tokio::time::interval(period);
				interval.tick().await;
				loop {
					tokio::select! {
						_ = interval.tick() => handle.add_event(SyncEvent::incremental_sync()),
						changed = shutdown.changed() => {
							if changed.is_err() || *shutdown.borrow() {
								break;
							}
						}
					}
				}
			})
		};

		let transmissions = self.transmissions.clone();
		self.queue.run(self.manager, self.listener, shutdown).await;
		transmissions.abort_all();
		poller.abort();
		info!("Synchronization stopped");
	}
}

/// Map the local root onto the remote root unless that already happened
async fn map_root(
	config: &Config,
	storage: &dyn MetaDataStorage,
	repo: &dyn RemoteRepository,
	fs: &LocalFileSystem,
) -> Result<(), SyncError> {
	let root = &config.local_root;
	fs.create_dir(root)?;
	if let Some(mapped) = storage.get_object_by_local_path(root)? {
		if mapped.guid.is_none() || mapped.guid == fs.uuid(root)? {
			return Ok(());
		}
		// The root folder was recreated
		let mut mapped = mapped;
		mapped.guid = fs.uuid(root)?;
		storage.save_mapped_object(&mapped)?;
		return Ok(());
	}
	let remote = repo.get_object_by_path(&config.remote_root).await?;
	if !remote.is_folder() {
		return Err(SyncError::InvalidConfig {
			message: format!("Remote root {} is not a folder", config.remote_root),
		});
	}
	let mapped =
		MappedObject::new("", remote.id.clone(), MappedObjectType::Folder, None, remote.change_token.clone())
			.with_guid(fs.uuid(root)?);
	storage.save_mapped_object(&mapped)?;
	info!("Mapped {} to remote folder {}", root.display(), remote.id);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::NoListener;
	use crate::remote::MemoryRepository;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_new_engine_maps_root() {
		let dir = TempDir::new().unwrap();
		let root = dir.path().join("sync");
		let repo = Arc::new(MemoryRepository::new());
		let engine = SyncEngine::new(Config::new(&root, "/"), repo.clone(), Arc::new(NoListener)).await.unwrap();

		assert!(root.is_dir());
		let mapped = engine.storage().get_object_by_local_path(&root).unwrap().unwrap();
		assert_eq!(mapped.remote_object_id, repo.root_id());
		assert!(mapped.is_folder());
	}

	#[tokio::test]
	async fn test_persistent_storage_is_reused() {
		let dir = TempDir::new().unwrap();
		let root = dir.path().join("sync");
		let mut config = Config::new(&root, "/");
		config.database_path = Some(dir.path().join("meta.redb"));
		let repo = Arc::new(MemoryRepository::new());

		let mut engine = SyncEngine::new(config.clone(), repo.clone(), Arc::new(NoListener)).await.unwrap();
		std::fs::write(root.join("a.txt"), b"abc").unwrap();
		engine.sync_once().await;
		drop(engine);

		let engine = SyncEngine::new(config, repo, Arc::new(NoListener)).await.unwrap();
		let mapped = engine.storage().get_object_by_local_path(&root.join("a.txt")).unwrap();
		assert_eq!(mapped.unwrap().last_content_size, Some(3));
	}

	#[tokio::test]
	async fn test_run_stops_on_shutdown() {
		let dir = TempDir::new().unwrap();
		let repo = Arc::new(MemoryRepository::new());
		let engine = SyncEngine::new(Config::new(dir.path(), "/"), repo, Arc::new(NoListener)).await.unwrap();
		let (tx, rx) = watch::channel(false);

		let task = tokio::spawn(engine.run(rx));
		tx.send(true).unwrap();
		tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
	}
}

// vim: ts=4
