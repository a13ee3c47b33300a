//! Full and incremental discovery of changes
//!
//! [`DescendantsCrawler`] compares the complete local tree and the complete
//! remote tree with storage and enqueues an [`ObjectEvent`] for every
//! object that differs. [`ContentChanges`] reads the repository change log
//! since the stored token. Both run on [`StartNextSyncEvent`]s.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{RemoteError, SyncError};
use crate::events::{
	ContentChangeEvent, ContentChangeType, MetaDataChangeType, ObjectEvent, StartNextSyncEvent,
	SyncEvent,
};
use crate::local::{LocalFileSystem, LocalObjectInfo};
use crate::logging::*;
use crate::manager::{priority, SyncEventHandler};
use crate::queue::EventSink;
use crate::remote::{ChangeType, RemoteObject, RemoteRepository};
use crate::storage::{MappedObject, MetaDataStorage};

/// Change log entries requested per call
pub const CHANGE_LOG_PAGE_SIZE: usize = 100;

/// Walks both trees and reports every difference to storage
pub struct DescendantsCrawler {
	storage: Arc<dyn MetaDataStorage>,
	repo: Arc<dyn RemoteRepository>,
	fs: LocalFileSystem,
	queue: Arc<dyn EventSink>,
}

/// Remote object with its path relative to the sync root
struct RemoteEntry {
	object: RemoteObject,
	relative: PathBuf,
}

impl DescendantsCrawler {
	pub fn new(
		storage: Arc<dyn MetaDataStorage>,
		repo: Arc<dyn RemoteRepository>,
		fs: LocalFileSystem,
		queue: Arc<dyn EventSink>,
	) -> Self {
		DescendantsCrawler { storage, repo, fs, queue }
	}

	fn root(&self) -> Result<MappedObject, SyncError> {
		let root = self.storage.matcher().local_root().to_path_buf();
		self.storage.get_object_by_local_path(&root)?.ok_or_else(|| SyncError::Other {
			message: format!("Sync root {} is not mapped", root.display()),
		})
	}

	/// Every local object below the root, parents before children
	fn local_tree(&self) -> Result<Vec<LocalObjectInfo>, SyncError> {
		let mut result = Vec::new();
		let mut pending = VecDeque::from([self.storage.matcher().local_root().to_path_buf()]);
		while let Some(dir) = pending.pop_front() {
			let children = match self.fs.children(&dir) {
				Ok(children) => children,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
				Err(e) => return Err(e.into()),
			};
			for child in children {
				if child.is_dir {
					pending.push_back(child.path.clone());
				}
				result.push(child);
			}
		}
		Ok(result)
	}

	/// Every remote object below the root, parents before children
	async fn remote_tree(&self, root_id: &str) -> Result<Vec<RemoteEntry>, SyncError> {
		let mut result = Vec::new();
		let mut pending = VecDeque::from([(root_id.to_string(), PathBuf::new())]);
		while let Some((id, relative)) = pending.pop_front() {
			for child in self.repo.get_children(&id).await? {
				let relative = relative.join(&child.name);
				if child.is_folder() {
					pending.push_back((child.id.clone(), relative.clone()));
				}
				result.push(RemoteEntry { object: child, relative });
			}
		}
		Ok(result)
	}

	fn event_for(&self, folder: bool, path: Option<PathBuf>, remote: Option<RemoteObject>) -> ObjectEvent {
		if folder {
			ObjectEvent::folder(path, remote)
		} else {
			ObjectEvent::file(path, remote)
		}
	}

	/// Compare storage with both trees, returns the events to process
	pub async fn crawl(&self) -> Result<Vec<ObjectEvent>, SyncError> {
		let root = self.root()?;
		let local_root = self.storage.matcher().local_root().to_path_buf();
		let local = self.local_tree()?;
		let remote = self.remote_tree(&root.remote_object_id).await?;

		let local_by_guid: HashMap<_, _> =
			local.iter().filter_map(|i| i.uuid.map(|uuid| (uuid, i))).collect();
		let local_by_path: HashMap<_, _> = local.iter().map(|i| (i.path.clone(), i)).collect();
		let remote_by_id: HashMap<_, _> = remote.iter().map(|e| (e.object.id.clone(), e)).collect();

		let mut events = Vec::new();
		let mut seen_local = HashSet::new();
		let mut seen_remote = HashSet::new();

		for mapped in self.storage.get_object_list()? {
			if mapped.parent_id.is_none() {
				continue;
			}
			let stored_path = match self.storage.get_local_path(&mapped)? {
				Some(path) => path,
				None => continue,
			};
			let live = mapped
				.guid
				.and_then(|guid| local_by_guid.get(&guid).copied())
				.or_else(|| local_by_path.get(&stored_path).copied());
			let live_remote = remote_by_id.get(&mapped.remote_object_id).map(|e| e.object.clone());
			if let Some(info) = live {
				seen_local.insert(info.path.clone());
			}
			seen_remote.insert(mapped.remote_object_id.clone());

			let mut event = self.event_for(
				mapped.is_folder(),
				Some(live.map(|i| i.path.clone()).unwrap_or_else(|| stored_path.clone())),
				live_remote.clone(),
			);
			match live {
				None => event.local = MetaDataChangeType::Deleted,
				Some(info) if info.path != stored_path => {
					event = event.moved_locally_from(stored_path.clone());
				}
				Some(_) => {}
			}
			if let Some(info) = live {
				let content_changed = !info.is_dir
					&& (Some(info.length) != mapped.last_content_size
						|| info.last_write_time_utc != mapped.last_local_write_time_utc);
				if content_changed {
					event.local_content = ContentChangeType::Changed;
				}
			}
			match &live_remote {
				None => event.remote = MetaDataChangeType::Deleted,
				Some(object) if object.change_token != mapped.last_change_token => {
					event.remote = MetaDataChangeType::Changed;
				}
				Some(_) => {}
			}

			let unchanged = event.local == MetaDataChangeType::None
				&& event.remote == MetaDataChangeType::None
				&& !event.local_content.is_change();
			if !unchanged {
				events.push(event);
			}
		}

		let mapped_ids: HashSet<_> = seen_remote.iter().cloned().collect();
		let new_remote_by_path: HashMap<_, _> = remote
			.iter()
			.filter(|e| !mapped_ids.contains(&e.object.id))
			.map(|e| (local_root.join(&e.relative), e))
			.collect();

		for info in &local {
			if seen_local.contains(&info.path) {
				continue;
			}
			let event = match new_remote_by_path.get(&info.path) {
				Some(entry) if entry.object.is_folder() == info.is_dir => {
					seen_remote.insert(entry.object.id.clone());
					self.event_for(info.is_dir, Some(info.path.clone()), Some(entry.object.clone()))
						.with_remote(MetaDataChangeType::Created)
				}
				_ => self.event_for(info.is_dir, Some(info.path.clone()), None),
			};
			let event = event.with_local(MetaDataChangeType::Created);
			events.push(if info.is_dir { event } else { event.with_local_content(ContentChangeType::Created) });
		}

		for entry in &remote {
			if seen_remote.contains(&entry.object.id) {
				continue;
			}
			let event = self
				.event_for(entry.object.is_folder(), None, Some(entry.object.clone()))
				.with_remote(MetaDataChangeType::Created);
			events.push(if entry.object.is_folder() {
				event
			} else {
				event.with_remote_content(ContentChangeType::Created)
			});
		}
		Ok(events)
	}

	/// Crawl, enqueue the differences and remember the change log position
	pub async fn full_sync(&self) -> Result<usize, SyncError> {
		// Taken first so changes made during the crawl are polled again
		let token = self.repo.latest_change_log_token().await?;
		let events = self.crawl().await?;
		let count = events.len();
		for event in events {
			self.queue.add_event(SyncEvent::Object(event));
		}
		self.storage.set_change_log_token(token.as_deref())?;
		info!("Full synchronization found {} differences", count);
		Ok(count)
	}
}

#[async_trait]
impl SyncEventHandler for DescendantsCrawler {
	fn priority(&self) -> i32 {
		priority::CRAWLER
	}

	fn name(&self) -> &str {
		"DescendantsCrawler"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match event {
			SyncEvent::StartNextSync(StartNextSyncEvent { full_sync_requested: true }) => {
				self.full_sync().await?;
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}

/// Polls the repository change log
pub struct ContentChanges {
	storage: Arc<dyn MetaDataStorage>,
	repo: Arc<dyn RemoteRepository>,
	queue: Arc<dyn EventSink>,
	page_size: usize,
}

impl ContentChanges {
	pub fn new(
		storage: Arc<dyn MetaDataStorage>,
		repo: Arc<dyn RemoteRepository>,
		queue: Arc<dyn EventSink>,
	) -> Self {
		ContentChanges { storage, repo, queue, page_size: CHANGE_LOG_PAGE_SIZE }
	}

	pub fn with_page_size(mut self, page_size: usize) -> Self {
		self.page_size = page_size.max(1);
		self
	}

	async fn fetch(&self, id: &str) -> Result<Option<RemoteObject>, SyncError> {
		match self.repo.get_object_by_id(id).await {
			Ok(object) => Ok(Some(object)),
			Err(RemoteError::NotFound { .. }) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Enqueue the changes since the stored token, returns their number
	///
	/// Without a usable token a full synchronization is requested instead.
	pub async fn poll(&self) -> Result<usize, SyncError> {
		let mut token = match self.storage.change_log_token()? {
			Some(token) => token,
			None => {
				debug!("No change log token stored, requesting full sync");
				self.queue.add_event(SyncEvent::full_sync());
				return Ok(0);
			}
		};
		let mut count = 0;
		loop {
			let page = match self.repo.get_content_changes(Some(token.as_str()), self.page_size).await {
				Ok(page) => page,
				Err(RemoteError::InvalidChangeToken { token }) => {
					warn!("Change log token {} was rejected, requesting full sync", token);
					self.queue.add_event(SyncEvent::full_sync());
					return Ok(count);
				}
				Err(e) => return Err(e.into()),
			};
			for entry in page.entries {
				let object = match entry.change_type {
					ChangeType::Deleted => None,
					_ => self.fetch(&entry.object_id).await?,
				};
				self.queue.add_event(SyncEvent::ContentChange(ContentChangeEvent {
					object_id: entry.object_id,
					change_type: entry.change_type,
					object,
				}));
				count += 1;
			}
			if let Some(latest) = page.latest_token {
				if latest != token {
					self.storage.set_change_log_token(Some(&latest))?;
					token = latest;
				}
			}
			if !page.has_more {
				break;
			}
		}
		if count > 0 {
			debug!("Change log reported {} changes", count);
		}
		Ok(count)
	}
}

#[async_trait]
impl SyncEventHandler for ContentChanges {
	fn priority(&self) -> i32 {
		priority::CRAWLER
	}

	fn name(&self) -> &str {
		"ContentChanges"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match event {
			SyncEvent::StartNextSync(StartNextSyncEvent { full_sync_requested: false }) => {
				self.poll().await?;
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}


// vim: ts=4
