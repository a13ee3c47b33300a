//! Event filters
//!
//! Filters sit at the top of the handler chain and absorb events that must
//! never reach the solvers. Every filter except the root availability check
//! is a pure [`EventFilter`]: it inspects the event and the current state
//! and returns the reason for ignoring it, if any. [`FilterHandler`] turns
//! such a filter into a chain link that logs the reason and tells the
//! listener.
//!
//! Filters are built from a [`FilterConfig`] snapshot; changing the
//! configuration means building a new chain.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::callbacks::SyncListener;
use crate::config::FilterConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::manager::{priority, SyncEventHandler};
use crate::queue::EventSink;
use crate::storage::{MetaDataStorage, PathMatcher};

mod handled;
mod names;
mod paths;
mod root;
mod symlink;

pub use handled::{AlreadyHandledContentChangeFilter, AlreadyHandledFsEventFilter};
pub use names::{IgnoredNamesFilter, InvalidFolderNameFilter};
pub use paths::IgnoredPathsFilter;
pub use root::RootFolderFilter;
pub use symlink::SymlinkFilter;

/// A side-effect free absorb decision
pub trait EventFilter: Send + Sync {
	fn name(&self) -> &str;

	/// Reason for ignoring the event, `None` lets it pass
	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError>;
}

/// Chain link running one [`EventFilter`]
pub struct FilterHandler {
	filter: Box<dyn EventFilter>,
	listener: Arc<dyn SyncListener>,
}

impl FilterHandler {
	pub fn new(filter: Box<dyn EventFilter>, listener: Arc<dyn SyncListener>) -> Self {
		FilterHandler { filter, listener }
	}
}

#[async_trait]
impl SyncEventHandler for FilterHandler {
	fn priority(&self) -> i32 {
		priority::FILTER
	}

	fn name(&self) -> &str {
		self.filter.name()
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match self.filter.check(event)? {
			Some(reason) => {
				debug!("{} ignored {}: {}", self.filter.name(), event, reason);
				self.listener.on_ignored(event, &reason);
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

/// Build the complete filter chain, root availability check first
pub fn build_filter_chain(
	config: &FilterConfig,
	storage: Arc<dyn MetaDataStorage>,
	fs: LocalFileSystem,
	queue: Arc<dyn EventSink>,
	listener: Arc<dyn SyncListener>,
) -> Result<Vec<Arc<dyn SyncEventHandler>>, SyncError> {
	let matcher = storage.matcher().clone();
	let filters: Vec<Box<dyn EventFilter>> = vec![
		Box::new(IgnoredNamesFilter::new(config, matcher.clone())?),
		Box::new(InvalidFolderNameFilter::new(matcher.clone())),
		Box::new(IgnoredPathsFilter::new(config, matcher.clone())),
		Box::new(SymlinkFilter::new(config, fs)),
		Box::new(AlreadyHandledFsEventFilter::new(storage.clone(), fs)),
		Box::new(AlreadyHandledContentChangeFilter::new(storage)),
	];

	let mut chain: Vec<Arc<dyn SyncEventHandler>> = vec![Arc::new(RootFolderFilter::new(
		matcher.local_root(),
		fs,
		queue,
		listener.clone(),
	))];
	for filter in filters {
		chain.push(Arc::new(FilterHandler::new(filter, listener.clone())));
	}
	Ok(chain)
}

/// What a filter looks at, independent of the event variant
#[derive(Debug, Default)]
pub(crate) struct Subject<'a> {
	pub name: Option<&'a str>,
	/// `None` when the event does not tell
	pub is_folder: Option<bool>,
	pub local_path: Option<&'a Path>,
	pub remote_path: Option<&'a str>,
}

impl<'a> Subject<'a> {
	pub fn of(event: &'a SyncEvent) -> Option<Self> {
		match event {
			SyncEvent::Fs(e) => Some(Subject {
				name: e.name(),
				is_folder: e.is_directory,
				local_path: Some(e.path()),
				remote_path: None,
			}),
			SyncEvent::Object(e) => Some(Subject {
				name: e.name(),
				is_folder: Some(e.is_folder()),
				local_path: e.local_path.as_deref(),
				remote_path: e.remote_object.as_ref().and_then(|o| o.path()),
			}),
			SyncEvent::ContentChange(e) => e.object.as_ref().map(|o| Subject {
				name: Some(o.name.as_str()),
				is_folder: Some(o.is_folder()),
				local_path: None,
				remote_path: o.path(),
			}),
			_ => None,
		}
	}

	/// Remote path, derived from the local path when the event has none
	pub fn remote_path(&self, matcher: &PathMatcher) -> Option<String> {
		match (self.remote_path, self.local_path) {
			(Some(path), _) => Some(path.to_string()),
			(None, Some(local)) => matcher.create_remote_path(local),
			(None, None) => None,
		}
	}
}

// vim: ts=4
