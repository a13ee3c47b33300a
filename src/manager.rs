//! Priority ordered chain of event handlers

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::logging::*;

/// Handler priorities, higher runs first
pub mod priority {
	/// Root availability check
	pub const CRITICAL: i32 = 10_000;
	/// Ignore filters
	pub const FILTER: i32 = 5_000;
	/// Raw event to object event translation
	pub const TRANSFORMER: i32 = 4_000;
	/// Full and incremental crawlers
	pub const CRAWLER: i32 = 3_000;
	/// Situation detection and solver dispatch
	pub const SYNCHRONIZER: i32 = 1_000;
	/// Reporting of events nobody else wants
	pub const DEFAULT: i32 = 0;
}

/// One link of the handler chain
#[async_trait]
pub trait SyncEventHandler: Send + Sync {
	fn priority(&self) -> i32;

	/// Name used in logs
	fn name(&self) -> &str {
		std::any::type_name::<Self>()
	}

	/// Returns `true` when the event is fully handled and must not reach
	/// handlers of lower priority
	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError>;
}

/// Passes each event down the handler chain until one takes it
#[derive(Default)]
pub struct SyncEventManager {
	handlers: Vec<Arc<dyn SyncEventHandler>>,
}

impl SyncEventManager {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a handler; handlers of equal priority keep insertion order
	pub fn add_handler(&mut self, handler: Arc<dyn SyncEventHandler>) {
		let pos = self
			.handlers
			.iter()
			.position(|h| h.priority() < handler.priority())
			.unwrap_or(self.handlers.len());
		self.handlers.insert(pos, handler);
	}

	pub fn handler_count(&self) -> usize {
		self.handlers.len()
	}

	pub async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		for handler in &self.handlers {
			if handler.handle(event).await? {
				trace!("{} handled by {}", event, handler.name());
				return Ok(true);
			}
		}
		Ok(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	struct Named {
		name: &'static str,
		priority: i32,
		takes: bool,
		log: Arc<Mutex<Vec<&'static str>>>,
	}

	#[async_trait]
	impl SyncEventHandler for Named {
		fn priority(&self) -> i32 {
			self.priority
		}

		fn name(&self) -> &str {
			self.name
		}

		async fn handle(&self, _event: &SyncEvent) -> Result<bool, SyncError> {
			self.log.lock().unwrap().push(self.name);
			Ok(self.takes)
		}
	}

	#[tokio::test]
	async fn test_handlers_run_by_priority_until_taken() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let make = |name, priority, takes| {
			Arc::new(Named { name, priority, takes, log: log.clone() }) as Arc<dyn SyncEventHandler>
		};

		let mut manager = SyncEventManager::new();
		manager.add_handler(make("sync", priority::SYNCHRONIZER, true));
		manager.add_handler(make("filter-a", priority::FILTER, false));
		manager.add_handler(make("root", priority::CRITICAL, false));
		manager.add_handler(make("filter-b", priority::FILTER, false));
		manager.add_handler(make("never", priority::DEFAULT, true));

		assert!(manager.handle(&SyncEvent::full_sync()).await.unwrap());
		assert_eq!(*log.lock().unwrap(), vec!["root", "filter-a", "filter-b", "sync"]);
		assert_eq!(manager.handler_count(), 5);
	}

	#[tokio::test]
	async fn test_unhandled_event() {
		let manager = SyncEventManager::new();
		assert!(!manager.handle(&SyncEvent::full_sync()).await.unwrap());
	}
}

// vim: ts=4
