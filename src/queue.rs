//! Sync event queue
//!
//! Any number of producers (watcher, change log poller, crawler, the
//! dispatcher itself when it requeues) add events through a [`QueueHandle`];
//! a single consumer drains them in order and hands each one to the
//! [`SyncEventManager`]. One event is completely processed before the next
//! one is taken.
//!
//! Retries are deferred: they wait for the next round (the next [`drain`]
//! call, or the next sync request while [`run`]ning) so a pass never
//! processes its own retries again.
//!
//! [`drain`]: SyncEventQueue::drain
//! [`run`]: SyncEventQueue::run

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use crate::callbacks::SyncListener;
use crate::events::SyncEvent;
use crate::logging::*;
use crate::manager::SyncEventManager;

/// Something events can be added to
pub trait EventSink: Send + Sync {
	fn add_event(&self, event: SyncEvent);

	/// Add an event for the next round instead of the current one
	fn defer(&self, event: SyncEvent) {
		self.add_event(event);
	}
}

/// Cloneable producer side of a [`SyncEventQueue`]
#[derive(Debug, Clone)]
pub struct QueueHandle {
	tx: mpsc::UnboundedSender<SyncEvent>,
	deferred_tx: mpsc::UnboundedSender<SyncEvent>,
}

impl EventSink for QueueHandle {
	fn add_event(&self, event: SyncEvent) {
		trace!("Queueing {}", event);
		if self.tx.send(event).is_err() {
			warn!("Event queue is closed, dropping event");
		}
	}

	fn defer(&self, event: SyncEvent) {
		trace!("Deferring {}", event);
		if self.deferred_tx.send(event).is_err() {
			warn!("Event queue is closed, dropping event");
		}
	}
}

/// Ordered single-consumer event queue
pub struct SyncEventQueue {
	tx: mpsc::UnboundedSender<SyncEvent>,
	rx: mpsc::UnboundedReceiver<SyncEvent>,
	deferred_tx: mpsc::UnboundedSender<SyncEvent>,
	deferred_rx: mpsc::UnboundedReceiver<SyncEvent>,
}

impl SyncEventQueue {
	pub fn new() -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let (deferred_tx, deferred_rx) = mpsc::unbounded_channel();
		SyncEventQueue { tx, rx, deferred_tx, deferred_rx }
	}

	/// New producer handle
	pub fn handle(&self) -> QueueHandle {
		QueueHandle { tx: self.tx.clone(), deferred_tx: self.deferred_tx.clone() }
	}

	/// Number of events waiting for the next round
	pub fn deferred_len(&self) -> usize {
		self.deferred_rx.len()
	}

	/// Move the deferred events behind the pending ones
	fn release_deferred(&mut self) {
		let mut released = 0;
		while let Ok(event) = self.deferred_rx.try_recv() {
			if self.tx.send(event).is_err() {
				break;
			}
			released += 1;
		}
		if released > 0 {
			debug!("Released {} deferred events", released);
		}
	}

	/// Take the next event without waiting
	pub fn try_next(&mut self) -> Option<SyncEvent> {
		self.rx.try_recv().ok()
	}

	/// Whether no event is waiting
	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}

	async fn dispatch(manager: &SyncEventManager, listener: &dyn SyncListener, event: SyncEvent) {
		match manager.handle(&event).await {
			Ok(true) => {}
			Ok(false) => debug!("No handler took {}", event),
			Err(e) => {
				error!("Handling {} failed: {}", event, e);
				listener.on_error(&e);
			}
		}
	}

	/// Process events until the queue is empty, returns the number processed
	///
	/// Events deferred by earlier passes are released first. Events added
	/// while draining are processed too, deferred ones wait for the next pass.
	pub async fn drain(&mut self, manager: &SyncEventManager, listener: &dyn SyncListener) -> usize {
		self.release_deferred();
		let mut count = 0;
		while let Some(event) = self.try_next() {
			Self::dispatch(manager, listener, event).await;
			count += 1;
		}
		count
	}

	/// Process events until `shutdown` turns true
	///
	/// Handler failures are logged and reported to the listener; the queue
	/// keeps running. Deferred events are released by every sync request.
	pub async fn run(
		mut self,
		manager: Arc<SyncEventManager>,
		listener: Arc<dyn SyncListener>,
		mut shutdown: watch::Receiver<bool>,
	) {
		info!("Event queue started");
		loop {
			if *shutdown.borrow() {
				break;
			}
			tokio::select! {
				changed = shutdown.changed() => {
					if changed.is_err() {
						break;
					}
				}
				event = self.rx.recv() => {
					match event {
						Some(event) => {
							if matches!(event, SyncEvent::StartNextSync(_)) {
								self.release_deferred();
							}
							Self::dispatch(&manager, listener.as_ref(), event).await;
						}
						None => break,
					}
				}
			}
		}
		info!("Event queue stopped");
	}
}

impl Default for SyncEventQueue {
	fn default() -> Self {
		Self::new()
	}
}

/// Sink that keeps every event, for inspection
#[derive(Debug, Default)]
pub struct EventCollector {
	events: Mutex<Vec<SyncEvent>>,
}

impl EventCollector {
	pub fn new() -> Self {
		Self::default()
	}

	/// Remove and return everything collected so far
	pub fn take(&self) -> Vec<SyncEvent> {
		std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
	}

	pub fn len(&self) -> usize {
		self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl EventSink for EventCollector {
	fn add_event(&self, event: SyncEvent) {
		self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::NoListener;
	use crate::error::SyncError;
	use crate::manager::SyncEventHandler;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Counter {
		seen: AtomicUsize,
		requeue: Option<QueueHandle>,
	}

	#[async_trait]
	impl SyncEventHandler for Counter {
		fn priority(&self) -> i32 {
			0
		}

		async fn handle(&self, _event: &SyncEvent) -> Result<bool, SyncError> {
			let n = self.seen.fetch_add(1, Ordering::SeqCst);
			if n == 0 {
				if let Some(queue) = &self.requeue {
					queue.add_event(SyncEvent::incremental_sync());
				}
			}
			Ok(true)
		}
	}

	#[tokio::test]
	async fn test_drain_processes_requeued_events() {
		let mut queue = SyncEventQueue::new();
		let counter = Arc::new(Counter { seen: AtomicUsize::new(0), requeue: Some(queue.handle()) });
		let mut manager = SyncEventManager::new();
		manager.add_handler(counter.clone());

		queue.handle().add_event(SyncEvent::full_sync());
		assert_eq!(queue.drain(&manager, &NoListener).await, 2);
		assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
		assert!(queue.is_empty());
	}

	/// Defers every event it sees, like a retry whose precondition never holds
	struct Stubborn {
		seen: AtomicUsize,
		queue: QueueHandle,
	}

	#[async_trait]
	impl SyncEventHandler for Stubborn {
		fn priority(&self) -> i32 {
			0
		}

		async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
			self.seen.fetch_add(1, Ordering::SeqCst);
			self.queue.defer(event.clone());
			Ok(true)
		}
	}

	#[tokio::test]
	async fn test_deferred_events_wait_for_next_pass() {
		let mut queue = SyncEventQueue::new();
		let stubborn = Arc::new(Stubborn { seen: AtomicUsize::new(0), queue: queue.handle() });
		let mut manager = SyncEventManager::new();
		manager.add_handler(stubborn.clone());

		queue.handle().add_event(SyncEvent::incremental_sync());
		for pass in 1..=3 {
			let processed = tokio::time::timeout(
				std::time::Duration::from_secs(5),
				queue.drain(&manager, &NoListener),
			)
			.await
			.unwrap();
			assert_eq!(processed, 1);
			assert_eq!(stubborn.seen.load(Ordering::SeqCst), pass);
			assert_eq!(queue.deferred_len(), 1);
			assert!(queue.is_empty());
		}
	}

	#[tokio::test]
	async fn test_run_releases_deferred_on_sync_request() {
		let queue = SyncEventQueue::new();
		let handle = queue.handle();
		let counter = Arc::new(Counter { seen: AtomicUsize::new(0), requeue: None });
		let mut manager = SyncEventManager::new();
		manager.add_handler(counter.clone());

		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let task = tokio::spawn(queue.run(Arc::new(manager), Arc::new(NoListener), shutdown_rx));
		handle.defer(SyncEvent::full_sync());
		handle.add_event(SyncEvent::incremental_sync());
		for _ in 0..100 {
			if counter.seen.load(Ordering::SeqCst) == 2 {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}
		shutdown_tx.send(true).unwrap();
		task.await.unwrap();
		assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn test_run_stops_on_shutdown() {
		let queue = SyncEventQueue::new();
		let handle = queue.handle();
		let counter = Arc::new(Counter { seen: AtomicUsize::new(0), requeue: None });
		let mut manager = SyncEventManager::new();
		manager.add_handler(counter.clone());

		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let task = tokio::spawn(queue.run(Arc::new(manager), Arc::new(NoListener), shutdown_rx));
		handle.add_event(SyncEvent::full_sync());
		for _ in 0..100 {
			if counter.seen.load(Ordering::SeqCst) == 1 {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
		}
		shutdown_tx.send(true).unwrap();
		task.await.unwrap();
		assert_eq!(counter.seen.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_collector() {
		let collector = EventCollector::new();
		collector.add_event(SyncEvent::full_sync());
		assert_eq!(collector.len(), 1);
		assert_eq!(collector.take(), vec![SyncEvent::full_sync()]);
		assert!(collector.is_empty());
	}
}

// vim: ts=4
