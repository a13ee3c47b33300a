//! Listener traits for activity reporting and event notifications

use crate::error::{InteractionNeeded, SyncError};
use crate::events::SyncEvent;
use crate::transmission::TransmissionStatus;
use std::sync::Arc;

// Type aliases to reduce complexity
type ActivityFn = dyn Fn(bool) + Send + Sync;
type IgnoredFn = dyn Fn(&SyncEvent, &str) + Send + Sync;
type RootFn = dyn Fn(bool) + Send + Sync;
type InteractionFn = dyn Fn(&InteractionNeeded) + Send + Sync;
type ErrorFn = dyn Fn(&SyncError) + Send + Sync;
type TransmissionFn = dyn Fn(&TransmissionStatus) + Send + Sync;

/// Observer of the synchronization engine
///
/// All methods default to doing nothing.
pub trait SyncListener: Send + Sync {
	/// A solver starts working
	fn on_activity_started(&self) {}

	/// A solver finished, successfully or not
	fn on_activity_stopped(&self) {}

	/// A filter absorbed an event
	fn on_ignored(&self, _event: &SyncEvent, _reason: &str) {}

	/// The local sync root appeared or disappeared
	fn on_root_availability(&self, _available: bool) {}

	/// A problem needs a human decision
	fn on_interaction_needed(&self, _interaction: &InteractionNeeded) {}

	/// A handler failed; the queue keeps running
	fn on_error(&self, _error: &SyncError) {}

	/// A content transfer changed state or made progress
	fn on_transmission(&self, _status: &TransmissionStatus) {}
}

/// Listener that does nothing
pub struct NoListener;

impl SyncListener for NoListener {}

/// Builder for listeners using function closures
pub struct ListenerBuilder {
	activity: Option<Box<ActivityFn>>,
	ignored: Option<Box<IgnoredFn>>,
	root: Option<Box<RootFn>>,
	interaction: Option<Box<InteractionFn>>,
	error: Option<Box<ErrorFn>>,
	transmission: Option<Box<TransmissionFn>>,
}

impl ListenerBuilder {
	/// Create a new listener builder
	pub fn new() -> Self {
		ListenerBuilder {
			activity: None,
			ignored: None,
			root: None,
			interaction: None,
			error: None,
			transmission: None,
		}
	}

	/// Set activity callback, called with `true` on start and `false` on stop
	pub fn on_activity<F>(mut self, callback: F) -> Self
	where
		F: Fn(bool) + Send + Sync + 'static,
	{
		self.activity = Some(Box::new(callback));
		self
	}

	/// Set ignored event callback
	pub fn on_ignored<F>(mut self, callback: F) -> Self
	where
		F: Fn(&SyncEvent, &str) + Send + Sync + 'static,
	{
		self.ignored = Some(Box::new(callback));
		self
	}

	/// Set root availability callback
	pub fn on_root_availability<F>(mut self, callback: F) -> Self
	where
		F: Fn(bool) + Send + Sync + 'static,
	{
		self.root = Some(Box::new(callback));
		self
	}

	/// Set interaction needed callback
	pub fn on_interaction_needed<F>(mut self, callback: F) -> Self
	where
		F: Fn(&InteractionNeeded) + Send + Sync + 'static,
	{
		self.interaction = Some(Box::new(callback));
		self
	}

	/// Set error callback
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&SyncError) + Send + Sync + 'static,
	{
		self.error = Some(Box::new(callback));
		self
	}

	/// Set transmission callback
	pub fn on_transmission<F>(mut self, callback: F) -> Self
	where
		F: Fn(&TransmissionStatus) + Send + Sync + 'static,
	{
		self.transmission = Some(Box::new(callback));
		self
	}

	/// Build the listener
	pub fn build(self) -> Arc<dyn SyncListener> {
		Arc::new(CompositeListener {
			activity: self.activity,
			ignored: self.ignored,
			root: self.root,
			interaction: self.interaction,
			error: self.error,
			transmission: self.transmission,
		})
	}
}

impl Default for ListenerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Internal composite listener implementation
struct CompositeListener {
	activity: Option<Box<ActivityFn>>,
	ignored: Option<Box<IgnoredFn>>,
	root: Option<Box<RootFn>>,
	interaction: Option<Box<InteractionFn>>,
	error: Option<Box<ErrorFn>>,
	transmission: Option<Box<TransmissionFn>>,
}

impl SyncListener for CompositeListener {
	fn on_activity_started(&self) {
		if let Some(ref callback) = self.activity {
			callback(true);
		}
	}

	fn on_activity_stopped(&self) {
		if let Some(ref callback) = self.activity {
			callback(false);
		}
	}

	fn on_ignored(&self, event: &SyncEvent, reason: &str) {
		if let Some(ref callback) = self.ignored {
			callback(event, reason);
		}
	}

	fn on_root_availability(&self, available: bool) {
		if let Some(ref callback) = self.root {
			callback(available);
		}
	}

	fn on_interaction_needed(&self, interaction: &InteractionNeeded) {
		if let Some(ref callback) = self.interaction {
			callback(interaction);
		}
	}

	fn on_error(&self, error: &SyncError) {
		if let Some(ref callback) = self.error {
			callback(error);
		}
	}

	fn on_transmission(&self, status: &TransmissionStatus) {
		if let Some(ref callback) = self.transmission {
			callback(status);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	#[test]
	fn test_builder_forwards_to_closures() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let activity = seen.clone();
		let ignored = seen.clone();
		let listener = ListenerBuilder::new()
			.on_activity(move |started| activity.lock().unwrap().push(format!("activity {}", started)))
			.on_ignored(move |_, reason| ignored.lock().unwrap().push(reason.to_string()))
			.build();

		listener.on_activity_started();
		listener.on_ignored(&SyncEvent::full_sync(), "because");
		listener.on_activity_stopped();
		// Unset callbacks are no-ops
		listener.on_root_availability(false);

		assert_eq!(
			*seen.lock().unwrap(),
			vec!["activity true".to_string(), "because".to_string(), "activity false".to_string()]
		);
	}
}

// vim: ts=4
