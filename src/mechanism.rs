//! Situation detection and solver dispatch
//!
//! [`SyncMechanism`] is the last handler an object event reaches. It asks
//! both detectors what happened, picks the solver of that situation pair
//! and turns the solver outcome into queue operations: retries are
//! requeued, problems needing a human become [`InteractionNeededEvent`]s.

use async_trait::async_trait;
use std::sync::Arc;

use crate::callbacks::SyncListener;
use crate::error::{InteractionNeeded, SolveError, SyncError};
use crate::events::{InteractionNeededEvent, ObjectEvent, SyncEvent};
use crate::logging::*;
use crate::manager::{priority, SyncEventHandler};
use crate::queue::EventSink;
use crate::situation::{Detection, SituationDetection};
use crate::solver::{SolverContext, SolverMatrix};

/// Dispatcher of object events to solvers
pub struct SyncMechanism {
	local_detection: Arc<dyn SituationDetection>,
	remote_detection: Arc<dyn SituationDetection>,
	matrix: SolverMatrix,
	ctx: Arc<SolverContext>,
	queue: Arc<dyn EventSink>,
	listener: Arc<dyn SyncListener>,
	max_retries: Option<u32>,
}

impl SyncMechanism {
	pub fn new(
		local_detection: Arc<dyn SituationDetection>,
		remote_detection: Arc<dyn SituationDetection>,
		matrix: SolverMatrix,
		ctx: Arc<SolverContext>,
		listener: Arc<dyn SyncListener>,
	) -> Self {
		let queue = ctx.queue.clone();
		SyncMechanism {
			local_detection,
			remote_detection,
			matrix,
			ctx,
			queue,
			listener,
			max_retries: None,
		}
	}

	/// Escalate an event to the user once it has been retried `max` times
	pub fn with_max_retries(mut self, max: Option<u32>) -> Self {
		self.max_retries = max;
		self
	}

	/// Event as seen by the solvers, with detection corrections applied
	fn revised(event: &ObjectEvent, local: &Detection, remote: &Detection) -> ObjectEvent {
		let mut revised = event.clone();
		if let Some(change) = local.revised_change {
			revised.local = change;
		}
		if let Some(change) = remote.revised_change {
			revised.remote = change;
		}
		revised
	}

	fn request_interaction(&self, interaction: InteractionNeeded, source: &ObjectEvent) {
		warn!("{} needs interaction: {}", source, interaction);
		self.queue.add_event(SyncEvent::InteractionNeeded(InteractionNeededEvent {
			interaction,
			source: Some(Box::new(source.clone())),
		}));
	}

	fn retry(&self, event: &ObjectEvent, reason: String) {
		let attempts = event.retry_count + 1;
		if let Some(max) = self.max_retries {
			if attempts > max {
				let interaction = InteractionNeeded::new(
					"Synchronization keeps failing",
					format!("Gave up after {} attempts: {}", event.retry_count, reason),
				);
				let interaction = match &event.local_path {
					Some(path) => interaction.with_path(path),
					None => interaction,
				};
				let interaction = match event.remote_id() {
					Some(id) => interaction.with_remote_id(id),
					None => interaction,
				};
				self.request_interaction(interaction, event);
				return;
			}
		}
		debug!("Retrying {} ({}): {}", event, attempts, reason);
		let mut retry = event.clone();
		retry.retry_count = attempts;
		self.queue.defer(SyncEvent::Object(retry));
	}

	/// Run one object event through detection, the matrix and its solver
	pub async fn dispatch(&self, event: &ObjectEvent) -> Result<(), SyncError> {
		let storage = self.ctx.storage();
		let local = self.local_detection.analyse(storage, event)?;
		let remote = self.remote_detection.analyse(storage, event)?;
		debug!("{}: local {} remote {}", event, local.situation, remote.situation);

		let solver = match self.matrix.get(local.situation, remote.situation) {
			Some(solver) => solver.clone(),
			None => {
				error!(
					"No solver for local {} remote {}, requesting full sync",
					local.situation, remote.situation
				);
				self.queue.add_event(SyncEvent::full_sync());
				return Err(SyncError::SolverNotImplemented {
					local: local.situation,
					remote: remote.situation,
				});
			}
		};

		let revised = Self::revised(event, &local, &remote);
		self.listener.on_activity_started();
		let result = solver.solve(&self.ctx, &revised).await;
		self.listener.on_activity_stopped();

		match result {
			Ok(()) => {
				trace!("{} solved {}", solver.name(), event);
				Ok(())
			}
			Err(SolveError::Retry(reason)) => {
				self.retry(event, reason);
				Ok(())
			}
			Err(SolveError::InteractionNeeded(interaction)) => {
				self.request_interaction(interaction, event);
				Ok(())
			}
			Err(SolveError::Fatal(message)) => {
				error!("{} failed on {}: {}", solver.name(), event, message);
				Err(SyncError::SolverFailed { message: format!("{}: {}", solver.name(), message) })
			}
		}
	}
}

#[async_trait]
impl SyncEventHandler for SyncMechanism {
	fn priority(&self) -> i32 {
		priority::SYNCHRONIZER
	}

	fn name(&self) -> &str {
		"SyncMechanism"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match event {
			SyncEvent::Object(object) => {
				self.dispatch(object).await?;
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}

/// Hands interaction requests to the listener
pub struct InteractionReporter {
	listener: Arc<dyn SyncListener>,
}

impl InteractionReporter {
	pub fn new(listener: Arc<dyn SyncListener>) -> Self {
		InteractionReporter { listener }
	}
}

#[async_trait]
impl SyncEventHandler for InteractionReporter {
	fn priority(&self) -> i32 {
		priority::DEFAULT
	}

	fn name(&self) -> &str {
		"InteractionReporter"
	}

	async fn handle(&self, event: &SyncEvent) -> Result<bool, SyncError> {
		match event {
			SyncEvent::InteractionNeeded(e) => {
				self.listener.on_interaction_needed(&e.interaction);
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}


// vim: ts=4
