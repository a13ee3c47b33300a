//! Situation detection
//!
//! Classifies what happened to an object on one side by comparing the
//! observed state with the stored [`MappedObject`](crate::storage::MappedObject).
//! Detection never modifies the event; when the remote side turns out to
//! have changed although the event did not say so, the revised change
//! type is returned in [`Detection::revised_change`] and applied by the
//! dispatcher.

use std::fmt;

use crate::error::StorageError;
use crate::events::{MetaDataChangeType, ObjectEvent};
use crate::storage::MetaDataStorage;

mod local;
mod remote;

pub use local::LocalSituationDetection;
pub(crate) use local::mapped_object_for_path;
pub use remote::RemoteSituationDetection;

/// Classified nature of a change on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SituationType {
	NoChange,
	Added,
	Removed,
	Changed,
	Moved,
	Renamed,
}

impl SituationType {
	/// Every situation, in a fixed order
	pub const ALL: [SituationType; 6] = [
		SituationType::NoChange,
		SituationType::Added,
		SituationType::Removed,
		SituationType::Changed,
		SituationType::Moved,
		SituationType::Renamed,
	];
}

impl fmt::Display for SituationType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SituationType::NoChange => "NOCHANGE",
			SituationType::Added => "ADDED",
			SituationType::Removed => "REMOVED",
			SituationType::Changed => "CHANGED",
			SituationType::Moved => "MOVED",
			SituationType::Renamed => "RENAMED",
		};
		f.write_str(name)
	}
}

/// Result of a detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
	pub situation: SituationType,
	/// Corrected change type for the analysed side, if the event was wrong
	pub revised_change: Option<MetaDataChangeType>,
}

impl Detection {
	pub fn new(situation: SituationType) -> Self {
		Detection { situation, revised_change: None }
	}

	pub fn revised(situation: SituationType, change: MetaDataChangeType) -> Self {
		Detection { situation, revised_change: Some(change) }
	}
}

impl From<SituationType> for Detection {
	fn from(situation: SituationType) -> Self {
		Detection::new(situation)
	}
}

/// Classifies one side of an event
///
/// Implementations must be pure: the same storage state and event always
/// give the same detection.
pub trait SituationDetection: Send + Sync {
	fn analyse(
		&self,
		storage: &dyn MetaDataStorage,
		event: &ObjectEvent,
	) -> Result<Detection, StorageError>;
}

// vim: ts=4
