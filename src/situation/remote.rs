//! Remote side situation detection

use super::{Detection, SituationDetection, SituationType};
use crate::error::StorageError;
use crate::events::{MetaDataChangeType, ObjectEvent};
use crate::remote::RemoteObject;
use crate::storage::{MappedObject, MetaDataStorage};

/// Detects remote situations from the event's `remote` change and the stored change token
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteSituationDetection;

impl RemoteSituationDetection {
	pub fn new() -> Self {
		RemoteSituationDetection
	}

	/// Compare name and parent of a changed object with the stored record
	fn classify_change(remote: &RemoteObject, stored: &MappedObject) -> SituationType {
		let same_name = remote.name == stored.name;
		let same_parent = remote.parent_id == stored.parent_id;
		match (same_name, same_parent) {
			(true, true) => SituationType::Changed,
			(false, true) => SituationType::Renamed,
			(_, false) => SituationType::Moved,
		}
	}
}

impl SituationDetection for RemoteSituationDetection {
	fn analyse(
		&self,
		storage: &dyn MetaDataStorage,
		event: &ObjectEvent,
	) -> Result<Detection, StorageError> {
		let remote = event.remote_object.as_ref();
		let stored = match remote {
			Some(remote) => storage.get_object_by_remote_id(&remote.id)?,
			None => None,
		};

		let detection = match event.remote {
			MetaDataChangeType::None => match (remote, stored) {
				(Some(remote), Some(stored)) if remote.change_token != stored.last_change_token => {
					Detection::revised(
						Self::classify_change(remote, &stored),
						MetaDataChangeType::Changed,
					)
				}
				_ => Detection::new(SituationType::NoChange),
			},
			MetaDataChangeType::Created => Detection::new(SituationType::Added),
			MetaDataChangeType::Deleted => Detection::new(SituationType::Removed),
			MetaDataChangeType::Moved => match stored {
				Some(_) => Detection::new(SituationType::Moved),
				None => Detection::new(SituationType::Added),
			},
			MetaDataChangeType::Changed => match (remote, stored) {
				(Some(remote), Some(stored)) => Detection::new(Self::classify_change(remote, &stored)),
				// Nothing to compare against, so it is new to us
				_ => Detection::new(SituationType::Added),
			},
		};
		Ok(detection)
	}
}


// vim: ts=4
