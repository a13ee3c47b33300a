//! Error types for cmissync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::situation::SituationType;

/// Main error type for the synchronization engine
#[derive(Debug)]
pub enum SyncError {
	/// Metadata storage failure
	Storage(StorageError),

	/// Remote repository failure
	Remote(RemoteError),

	/// I/O error
	Io(io::Error),

	/// Invalid configuration
	InvalidConfig { message: String },

	/// No solver is configured for the detected situation pair
	SolverNotImplemented { local: SituationType, remote: SituationType },

	/// A solver failed in a way that is neither retryable nor interactive
	SolverFailed { message: String },

	/// Operation aborted
	Aborted,

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Storage(e) => write!(f, "Storage error: {}", e),
			SyncError::Remote(e) => write!(f, "Remote error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::SolverNotImplemented { local, remote } => {
				write!(f, "No solver implemented for situation local={} remote={}", local, remote)
			}
			SyncError::SolverFailed { message } => write!(f, "Solver failed: {}", message),
			SyncError::Aborted => write!(f, "Operation aborted"),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<StorageError> for SyncError {
	fn from(e: StorageError) -> Self {
		SyncError::Storage(e)
	}
}

impl From<RemoteError> for SyncError {
	fn from(e: RemoteError) -> Self {
		SyncError::Remote(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

/// Metadata storage errors
#[derive(Debug)]
pub enum StorageError {
	/// Underlying database failure
	Database { message: String },

	/// Record could not be encoded or decoded
	Serialization { message: String },

	/// Another object is already stored with the same local identity
	DuplicateGuid { guid: String, existing_remote_id: String },

	/// Stored data is inconsistent
	Corrupted { message: String },

	/// A required record does not exist
	NotFound { what: String },
}

impl fmt::Display for StorageError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageError::Database { message } => write!(f, "Database error: {}", message),
			StorageError::Serialization { message } => {
				write!(f, "Serialization error: {}", message)
			}
			StorageError::DuplicateGuid { guid, existing_remote_id } => {
				write!(f, "Guid {} is already mapped to remote object {}", guid, existing_remote_id)
			}
			StorageError::Corrupted { message } => write!(f, "Storage corrupted: {}", message),
			StorageError::NotFound { what } => write!(f, "Not found in storage: {}", what),
		}
	}
}

impl Error for StorageError {}

macro_rules! storage_error_from {
	($($t:ty),* $(,)?) => {
		$(
			impl From<$t> for StorageError {
				fn from(e: $t) -> Self {
					StorageError::Database { message: e.to_string() }
				}
			}
		)*
	};
}

storage_error_from!(
	redb::Error,
	redb::DatabaseError,
	redb::TransactionError,
	redb::TableError,
	redb::StorageError,
	redb::CommitError,
);

impl From<json5::Error> for StorageError {
	fn from(e: json5::Error) -> Self {
		StorageError::Serialization { message: e.to_string() }
	}
}

impl From<std::str::Utf8Error> for StorageError {
	fn from(e: std::str::Utf8Error) -> Self {
		StorageError::Serialization { message: e.to_string() }
	}
}

/// Remote repository errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
	/// Object does not exist on the server
	NotFound { what: String },

	/// The user lacks the permission for the operation
	PermissionDenied { what: String },

	/// The object changed on the server since its change token was read
	UpdateConflict { id: String },

	/// An object with the same name already exists in the target folder
	NameConflict { name: String },

	/// The change log token is no longer valid
	InvalidChangeToken { token: String },

	/// Connection problem, usually transient
	Connection { message: String },

	/// Generic server error
	Other { message: String },
}

impl RemoteError {
	/// Whether retrying the same operation later may succeed
	pub fn is_transient(&self) -> bool {
		matches!(self, RemoteError::Connection { .. } | RemoteError::UpdateConflict { .. })
	}
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::NotFound { what } => write!(f, "Remote object not found: {}", what),
			RemoteError::PermissionDenied { what } => write!(f, "Permission denied: {}", what),
			RemoteError::UpdateConflict { id } => write!(f, "Update conflict on object {}", id),
			RemoteError::NameConflict { name } => {
				write!(f, "An object named '{}' already exists", name)
			}
			RemoteError::InvalidChangeToken { token } => {
				write!(f, "Change log token '{}' is not valid", token)
			}
			RemoteError::Connection { message } => write!(f, "Connection error: {}", message),
			RemoteError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for RemoteError {}

/// Details of a condition that needs a human decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionNeeded {
	/// Short description of the problem
	pub title: String,

	/// Longer, user-facing explanation
	pub description: String,

	/// Local paths affected by the problem
	pub affected_paths: Vec<PathBuf>,

	/// Remote object ids affected by the problem
	pub affected_remote_ids: Vec<String>,
}

impl InteractionNeeded {
	pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			title: title.into(),
			description: description.into(),
			affected_paths: Vec::new(),
			affected_remote_ids: Vec::new(),
		}
	}

	pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.affected_paths.push(path.into());
		self
	}

	pub fn with_remote_id(mut self, id: impl Into<String>) -> Self {
		self.affected_remote_ids.push(id.into());
		self
	}
}

impl fmt::Display for InteractionNeeded {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.title, self.description)
	}
}

/// Failure signal returned by solvers
///
/// `Ok(())` of a solver result is the success arm; this enum carries the
/// three ways a reconciliation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
	/// Transient failure, the event should be processed again later
	Retry(String),

	/// A human has to decide how to continue
	InteractionNeeded(InteractionNeeded),

	/// Unexpected failure
	Fatal(String),
}

impl SolveError {
	pub fn retry(reason: impl Into<String>) -> Self {
		SolveError::Retry(reason.into())
	}

	pub fn fatal(reason: impl Into<String>) -> Self {
		SolveError::Fatal(reason.into())
	}
}

impl fmt::Display for SolveError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SolveError::Retry(reason) => write!(f, "Retry needed: {}", reason),
			SolveError::InteractionNeeded(i) => write!(f, "Interaction needed: {}", i),
			SolveError::Fatal(reason) => write!(f, "Fatal: {}", reason),
		}
	}
}

impl Error for SolveError {}

impl From<RemoteError> for SolveError {
	fn from(e: RemoteError) -> Self {
		match e {
			RemoteError::Connection { .. } | RemoteError::UpdateConflict { .. } => {
				SolveError::Retry(e.to_string())
			}
			RemoteError::PermissionDenied { ref what } => SolveError::InteractionNeeded(
				InteractionNeeded::new("Permission denied", e.to_string()).with_remote_id(what),
			),
			RemoteError::NameConflict { ref name } => SolveError::InteractionNeeded(
				InteractionNeeded::new("Name conflict", e.to_string()).with_path(name),
			),
			_ => SolveError::Fatal(e.to_string()),
		}
	}
}

impl From<StorageError> for SolveError {
	fn from(e: StorageError) -> Self {
		SolveError::Fatal(e.to_string())
	}
}

impl From<io::Error> for SolveError {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::PermissionDenied => SolveError::InteractionNeeded(
				InteractionNeeded::new("Permission denied", e.to_string()),
			),
			io::ErrorKind::NotFound
			| io::ErrorKind::Interrupted
			| io::ErrorKind::WouldBlock
			| io::ErrorKind::TimedOut => SolveError::Retry(e.to_string()),
			_ => SolveError::Fatal(e.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transient_remote_errors_retry() {
		let e: SolveError = RemoteError::Connection { message: "reset".to_string() }.into();
		assert!(matches!(e, SolveError::Retry(_)));

		let e: SolveError = RemoteError::UpdateConflict { id: "1".to_string() }.into();
		assert!(matches!(e, SolveError::Retry(_)));
	}

	#[test]
	fn test_permission_denied_needs_interaction() {
		let e: SolveError = RemoteError::PermissionDenied { what: "doc-1".to_string() }.into();
		match e {
			SolveError::InteractionNeeded(i) => {
				assert_eq!(i.affected_remote_ids, vec!["doc-1".to_string()]);
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_unknown_remote_error_is_fatal() {
		let e: SolveError = RemoteError::Other { message: "boom".to_string() }.into();
		assert_eq!(e, SolveError::Fatal("boom".to_string()));
	}

	#[test]
	fn test_io_error_classification() {
		let e: SolveError = io::Error::new(io::ErrorKind::PermissionDenied, "no").into();
		assert!(matches!(e, SolveError::InteractionNeeded(_)));

		let e: SolveError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
		assert!(matches!(e, SolveError::Retry(_)));

		let e: SolveError = io::Error::other("disk on fire").into();
		assert!(matches!(e, SolveError::Fatal(_)));
	}

	#[test]
	fn test_missing_solver_display() {
		let e = SyncError::SolverNotImplemented {
			local: SituationType::Moved,
			remote: SituationType::Renamed,
		};
		assert!(e.to_string().contains("local=MOVED remote=RENAMED"));
	}
}

// vim: ts=4
