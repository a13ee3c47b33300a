//! Strategy enums used by the solvers
//!
//! Each enum includes a FromStr implementation for config parsing and a
//! Display implementation producing the canonical kebab-case name.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// CONFLICT RESOLUTION
// ============================================================================

/// Policy applied when both sides changed the content of the same file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
	/// Keep the remote version under the original name and the local one as a conflict copy (default)
	#[default]
	KeepBoth,

	/// Local version overwrites the remote one
	PreferLocal,

	/// Remote version overwrites the local one
	PreferRemote,

	/// Choose the newest modification time
	PreferNewest,

	/// Leave both sides untouched and ask the user
	Ask,
}

impl ConflictResolution {
	/// Whether this policy may overwrite content without keeping a copy
	pub fn overwrites(self) -> bool {
		matches!(self, Self::PreferLocal | Self::PreferRemote | Self::PreferNewest)
	}
}

impl FromStr for ConflictResolution {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"keep-both" | "both" | "copy" => Ok(Self::KeepBoth),
			"local" | "prefer-local" => Ok(Self::PreferLocal),
			"remote" | "prefer-remote" => Ok(Self::PreferRemote),
			"newest" | "prefer-newest" => Ok(Self::PreferNewest),
			"ask" | "interactive" => Ok(Self::Ask),
			_ => Err(format!(
				"Unknown conflict resolution: {}. Valid options: keep-both, prefer-local, \
				 prefer-remote, prefer-newest, ask",
				s
			)),
		}
	}
}

impl std::fmt::Display for ConflictResolution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::KeepBoth => write!(f, "keep-both"),
			Self::PreferLocal => write!(f, "prefer-local"),
			Self::PreferRemote => write!(f, "prefer-remote"),
			Self::PreferNewest => write!(f, "prefer-newest"),
			Self::Ask => write!(f, "ask"),
		}
	}
}


// vim: ts=4
