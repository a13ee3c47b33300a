//! Conflict copies and the conflict policy

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::{file_name, SolveResult, SolverContext};
use crate::error::{InteractionNeeded, SolveError};
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::remote::RemoteObject;
use crate::strategies::ConflictResolution;

/// Name of the copy that keeps the local version of a conflicting file
///
/// `report.txt` becomes `report (conflict copy 20261017-093000).txt`.
/// A leading dot does not start an extension.
pub fn conflict_copy_name(name: &str, suffix: &str, time: DateTime<Utc>) -> String {
	let (stem, ext) = match name.rfind('.') {
		Some(i) if i > 0 => name.split_at(i),
		_ => (name, ""),
	};
	format!("{} ({} {}){}", stem, suffix, time.format("%Y%m%d-%H%M%S"), ext)
}

/// Free sibling path for the conflict copy of `path`
pub(crate) fn conflict_copy_path(
	fs: &LocalFileSystem,
	path: &Path,
	suffix: &str,
	time: DateTime<Utc>,
) -> Result<PathBuf, SolveError> {
	let name = file_name(path)?;
	let mut candidate = path.with_file_name(conflict_copy_name(name, suffix, time));
	let mut n = 2;
	while fs.exists(&candidate) {
		candidate = path.with_file_name(conflict_copy_name(name, &format!("{} {}", suffix, n), time));
		n += 1;
	}
	Ok(candidate)
}

/// Apply the configured policy to a file changed on both sides
///
/// Callers have already ruled out identical content.
pub(crate) async fn resolve(ctx: &SolverContext, path: &Path, remote: &RemoteObject) -> SolveResult {
	match ctx.conflict_resolution {
		ConflictResolution::Ask => Err(SolveError::InteractionNeeded(
			InteractionNeeded::new(
				"Conflicting changes",
				format!("'{}' was changed locally and on the server", path.display()),
			)
			.with_path(path)
			.with_remote_id(&remote.id),
		)),
		ConflictResolution::PreferLocal => {
			info!("Conflict on {}: keeping the local version", path.display());
			ctx.upload_and_save(path, remote.clone()).await.map(|_| ())
		}
		ConflictResolution::PreferRemote => {
			info!("Conflict on {}: keeping the remote version", path.display());
			ctx.download_and_save(remote, path).await.map(|_| ())
		}
		ConflictResolution::PreferNewest => {
			let local_time = ctx.fs.info(path)?.and_then(|i| i.last_write_time_utc);
			let local_is_newer = match (local_time, remote.last_modification_date) {
				(Some(local), Some(remote)) => local > remote,
				(_, None) => true,
				(None, Some(_)) => false,
			};
			info!(
				"Conflict on {}: keeping the newer {} version",
				path.display(),
				if local_is_newer { "local" } else { "remote" }
			);
			if local_is_newer {
				ctx.upload_and_save(path, remote.clone()).await.map(|_| ())
			} else {
				ctx.download_and_save(remote, path).await.map(|_| ())
			}
		}
		ConflictResolution::KeepBoth => keep_both(ctx, path, remote).await,
	}
}

/// Move the local version aside, fetch the remote one and upload the copy
async fn keep_both(ctx: &SolverContext, path: &Path, remote: &RemoteObject) -> SolveResult {
	let copy = conflict_copy_path(&ctx.fs, path, &ctx.conflict_suffix, Utc::now())?;
	ctx.fs.rename(path, &copy)?;
	info!("Conflict on {}: local version kept as {}", path.display(), copy.display());

	if let Err(e) = ctx.download_and_save(remote, path).await {
		if let Err(undo) = ctx.fs.rename(&copy, path) {
			warn!("Cannot move {} back: {}", copy.display(), undo);
		}
		return Err(e);
	}

	let parent = ctx.local_parent(&copy)?;
	let document = ctx.repo.create_document(&parent.remote_object_id, file_name(&copy)?, None).await?;
	ctx.upload_and_save(&copy, document).await?;
	Ok(())
}


// vim: ts=4
