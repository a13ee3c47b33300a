//! Solvers for objects changed on both sides

use async_trait::async_trait;

use super::conflict;
use super::local::{push_local_move, LocalAdded};
use super::remote::{follow_remote_move, RemoteAdded, RemoteChanged};
use super::{file_name, redirect, SolveResult, Solver, SolverContext};
use crate::error::{InteractionNeeded, SolveError};
use crate::events::{MetaDataChangeType, ObjectEvent};
use crate::logging::*;
use crate::strategies::ConflictResolution;
use crate::transmission::TransferResult;

/// Same name created on both sides
#[derive(Debug, Default)]
pub struct BothAdded;

#[async_trait]
impl Solver for BothAdded {
	fn name(&self) -> &str {
		"BothAdded"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let id = event
			.remote_id()
			.ok_or_else(|| SolveError::fatal(format!("BothAdded without a remote object: {}", event)))?;
		let remote = match ctx.fetch(id).await? {
			Some(remote) => remote,
			None => return LocalAdded.solve(ctx, &redirect(event, event.local_path.clone(), None)).await,
		};
		if ctx.storage.get_object_by_remote_id(&remote.id)?.is_some() {
			debug!("Remote object {} is already synchronized", remote.id);
			return Ok(());
		}
		let path = match &event.local_path {
			Some(path) => path.clone(),
			None => ctx.local_target(&remote)?,
		};
		let info = match ctx.fs.info(&path)? {
			Some(info) => info,
			None => return RemoteAdded.solve(ctx, &redirect(event, None, Some(remote))).await,
		};

		match (info.is_dir, remote.is_folder()) {
			(true, true) => {
				ctx.storage.save_mapped_object(&ctx.snapshot(&remote, &path, None)?)?;
				debug!("Matched folder {} with {}", path.display(), remote.id);
				Ok(())
			}
			(false, false) => {
				let (checksum, size) = ctx.fs.checksum(&path)?;
				if remote.content_hash.as_deref() == Some(checksum.as_str())
					&& remote.content_length == Some(size)
				{
					let content = TransferResult { checksum, size, remote: None };
					ctx.storage.save_mapped_object(&ctx.snapshot(&remote, &path, Some(&content))?)?;
					debug!("Matched identical file {} with {}", path.display(), remote.id);
					return Ok(());
				}
				conflict::resolve(ctx, &path, &remote).await
			}
			_ => Err(SolveError::InteractionNeeded(
				InteractionNeeded::new(
					"Type conflict",
					format!("'{}' is a file on one side and a folder on the other", path.display()),
				)
				.with_path(&path)
				.with_remote_id(&remote.id),
			)),
		}
	}
}

/// Removed on both sides
#[derive(Debug, Default)]
pub struct BothDeleted;

#[async_trait]
impl Solver for BothDeleted {
	fn name(&self) -> &str {
		"BothDeleted"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		if let Some(mapped) = ctx.mapping_for(event)? {
			ctx.storage.remove_object(&mapped)?;
			debug!("Forgot {} deleted on both sides", mapped.remote_object_id);
		}
		Ok(())
	}
}

/// Content changed on both sides
///
/// Identical content, or a change that turns out to be one-sided, is
/// merged silently. A real conflict goes through the configured policy.
#[derive(Debug, Default)]
pub struct BothChanged;

#[async_trait]
impl Solver for BothChanged {
	fn name(&self) -> &str {
		"BothChanged"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let mapped = match ctx.mapping_for(event)? {
			Some(mapped) => mapped,
			None => return BothAdded.solve(ctx, event).await,
		};
		let remote = match ctx.fetch(&mapped.remote_object_id).await? {
			Some(remote) => remote,
			None => return LocalChangedRemoteDeleted.solve(ctx, event).await,
		};
		let path = ctx.local_path(&mapped)?;
		if mapped.is_folder() || !ctx.fs.exists(&path) {
			return RemoteChanged.solve(ctx, &redirect(event, Some(path), Some(remote))).await;
		}

		let (checksum, size) = ctx.fs.checksum(&path)?;
		if remote.content_hash.as_deref() == Some(checksum.as_str()) && remote.content_length == Some(size) {
			let content = TransferResult { checksum, size, remote: None };
			ctx.storage.save_mapped_object(&ctx.snapshot(&remote, &path, Some(&content))?)?;
			debug!("Both sides of {} hold the same content", path.display());
			return Ok(());
		}
		if !ctx.remote_content_changed(&remote, &mapped) {
			ctx.upload_and_save(&path, remote).await?;
			return Ok(());
		}
		if !ctx.local_content_changed(&path, &mapped)? {
			ctx.download_and_save(&remote, &path).await?;
			return Ok(());
		}
		conflict::resolve(ctx, &path, &remote).await
	}
}

async fn both_moved(ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
	let path = event
		.local_path
		.clone()
		.ok_or_else(|| SolveError::fatal(format!("Move without a local path: {}", event)))?;
	let mapped = match ctx.mapping_for(event)? {
		Some(mapped) => mapped,
		None => return LocalAdded.solve(ctx, event).await,
	};
	let remote = match ctx.fetch(&mapped.remote_object_id).await? {
		Some(remote) => remote,
		None => return LocalMovedRemoteDeleted.solve(ctx, event).await,
	};

	let parent = ctx.local_parent(&path)?;
	let same_place = remote.parent_id.as_deref() == Some(parent.remote_object_id.as_str())
		&& remote.name == file_name(&path)?;
	if same_place {
		debug!("{} was moved to the same place on both sides", path.display());
		return follow_remote_move(ctx, event, mapped, remote, path).await;
	}
	match ctx.conflict_resolution {
		ConflictResolution::PreferLocal => push_local_move(ctx, event).await,
		ConflictResolution::Ask => Err(SolveError::InteractionNeeded(
			InteractionNeeded::new(
				"Conflicting moves",
				format!("'{}' was moved to different places locally and on the server", path.display()),
			)
			.with_path(&path)
			.with_remote_id(&remote.id),
		)),
		_ => follow_remote_move(ctx, event, mapped, remote, path).await,
	}
}

/// Moved on both sides
#[derive(Debug, Default)]
pub struct BothMoved;

#[async_trait]
impl Solver for BothMoved {
	fn name(&self) -> &str {
		"BothMoved"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		both_moved(ctx, event).await
	}
}

/// Renamed on both sides
#[derive(Debug, Default)]
pub struct BothRenamed;

#[async_trait]
impl Solver for BothRenamed {
	fn name(&self) -> &str {
		"BothRenamed"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		both_moved(ctx, event).await
	}
}

/// Bring back a locally deleted object that changed on the server
async fn restore_from_remote(ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
	let mapped = ctx.mapping_for(event)?;
	let id = match (event.remote_id(), &mapped) {
		(Some(id), _) => id.to_string(),
		(None, Some(mapped)) => mapped.remote_object_id.clone(),
		(None, None) => return Ok(()),
	};
	if let Some(mapped) = &mapped {
		ctx.storage.remove_object(mapped)?;
	}
	let remote = match ctx.fetch(&id).await? {
		Some(remote) => remote,
		None => return Ok(()),
	};
	let is_folder = remote.is_folder();
	info!("Restoring {} changed on the server after a local deletion", remote.name);
	RemoteAdded.solve(ctx, &redirect(event, None, Some(remote))).await?;
	if is_folder {
		ctx.request_full_sync();
	}
	Ok(())
}

/// Deleted locally, changed remotely: the remote version comes back
#[derive(Debug, Default)]
pub struct LocalDeletedRemoteChanged;

#[async_trait]
impl Solver for LocalDeletedRemoteChanged {
	fn name(&self) -> &str {
		"LocalDeletedRemoteChanged"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		restore_from_remote(ctx, event).await
	}
}

/// Deleted locally, moved or renamed remotely: the remote version comes back
#[derive(Debug, Default)]
pub struct LocalDeletedRemoteMoved;

#[async_trait]
impl Solver for LocalDeletedRemoteMoved {
	fn name(&self) -> &str {
		"LocalDeletedRemoteMoved"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		restore_from_remote(ctx, event).await
	}
}

/// Upload again a local object whose remote counterpart was deleted
async fn upload_again(ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
	let mapped = ctx.mapping_for(event)?;
	let path = match (&event.local_path, &mapped) {
		(Some(path), _) => Some(path.clone()),
		(None, Some(mapped)) => ctx.storage.get_local_path(mapped)?,
		(None, None) => None,
	};
	if let Some(mapped) = &mapped {
		ctx.storage.remove_object(mapped)?;
	}
	let path = match path {
		Some(path) => path,
		None => return Ok(()),
	};
	let info = match ctx.fs.info(&path)? {
		Some(info) => info,
		None => return Ok(()),
	};
	info!("Uploading {} again, it was deleted on the server", path.display());
	let added = if info.is_dir {
		ObjectEvent::folder(Some(path), None)
	} else {
		ObjectEvent::file(Some(path), None)
	}
	.with_local(MetaDataChangeType::Created);
	LocalAdded.solve(ctx, &added).await?;
	if info.is_dir {
		ctx.request_full_sync();
	}
	Ok(())
}

/// Changed locally, deleted remotely: the local version is uploaded again
#[derive(Debug, Default)]
pub struct LocalChangedRemoteDeleted;

#[async_trait]
impl Solver for LocalChangedRemoteDeleted {
	fn name(&self) -> &str {
		"LocalChangedRemoteDeleted"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		upload_again(ctx, event).await
	}
}

/// Moved or renamed locally, deleted remotely: the local version is uploaded again
#[derive(Debug, Default)]
pub struct LocalMovedRemoteDeleted;

#[async_trait]
impl Solver for LocalMovedRemoteDeleted {
	fn name(&self) -> &str {
		"LocalMovedRemoteDeleted"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		upload_again(ctx, event).await
	}
}


// vim: ts=4
