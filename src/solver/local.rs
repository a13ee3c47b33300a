//! Solvers for changes made on the local side only

use async_trait::async_trait;
use std::path::Path;

use super::{file_name, redirect, BothChanged, SolveResult, Solver, SolverContext};
use crate::error::{RemoteError, SolveError};
use crate::events::{MetaDataChangeType, ObjectEvent};
use crate::logging::*;
use crate::remote::RemoteObject;
use crate::storage::MappedObject;

fn local_path(event: &ObjectEvent) -> Result<&Path, SolveError> {
	event
		.local_path
		.as_deref()
		.ok_or_else(|| SolveError::fatal(format!("Local solver called without a local path: {}", event)))
}

/// Creates the remote counterpart of a new local file or folder
#[derive(Debug, Default)]
pub struct LocalAdded;

impl LocalAdded {
	async fn create_folder(
		&self,
		ctx: &SolverContext,
		parent: &MappedObject,
		name: &str,
	) -> Result<RemoteObject, SolveError> {
		match ctx.repo.create_folder(&parent.remote_object_id, name).await {
			Ok(folder) => Ok(folder),
			Err(RemoteError::NameConflict { .. }) => {
				// Same folder created on both sides: adopt the remote one
				let existing = ctx
					.repo
					.get_children(&parent.remote_object_id)
					.await?
					.into_iter()
					.find(|child| child.name == name && child.is_folder());
				match existing {
					Some(folder) if ctx.storage.get_object_by_remote_id(&folder.id)?.is_none() => {
						debug!("Adopting existing remote folder {}", folder.id);
						Ok(folder)
					}
					_ => Err(RemoteError::NameConflict { name: name.to_string() }.into()),
				}
			}
			Err(e) => Err(e.into()),
		}
	}
}

#[async_trait]
impl Solver for LocalAdded {
	fn name(&self) -> &str {
		"LocalAdded"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let path = local_path(event)?;
		let info = match ctx.fs.info(path)? {
			Some(info) => info,
			None => {
				debug!("{} disappeared before it could be uploaded", path.display());
				return Ok(());
			}
		};

		if let Some(mapped) = ctx.mapping_for(event)? {
			if event.remote == MetaDataChangeType::Deleted {
				debug!("Dropping mapping of deleted remote object {}", mapped.remote_object_id);
				ctx.storage.remove_object(&mapped)?;
			} else if !mapped.is_folder() && mapped.last_checksum.is_none() {
				info!("Resuming upload of {}", path.display());
				let remote = ctx.fetch(&mapped.remote_object_id).await?.ok_or_else(|| {
					SolveError::retry(format!("{} vanished during upload", mapped.remote_object_id))
				})?;
				ctx.upload_and_save(path, remote).await?;
				return Ok(());
			} else {
				debug!("{} is already synchronized", path.display());
				return Ok(());
			}
		}

		let parent = ctx.local_parent(path)?;
		let name = file_name(path)?;
		if info.is_dir {
			let folder = self.create_folder(ctx, &parent, name).await?;
			ctx.storage.save_mapped_object(&ctx.snapshot(&folder, path, None)?)?;
			info!("Created remote folder {} for {}", folder.id, path.display());
		} else {
			let document = ctx.repo.create_document(&parent.remote_object_id, name, None).await?;
			// Recorded without content first so an interrupted upload is resumed
			ctx.storage.save_mapped_object(&ctx.snapshot(&document, path, None)?)?;
			let mapped = ctx.upload_and_save(path, document).await?;
			info!(
				"Uploaded {} as {} ({} bytes)",
				path.display(),
				mapped.remote_object_id,
				mapped.last_content_size.unwrap_or(0)
			);
		}
		Ok(())
	}
}

/// Deletes the remote counterpart of a removed local object
#[derive(Debug, Default)]
pub struct LocalDeleted;

#[async_trait]
impl Solver for LocalDeleted {
	fn name(&self) -> &str {
		"LocalDeleted"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let path = local_path(event)?;
		let mapped = match ctx.storage.get_object_by_local_path(path)? {
			Some(mapped) => mapped,
			None => match ctx.mapping_for(event)? {
				Some(mapped) => mapped,
				None => {
					debug!("{} was never synchronized", path.display());
					return Ok(());
				}
			},
		};

		let remote = match ctx.fetch(&mapped.remote_object_id).await? {
			Some(remote) => remote,
			None => {
				ctx.storage.remove_object(&mapped)?;
				return Ok(());
			}
		};
		if remote.change_token != mapped.last_change_token {
			debug!("{} changed remotely after the local deletion", remote.id);
			let event = redirect(event, Some(path.to_path_buf()), Some(remote));
			return super::LocalDeletedRemoteChanged.solve(ctx, &event).await;
		}

		let deleted = if mapped.is_folder() {
			ctx.repo.delete_tree(&mapped.remote_object_id).await
		} else {
			ctx.repo.delete(&mapped.remote_object_id).await
		};
		match deleted {
			Ok(()) | Err(RemoteError::NotFound { .. }) => {}
			Err(e) => return Err(e.into()),
		}
		ctx.storage.remove_object(&mapped)?;
		info!("Deleted remote object {} of {}", mapped.remote_object_id, path.display());
		Ok(())
	}
}

/// Uploads local content changes
#[derive(Debug, Default)]
pub struct LocalChanged;

#[async_trait]
impl Solver for LocalChanged {
	fn name(&self) -> &str {
		"LocalChanged"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let mut mapped = match ctx.mapping_for(event)? {
			Some(mapped) => mapped,
			None => return LocalAdded.solve(ctx, event).await,
		};
		// An earlier step of a composite may have moved the file
		let path = ctx.local_path(&mapped)?;
		let info = match ctx.fs.info(&path)? {
			Some(info) => info,
			None => {
				debug!("{} disappeared, waiting for its deletion event", path.display());
				return Ok(());
			}
		};

		if mapped.is_folder() || !ctx.local_content_changed(&path, &mapped)? {
			trace!("Only the modification time of {} changed", path.display());
			mapped.last_local_write_time_utc = info.last_write_time_utc;
			ctx.storage.save_mapped_object(&mapped)?;
			return Ok(());
		}

		let remote = ctx
			.fetch(&mapped.remote_object_id)
			.await?
			.ok_or_else(|| SolveError::retry(format!("Remote object {} is gone", mapped.remote_object_id)))?;
		if remote.change_token != mapped.last_change_token {
			let event = redirect(event, Some(path), Some(remote));
			return BothChanged.solve(ctx, &event).await;
		}
		let mapped = ctx.upload_and_save(&path, remote).await?;
		info!("Uploaded changes of {} ({} bytes)", path.display(), mapped.last_content_size.unwrap_or(0));
		Ok(())
	}
}

/// Replays a local move or rename on the server
///
/// The stored change token is only advanced when the remote object was
/// current before the move; otherwise the pending remote change is picked
/// up later. Content is uploaded under the same condition.
pub(crate) async fn push_local_move(ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
	let path = local_path(event)?;
	let mapped = match ctx.mapping_for(event)? {
		Some(mapped) => mapped,
		None => return LocalAdded.solve(ctx, event).await,
	};
	let mut remote = match ctx.fetch(&mapped.remote_object_id).await? {
		Some(remote) => remote,
		None => {
			ctx.storage.remove_object(&mapped)?;
			return LocalAdded.solve(ctx, &redirect(event, Some(path.to_path_buf()), None)).await;
		}
	};
	let was_current = remote.change_token == mapped.last_change_token;

	let parent = ctx.local_parent(path)?;
	let name = file_name(path)?;
	if remote.parent_id.as_deref() != Some(parent.remote_object_id.as_str()) {
		let source = remote
			.parent_id
			.clone()
			.ok_or_else(|| SolveError::fatal(format!("Cannot move remote root {}", remote.id)))?;
		remote = ctx.repo.move_object(&remote.id, &source, &parent.remote_object_id).await?;
		debug!("Moved {} into {}", remote.id, parent.remote_object_id);
	}
	if remote.name != name {
		remote = ctx.repo.rename(&remote.id, name).await?;
		debug!("Renamed {} to {}", remote.id, name);
	}

	if was_current && !mapped.is_folder() && ctx.local_content_changed(path, &mapped)? {
		ctx.upload_and_save(path, remote).await?;
		return Ok(());
	}

	let mut updated = mapped.clone();
	updated.name = remote.name.clone();
	updated.parent_id = remote.parent_id.clone();
	updated.guid = ctx.fs.uuid(path)?.or(mapped.guid);
	if was_current {
		updated.last_change_token = remote.change_token.clone();
		updated.last_remote_write_time_utc = remote.last_modification_date;
	}
	ctx.storage.save_mapped_object(&updated)?;
	info!("Moved remote object {} to follow {}", remote.id, path.display());
	Ok(())
}

/// Moves the remote object into its new folder
#[derive(Debug, Default)]
pub struct LocalMoved;

#[async_trait]
impl Solver for LocalMoved {
	fn name(&self) -> &str {
		"LocalMoved"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		push_local_move(ctx, event).await
	}
}

/// Renames the remote object
#[derive(Debug, Default)]
pub struct LocalRenamed;

#[async_trait]
impl Solver for LocalRenamed {
	fn name(&self) -> &str {
		"LocalRenamed"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		push_local_move(ctx, event).await
	}
}


// vim: ts=4
