//! Solvers for changes made on the server only

use async_trait::async_trait;
use std::path::PathBuf;

use super::{redirect, BothAdded, BothChanged, LocalChangedRemoteDeleted, SolveResult, Solver, SolverContext};
use crate::error::{InteractionNeeded, SolveError};
use crate::events::ObjectEvent;
use crate::logging::*;
use crate::remote::RemoteObject;
use crate::storage::MappedObject;

/// Current state of the event's remote object, `None` once it is gone
async fn current_remote(
	ctx: &SolverContext,
	event: &ObjectEvent,
	mapped: Option<&MappedObject>,
) -> Result<Option<RemoteObject>, SolveError> {
	let id = match (event.remote_id(), mapped) {
		(Some(id), _) => id,
		(None, Some(mapped)) => mapped.remote_object_id.as_str(),
		(None, None) => {
			return Err(SolveError::fatal(format!("Remote solver called without a remote object: {}", event)))
		}
	};
	ctx.fetch(id).await
}

/// Creates the local counterpart of a new remote object
#[derive(Debug, Default)]
pub struct RemoteAdded;

#[async_trait]
impl Solver for RemoteAdded {
	fn name(&self) -> &str {
		"RemoteAdded"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let remote = match current_remote(ctx, event, None).await? {
			Some(remote) => remote,
			None => {
				debug!("Remote object of {} is already gone", event);
				return Ok(());
			}
		};
		if ctx.storage.get_object_by_remote_id(&remote.id)?.is_some() {
			debug!("Remote object {} is already synchronized", remote.id);
			return Ok(());
		}
		let target = ctx.local_target(&remote)?;

		if remote.is_folder() {
			match ctx.fs.info(&target)? {
				Some(info) if info.is_dir => debug!("Adopting existing local folder {}", target.display()),
				Some(_) => {
					return Err(SolveError::InteractionNeeded(
						InteractionNeeded::new(
							"Name conflict",
							format!("Remote folder '{}' collides with a local file", remote.name),
						)
						.with_path(&target)
						.with_remote_id(&remote.id),
					))
				}
				None => ctx.fs.create_dir(&target)?,
			}
			ctx.storage.save_mapped_object(&ctx.snapshot(&remote, &target, None)?)?;
			info!("Created local folder {}", target.display());
			return Ok(());
		}

		if ctx.fs.exists(&target) {
			return BothAdded.solve(ctx, &redirect(event, Some(target), Some(remote))).await;
		}
		let mapped = ctx.download_and_save(&remote, &target).await?;
		info!("Downloaded {} ({} bytes)", target.display(), mapped.last_content_size.unwrap_or(0));
		Ok(())
	}
}

/// Remove the local copy of a mapped subtree, children first
///
/// Files changed since the last synchronization and entries unknown to
/// storage are kept, and so are the folders containing them. Returns
/// whether everything was removed.
fn remove_local_tree(ctx: &SolverContext, root: &MappedObject) -> Result<bool, SolveError> {
	let mut order = Vec::new();
	let mut stack = vec![root.clone()];
	while let Some(object) = stack.pop() {
		stack.extend(ctx.storage.get_children(&object)?);
		order.push(object);
	}

	let mut complete = true;
	for object in order.iter().rev() {
		let path = match ctx.storage.get_local_path(object)? {
			Some(path) => path,
			None => continue,
		};
		match ctx.fs.info(&path)? {
			None => {}
			Some(info) if info.is_dir => {
				if ctx.fs.children(&path)?.is_empty() {
					ctx.fs.remove(&path)?;
				} else {
					complete = false;
				}
			}
			Some(_) if object.is_folder() || ctx.local_content_changed(&path, object)? => {
				debug!("Keeping locally modified {}", path.display());
				complete = false;
			}
			Some(_) => ctx.fs.remove(&path)?,
		}
	}
	Ok(complete)
}

/// Deletes the local counterpart of a removed remote object
#[derive(Debug, Default)]
pub struct RemoteDeleted;

#[async_trait]
impl Solver for RemoteDeleted {
	fn name(&self) -> &str {
		"RemoteDeleted"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let mapped = match ctx.mapping_for(event)? {
			Some(mapped) => mapped,
			None => {
				debug!("Nothing is mapped for {}", event);
				return Ok(());
			}
		};
		let path = ctx.local_path(&mapped)?;

		if mapped.is_folder() {
			if !remove_local_tree(ctx, &mapped)? {
				info!("Kept local changes below {}, uploading them again", path.display());
				ctx.storage.remove_object(&mapped)?;
				ctx.request_full_sync();
				return Ok(());
			}
		} else if ctx.fs.exists(&path) {
			if ctx.local_content_changed(&path, &mapped)? {
				return LocalChangedRemoteDeleted.solve(ctx, &redirect(event, Some(path), None)).await;
			}
			ctx.fs.remove(&path)?;
		}
		ctx.storage.remove_object(&mapped)?;
		info!("Deleted {}", path.display());
		Ok(())
	}
}

/// Downloads remote content changes
#[derive(Debug, Default)]
pub struct RemoteChanged;

#[async_trait]
impl Solver for RemoteChanged {
	fn name(&self) -> &str {
		"RemoteChanged"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		let mapped = match ctx.mapping_for(event)? {
			Some(mapped) => mapped,
			None => return RemoteAdded.solve(ctx, event).await,
		};
		let remote = match current_remote(ctx, event, Some(&mapped)).await? {
			Some(remote) => remote,
			None => return RemoteDeleted.solve(ctx, event).await,
		};
		let path = ctx.local_path(&mapped)?;
		let local_exists = ctx.fs.exists(&path);

		if remote.is_folder() || !ctx.remote_content_changed(&remote, &mapped) {
			if !remote.is_folder() && local_exists && ctx.local_content_changed(&path, &mapped)? {
				ctx.upload_and_save(&path, remote).await?;
				return Ok(());
			}
			let mut updated = mapped;
			updated.last_change_token = remote.change_token.clone();
			updated.last_remote_write_time_utc = remote.last_modification_date;
			updated.is_read_only = remote.read_only;
			ctx.storage.save_mapped_object(&updated)?;
			trace!("Updated metadata of {}", path.display());
			return Ok(());
		}

		if local_exists && ctx.local_content_changed(&path, &mapped)? {
			return BothChanged.solve(ctx, &redirect(event, Some(path), Some(remote))).await;
		}
		let mapped = ctx.download_and_save(&remote, &path).await?;
		info!("Downloaded changes of {} ({} bytes)", path.display(), mapped.last_content_size.unwrap_or(0));
		Ok(())
	}
}

/// Moves a mapped local object from `source` to where the remote object now lives
pub(crate) async fn follow_remote_move(
	ctx: &SolverContext,
	event: &ObjectEvent,
	mapped: MappedObject,
	remote: RemoteObject,
	source: PathBuf,
) -> SolveResult {
	let target = ctx.local_target(&remote)?;
	if !ctx.fs.exists(&source) {
		debug!("{} is gone locally, downloading again", source.display());
		ctx.storage.remove_object(&mapped)?;
		return RemoteAdded.solve(ctx, &redirect(event, None, Some(remote))).await;
	}
	if source != target {
		if ctx.fs.exists(&target) {
			return Err(SolveError::InteractionNeeded(
				InteractionNeeded::new(
					"Name conflict",
					format!("Cannot move {} because {} already exists", source.display(), target.display()),
				)
				.with_path(&target)
				.with_remote_id(&remote.id),
			));
		}
		ctx.fs.rename(&source, &target)?;
	}

	let content_changed = !remote.is_folder() && ctx.remote_content_changed(&remote, &mapped);
	let mut updated = mapped.clone();
	updated.name = remote.name.clone();
	updated.parent_id = remote.parent_id.clone();
	updated.guid = ctx.fs.uuid(&target)?.or(mapped.guid);
	if !content_changed {
		updated.last_change_token = remote.change_token.clone();
		updated.last_remote_write_time_utc = remote.last_modification_date;
	}
	ctx.storage.save_mapped_object(&updated)?;
	info!("Moved {} to {}", source.display(), target.display());

	if content_changed {
		return RemoteChanged.solve(ctx, &redirect(event, Some(target), Some(remote))).await;
	}
	Ok(())
}

async fn pull_remote_move(ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
	let mapped = match ctx.mapping_for(event)? {
		Some(mapped) => mapped,
		None => return RemoteAdded.solve(ctx, event).await,
	};
	let remote = match current_remote(ctx, event, Some(&mapped)).await? {
		Some(remote) => remote,
		None => return RemoteDeleted.solve(ctx, event).await,
	};
	let source = ctx.local_path(&mapped)?;
	follow_remote_move(ctx, event, mapped, remote, source).await
}

/// Moves the local object into its new folder
#[derive(Debug, Default)]
pub struct RemoteMoved;

#[async_trait]
impl Solver for RemoteMoved {
	fn name(&self) -> &str {
		"RemoteMoved"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		pull_remote_move(ctx, event).await
	}
}

/// Renames the local object
#[derive(Debug, Default)]
pub struct RemoteRenamed;

#[async_trait]
impl Solver for RemoteRenamed {
	fn name(&self) -> &str {
		"RemoteRenamed"
	}

	async fn solve(&self, ctx: &SolverContext, event: &ObjectEvent) -> SolveResult {
		pull_remote_move(ctx, event).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::{ContentChangeType, MetaDataChangeType};
	use crate::remote::RemoteRepository;
	use crate::solver::testing::Fixture;

	#[tokio::test]
	async fn test_added_document_is_downloaded() {
		let fx = Fixture::new();
		let remote = fx.repo.create_document(fx.repo.root_id(), "r.txt", Some(b"remote")).await.unwrap();

		let event = ObjectEvent::file(None, Some(remote.clone()))
			.with_remote(MetaDataChangeType::Created)
			.with_remote_content(ContentChangeType::Created);
		RemoteAdded.solve(&fx.ctx, &event).await.unwrap();

		let path = fx.path("r.txt");
		assert_eq!(std::fs::read(&path).unwrap(), b"remote");
		assert!(!fx.ctx.fs.temp_path(&path).exists());
		let mapped = fx.mapped(&remote.id).unwrap();
		assert_eq!(mapped.last_content_size, Some(6));
		assert_eq!(mapped.guid, fx.ctx.fs.uuid(&path).unwrap());
	}

	#[tokio::test]
	async fn test_added_below_unknown_folder_retries() {
		let fx = Fixture::new();
		let folder = fx.repo.create_folder(fx.repo.root_id(), "f").await.unwrap();
		let remote = fx.repo.create_document(&folder.id, "r.txt", Some(b"x")).await.unwrap();

		let event = ObjectEvent::file(None, Some(remote)).with_remote(MetaDataChangeType::Created);
		let result = RemoteAdded.solve(&fx.ctx, &event).await;
		assert!(matches!(result, Err(SolveError::Retry(_))));
	}

	#[tokio::test]
	async fn test_deleted_folder_keeps_local_changes() {
		let fx = Fixture::new();
		let folder = fx.synced_folder("dir").await;
		fx.synced_file("dir/same.txt", b"same").await;
		fx.synced_file("dir/edited.txt", b"old").await;
		std::fs::write(fx.path("dir/edited.txt"), b"new content").unwrap();
		fx.repo.delete_tree(&folder.id).await.unwrap();

		let event = ObjectEvent::folder(Some(fx.path("dir")), None).with_remote(MetaDataChangeType::Deleted);
		RemoteDeleted.solve(&fx.ctx, &event).await.unwrap();

		assert!(!fx.path("dir/same.txt").exists());
		assert!(fx.path("dir/edited.txt").exists());
		assert!(fx.mapped(&folder.id).is_none());
		assert_eq!(fx.queue.take(), vec![crate::events::SyncEvent::full_sync()]);
	}

	#[tokio::test]
	async fn test_changed_document_is_downloaded() {
		let fx = Fixture::new();
		let remote = fx.synced_file("a.txt", b"abc").await;
		let updated = fx.repo.set_content_stream(&remote.id, b"server").await.unwrap();

		let event = ObjectEvent::file(Some(fx.path("a.txt")), Some(updated.clone()))
			.with_remote(MetaDataChangeType::Changed)
			.with_remote_content(ContentChangeType::Changed);
		RemoteChanged.solve(&fx.ctx, &event).await.unwrap();

		assert_eq!(std::fs::read(fx.path("a.txt")).unwrap(), b"server");
		assert_eq!(fx.mapped(&remote.id).unwrap().last_change_token, updated.change_token);
	}

	#[tokio::test]
	async fn test_renamed_follows_server() {
		let fx = Fixture::new();
		let remote = fx.synced_file("old.txt", b"abc").await;
		let renamed = fx.repo.rename(&remote.id, "new.txt").await.unwrap();

		let event = ObjectEvent::file(Some(fx.path("old.txt")), Some(renamed.clone()))
			.with_remote(MetaDataChangeType::Changed);
		RemoteRenamed.solve(&fx.ctx, &event).await.unwrap();

		assert!(!fx.path("old.txt").exists());
		assert_eq!(std::fs::read(fx.path("new.txt")).unwrap(), b"abc");
		let mapped = fx.mapped(&remote.id).unwrap();
		assert_eq!(mapped.name, "new.txt");
		assert_eq!(mapped.last_change_token, renamed.change_token);
		assert!(!fx.ctx.local_content_changed(&fx.path("new.txt"), &mapped).unwrap());
	}

	#[tokio::test]
	async fn test_moved_with_missing_source_downloads() {
		let fx = Fixture::new();
		let folder = fx.synced_folder("dir").await;
		let remote = fx.synced_file("a.txt", b"abc").await;
		std::fs::remove_file(fx.path("a.txt")).unwrap();
		let moved = fx.repo.move_object(&remote.id, fx.repo.root_id(), &folder.id).await.unwrap();

		let event = ObjectEvent::file(None, Some(moved)).with_remote(MetaDataChangeType::Changed);
		RemoteMoved.solve(&fx.ctx, &event).await.unwrap();

		assert_eq!(std::fs::read(fx.path("dir/a.txt")).unwrap(), b"abc");
		let mapped = fx.mapped(&remote.id).unwrap();
		assert_eq!(mapped.parent_id.as_deref(), Some(folder.id.as_str()));
	}
}

// vim: ts=4
