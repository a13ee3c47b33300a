//! Content transfers
//!
//! A [`Transmission`] is the observable state of one upload or download.
//! The transfer loops check it at every chunk boundary: a paused
//! transmission waits there until resumed, an aborted one stops and the
//! solver reports a retryable failure. The optional bandwidth limit is
//! enforced at the same boundary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

use crate::callbacks::SyncListener;
use crate::error::SolveError;
use crate::local::LocalFileSystem;
use crate::logging::*;
use crate::remote::{RemoteObject, RemoteRepository};

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionKind {
	Upload,
	Download,
}

/// Lifecycle of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionState {
	Started,
	Paused,
	Aborting,
	Aborted,
	Finished,
}

impl TransmissionState {
	pub fn is_done(self) -> bool {
		matches!(self, TransmissionState::Aborted | TransmissionState::Finished)
	}
}

/// Snapshot reported to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionStatus {
	pub id: u64,
	pub kind: TransmissionKind,
	pub path: PathBuf,
	pub state: TransmissionState,
	pub position: u64,
	pub length: Option<u64>,
}

/// One running transfer
pub struct Transmission {
	id: u64,
	kind: TransmissionKind,
	path: PathBuf,
	length: Option<u64>,
	state: watch::Sender<TransmissionState>,
	position: AtomicU64,
	bandwidth_limit: Option<u64>,
	started_at: Instant,
	listener: Arc<dyn SyncListener>,
}

impl Transmission {
	fn new(
		id: u64,
		kind: TransmissionKind,
		path: PathBuf,
		length: Option<u64>,
		bandwidth_limit: Option<u64>,
		listener: Arc<dyn SyncListener>,
	) -> Self {
		let (state, _) = watch::channel(TransmissionState::Started);
		Transmission {
			id,
			kind,
			path,
			length,
			state,
			position: AtomicU64::new(0),
			bandwidth_limit,
			started_at: Instant::now(),
			listener,
		}
	}

	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn state(&self) -> TransmissionState {
		*self.state.borrow()
	}

	pub fn position(&self) -> u64 {
		self.position.load(Ordering::SeqCst)
	}

	pub fn status(&self) -> TransmissionStatus {
		TransmissionStatus {
			id: self.id,
			kind: self.kind,
			path: self.path.clone(),
			state: self.state(),
			position: self.position(),
			length: self.length,
		}
	}

	fn transition(&self, from: &[TransmissionState], to: TransmissionState) -> bool {
		let changed = self.state.send_if_modified(|state| {
			if from.contains(state) {
				*state = to;
				true
			} else {
				false
			}
		});
		if changed {
			debug!("Transmission {} of {:?} is now {:?}", self.id, self.path, to);
			self.listener.on_transmission(&self.status());
		}
		changed
	}

	/// Stop at the next chunk boundary until resumed
	pub fn pause(&self) -> bool {
		self.transition(&[TransmissionState::Started], TransmissionState::Paused)
	}

	pub fn resume(&self) -> bool {
		self.transition(&[TransmissionState::Paused], TransmissionState::Started)
	}

	/// Stop at the next chunk boundary for good
	pub fn abort(&self) -> bool {
		self.transition(
			&[TransmissionState::Started, TransmissionState::Paused],
			TransmissionState::Aborting,
		)
	}

	fn finish(&self) {
		self.transition(&[TransmissionState::Started], TransmissionState::Finished);
	}

	fn fail(&self) {
		self.transition(
			&[TransmissionState::Started, TransmissionState::Paused, TransmissionState::Aborting],
			TransmissionState::Aborted,
		);
	}

	/// Chunk boundary: wait while paused, fail once aborted
	pub async fn checkpoint(&self) -> Result<(), SolveError> {
		let mut rx = self.state.subscribe();
		loop {
			let state = *rx.borrow_and_update();
			match state {
				TransmissionState::Started | TransmissionState::Finished => return Ok(()),
				TransmissionState::Paused => {
					if rx.changed().await.is_err() {
						return Ok(());
					}
				}
				TransmissionState::Aborting | TransmissionState::Aborted => {
					self.transition(&[TransmissionState::Aborting], TransmissionState::Aborted);
					return Err(SolveError::retry(format!(
						"Transmission of {} was aborted",
						self.path.display()
					)));
				}
			}
		}
	}

	/// Record transferred bytes and apply the bandwidth limit
	async fn advance(&self, bytes: u64) {
		let position = self.position.fetch_add(bytes, Ordering::SeqCst) + bytes;
		self.listener.on_transmission(&self.status());
		if let Some(limit) = self.bandwidth_limit {
			let expected = Duration::from_secs_f64(position as f64 / limit as f64);
			let elapsed = self.started_at.elapsed();
			if expected > elapsed {
				tokio::time::sleep(expected - elapsed).await;
			}
		}
	}
}

/// Registry of running transmissions
pub struct TransmissionManager {
	next_id: AtomicU64,
	active: Mutex<HashMap<u64, Arc<Transmission>>>,
	bandwidth_limit: Option<u64>,
	listener: Arc<dyn SyncListener>,
}

impl TransmissionManager {
	pub fn new(bandwidth_limit: Option<u64>, listener: Arc<dyn SyncListener>) -> Self {
		TransmissionManager {
			next_id: AtomicU64::new(1),
			active: Mutex::new(HashMap::new()),
			bandwidth_limit,
			listener,
		}
	}

	fn active(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Arc<Transmission>>> {
		self.active.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Register a new transmission in the Started state
	pub fn start(&self, kind: TransmissionKind, path: &Path, length: Option<u64>) -> Arc<Transmission> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let transmission = Arc::new(Transmission::new(
			id,
			kind,
			path.to_path_buf(),
			length,
			self.bandwidth_limit,
			self.listener.clone(),
		));
		self.listener.on_transmission(&transmission.status());
		self.active().insert(id, transmission.clone());
		transmission
	}

	fn done(&self, transmission: &Transmission, success: bool) {
		if success {
			transmission.finish();
		} else {
			transmission.fail();
		}
		self.active().remove(&transmission.id);
	}

	/// Snapshot of all running transmissions
	pub fn statuses(&self) -> Vec<TransmissionStatus> {
		let mut statuses: Vec<_> = self.active().values().map(|t| t.status()).collect();
		statuses.sort_by_key(|s| s.id);
		statuses
	}

	pub fn get(&self, id: u64) -> Option<Arc<Transmission>> {
		self.active().get(&id).cloned()
	}

	pub fn pause_all(&self) {
		for t in self.active().values() {
			t.pause();
		}
	}

	pub fn resume_all(&self) {
		for t in self.active().values() {
			t.resume();
		}
	}

	pub fn abort_all(&self) {
		for t in self.active().values() {
			t.abort();
		}
	}
}

/// Checksum and size of transferred content
#[derive(Debug, Clone, PartialEq)]
pub struct TransferResult {
	pub checksum: String,
	pub size: u64,
	/// Remote object after the last content call, for uploads
	pub remote: Option<RemoteObject>,
}

/// Upload a local file's content into an existing remote document
///
/// The first chunk replaces the content, later chunks are appended. An
/// empty file results in a single empty content replacement.
pub async fn upload(
	manager: &TransmissionManager,
	repo: &dyn RemoteRepository,
	local_path: &Path,
	remote_id: &str,
	chunk_size: usize,
) -> Result<TransferResult, SolveError> {
	let mut file = tokio::fs::File::open(local_path).await?;
	let length = file.metadata().await?.len();
	let transmission = manager.start(TransmissionKind::Upload, local_path, Some(length));
	let result = upload_chunks(&transmission, &mut file, repo, remote_id, length, chunk_size).await;
	manager.done(&transmission, result.is_ok());
	result
}

async fn upload_chunks(
	transmission: &Transmission,
	file: &mut tokio::fs::File,
	repo: &dyn RemoteRepository,
	remote_id: &str,
	length: u64,
	chunk_size: usize,
) -> Result<TransferResult, SolveError> {
	let mut hasher = blake3::Hasher::new();
	let mut buf = vec![0u8; chunk_size.max(1)];
	let mut sent = 0u64;
	let mut remote = None;
	loop {
		transmission.checkpoint().await?;
		let n = read_chunk(file, &mut buf).await?;
		hasher.update(&buf[..n]);
		let first = remote.is_none();
		let is_last = n < buf.len() || sent + n as u64 >= length;
		let object = if first {
			repo.set_content_stream(remote_id, &buf[..n]).await?
		} else if n > 0 || is_last {
			repo.append_content_stream(remote_id, &buf[..n], is_last).await?
		} else {
			break;
		};
		remote = Some(object);
		sent += n as u64;
		transmission.advance(n as u64).await;
		if is_last {
			break;
		}
	}
	Ok(TransferResult { checksum: hex::encode(hasher.finalize().as_bytes()), size: sent, remote })
}

/// Fill `buf` as far as the file allows
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = file.read(&mut buf[filled..]).await?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}

/// Download a remote document into `target`
///
/// Content is written to a `*.sync` sibling which replaces `target` only
/// once the whole content has arrived.
pub async fn download(
	manager: &TransmissionManager,
	repo: &dyn RemoteRepository,
	fs: &LocalFileSystem,
	remote: &RemoteObject,
	target: &Path,
	chunk_size: usize,
) -> Result<TransferResult, SolveError> {
	let temp = fs.temp_path(target);
	let transmission = manager.start(TransmissionKind::Download, target, remote.content_length);
	let result = download_chunks(&transmission, repo, &remote.id, &temp, chunk_size as u64).await;
	let result = match result {
		Ok(r) => fs.replace(&temp, target).map(|_| r).map_err(SolveError::from),
		Err(e) => Err(e),
	};
	if result.is_err() {
		if let Err(e) = fs.remove(&temp) {
			warn!("Cannot remove {:?}: {}", temp, e);
		}
	}
	manager.done(&transmission, result.is_ok());
	result
}

async fn download_chunks(
	transmission: &Transmission,
	repo: &dyn RemoteRepository,
	remote_id: &str,
	temp: &Path,
	chunk_size: u64,
) -> Result<TransferResult, SolveError> {
	let chunk_size = chunk_size.max(1);
	let mut file = tokio::fs::File::create(temp).await?;
	let mut hasher = blake3::Hasher::new();
	let mut offset = 0u64;
	loop {
		transmission.checkpoint().await?;
		let chunk = repo.get_content_stream(remote_id, offset, chunk_size).await?;
		file.write_all(&chunk).await?;
		hasher.update(&chunk);
		offset += chunk.len() as u64;
		transmission.advance(chunk.len() as u64).await;
		if (chunk.len() as u64) < chunk_size {
			break;
		}
	}
	file.flush().await?;
	file.sync_all().await?;
	Ok(TransferResult {
		checksum: hex::encode(hasher.finalize().as_bytes()),
		size: offset,
		remote: None,
	})
}


// vim: ts=4
