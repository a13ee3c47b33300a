//! Local filesystem access
//!
//! Wraps `std::fs` with the few things synchronization needs on top: a
//! stable identity for every object (so renames and moves can be told
//! apart from delete + create), UTC timestamps and content checksums.

use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Suffix of temporary files written while downloading
pub const TEMP_SUFFIX: &str = ".sync";

/// Snapshot of a local file or directory
#[derive(Debug, Clone, PartialEq)]
pub struct LocalObjectInfo {
	pub path: PathBuf,
	pub is_dir: bool,
	pub is_symlink: bool,
	/// Stable identity, survives renames and moves on the same volume
	pub uuid: Option<Uuid>,
	pub length: u64,
	pub last_write_time_utc: Option<DateTime<Utc>>,
	pub read_only: bool,
}

impl LocalObjectInfo {
	/// Final path component
	pub fn name(&self) -> Option<&str> {
		self.path.file_name().and_then(|n| n.to_str())
	}

	/// Containing directory
	pub fn parent(&self) -> Option<&Path> {
		self.path.parent()
	}
}

/// Local filesystem operations used by detection, filters and solvers
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
	pub fn new() -> Self {
		LocalFileSystem
	}

	/// Inspect a path without following a final symlink
	///
	/// Returns `Ok(None)` when nothing exists at the path.
	pub fn info(&self, path: &Path) -> io::Result<Option<LocalObjectInfo>> {
		let meta = match fs::symlink_metadata(path) {
			Ok(meta) => meta,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e),
		};
		let is_symlink = meta.file_type().is_symlink();
		let last_write_time_utc = meta.modified().ok().map(DateTime::<Utc>::from);
		Ok(Some(LocalObjectInfo {
			path: path.to_path_buf(),
			is_dir: meta.is_dir(),
			is_symlink,
			uuid: stable_id(&meta),
			length: if meta.is_dir() { 0 } else { meta.len() },
			last_write_time_utc,
			read_only: meta.permissions().readonly(),
		}))
	}

	pub fn exists(&self, path: &Path) -> bool {
		fs::symlink_metadata(path).is_ok()
	}

	pub fn uuid(&self, path: &Path) -> io::Result<Option<Uuid>> {
		Ok(self.info(path)?.and_then(|i| i.uuid))
	}

	/// Entries of a directory, sorted by name
	pub fn children(&self, dir: &Path) -> io::Result<Vec<LocalObjectInfo>> {
		let mut result = Vec::new();
		for entry in fs::read_dir(dir)? {
			let entry = entry?;
			if let Some(info) = self.info(&entry.path())? {
				result.push(info);
			}
		}
		result.sort_by(|a, b| a.path.cmp(&b.path));
		Ok(result)
	}

	pub fn create_dir(&self, path: &Path) -> io::Result<()> {
		match fs::create_dir(path) {
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
			other => other,
		}
	}

	pub fn remove(&self, path: &Path) -> io::Result<()> {
		match fs::symlink_metadata(path) {
			Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
			Ok(_) => fs::remove_file(path),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e),
		}
	}

	/// Rename or move; fails if the target already exists
	pub fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
		if self.exists(to) {
			return Err(io::Error::new(
				io::ErrorKind::AlreadyExists,
				format!("{} already exists", to.display()),
			));
		}
		fs::rename(from, to)
	}

	/// Replace `to` with `from` (used to commit downloaded temp files)
	pub fn replace(&self, from: &Path, to: &Path) -> io::Result<()> {
		fs::rename(from, to)
	}

	pub fn set_last_write_time_utc(&self, path: &Path, time: DateTime<Utc>) -> io::Result<()> {
		let mtime = FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos());
		filetime::set_file_mtime(path, mtime)
	}

	/// Hex encoded checksum and size of a file's content
	pub fn checksum(&self, path: &Path) -> io::Result<(String, u64)> {
		let mut file = fs::File::open(path)?;
		let mut hasher = blake3::Hasher::new();
		let mut buf = vec![0u8; 64 * 1024];
		let mut size = 0u64;
		loop {
			let n = file.read(&mut buf)?;
			if n == 0 {
				break;
			}
			hasher.update(&buf[..n]);
			size += n as u64;
		}
		Ok((hex::encode(hasher.finalize().as_bytes()), size))
	}

	/// Temporary sibling path used while content is being written
	pub fn temp_path(&self, path: &Path) -> PathBuf {
		let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
		name.push(TEMP_SUFFIX);
		path.with_file_name(name)
	}
}

#[cfg(unix)]
fn stable_id(meta: &fs::Metadata) -> Option<Uuid> {
	use std::os::unix::fs::MetadataExt;
	Some(Uuid::from_u64_pair(meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn stable_id(_meta: &fs::Metadata) -> Option<Uuid> {
	None
}

/// Hex encoded checksum of an in-memory buffer
pub fn checksum_bytes(data: &[u8]) -> String {
	hex::encode(blake3::hash(data).as_bytes())
}


// vim: ts=4
