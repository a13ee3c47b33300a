//! Name based filters

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Component;

use super::{EventFilter, Subject};
use crate::config::FilterConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::local::TEMP_SUFFIX;
use crate::storage::PathMatcher;

/// Characters no synchronized folder name may contain
pub const INVALID_FOLDER_NAME_CHARS: &[char] = &['"', '?', ':', '/', '\\', '|', '<', '>', '*'];

/// Compiled glob list that remembers the source patterns
struct Patterns {
	set: GlobSet,
	patterns: Vec<String>,
}

impl Patterns {
	fn new(patterns: Vec<String>) -> Result<Self, SyncError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in &patterns {
			let glob = Glob::new(pattern).map_err(|e| SyncError::InvalidConfig {
				message: format!("Bad ignore pattern '{}': {}", pattern, e),
			})?;
			builder.add(glob);
		}
		let set = builder.build().map_err(|e| SyncError::InvalidConfig {
			message: format!("Failed to build pattern set: {}", e),
		})?;
		Ok(Patterns { set, patterns })
	}

	/// First pattern matching `name`
	fn matching(&self, name: &str) -> Option<&str> {
		self.set.matches(name).into_iter().min().map(|i| self.patterns[i].as_str())
	}
}

/// Names of the folders between the sync root and the object
fn ancestors(matcher: &PathMatcher, subject: &Subject<'_>) -> Vec<String> {
	if let Some(local) = subject.local_path {
		if let Some(rel) = matcher.relative_local_path(local) {
			let mut names: Vec<String> = rel
				.components()
				.filter_map(|c| match c {
					Component::Normal(n) => n.to_str().map(|s| s.to_string()),
					_ => None,
				})
				.collect();
			names.pop();
			return names;
		}
	}
	if let Some(remote) = subject.remote_path {
		if let Some(mut segments) = matcher.relative_remote_segments(remote) {
			segments.pop();
			return segments.into_iter().map(|s| s.to_string()).collect();
		}
	}
	Vec::new()
}

/// Ignores objects whose name, or the name of a containing folder, matches an ignore pattern
///
/// Temporary download files (`*.sync`) are always ignored.
pub struct IgnoredNamesFilter {
	files: Patterns,
	folders: Patterns,
	matcher: PathMatcher,
}

impl IgnoredNamesFilter {
	pub fn new(config: &FilterConfig, matcher: PathMatcher) -> Result<Self, SyncError> {
		let mut files = vec![format!("*{}", TEMP_SUFFIX)];
		files.extend(config.ignored_file_names.iter().cloned());
		Ok(IgnoredNamesFilter {
			files: Patterns::new(files)?,
			folders: Patterns::new(config.ignored_folder_names.clone())?,
			matcher,
		})
	}

	fn check_name(&self, name: &str, is_folder: Option<bool>) -> Option<String> {
		if is_folder != Some(true) {
			if let Some(pattern) = self.files.matching(name) {
				return Some(format!("File name '{}' matches ignore pattern '{}'", name, pattern));
			}
		}
		if is_folder != Some(false) {
			if let Some(pattern) = self.folders.matching(name) {
				return Some(format!("Folder name '{}' matches ignore pattern '{}'", name, pattern));
			}
		}
		None
	}
}

impl EventFilter for IgnoredNamesFilter {
	fn name(&self) -> &str {
		"IgnoredNamesFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		let subject = match Subject::of(event) {
			Some(subject) => subject,
			None => return Ok(None),
		};
		if let Some(name) = subject.name {
			if let Some(reason) = self.check_name(name, subject.is_folder) {
				return Ok(Some(reason));
			}
		}
		for folder in ancestors(&self.matcher, &subject) {
			if let Some(pattern) = self.folders.matching(&folder) {
				return Ok(Some(format!(
					"Inside folder '{}' which matches ignore pattern '{}'",
					folder, pattern
				)));
			}
		}
		Ok(None)
	}
}

/// Ignores folders whose names cannot exist on both sides, and everything inside them
pub struct InvalidFolderNameFilter {
	matcher: PathMatcher,
}

impl InvalidFolderNameFilter {
	pub fn new(matcher: PathMatcher) -> Self {
		InvalidFolderNameFilter { matcher }
	}

	pub fn is_valid(name: &str) -> bool {
		!name.is_empty()
			&& !name.chars().any(|c| INVALID_FOLDER_NAME_CHARS.contains(&c) || c.is_control())
	}
}

impl EventFilter for InvalidFolderNameFilter {
	fn name(&self) -> &str {
		"InvalidFolderNameFilter"
	}

	fn check(&self, event: &SyncEvent) -> Result<Option<String>, SyncError> {
		let subject = match Subject::of(event) {
			Some(subject) => subject,
			None => return Ok(None),
		};
		if subject.is_folder == Some(true) {
			if let Some(name) = subject.name.filter(|n| !Self::is_valid(n)) {
				return Ok(Some(format!("Folder name '{}' contains invalid characters", name)));
			}
		}
		// Children of an unsynchronizable folder would wait forever for their parent
		match ancestors(&self.matcher, &subject).into_iter().find(|f| !Self::is_valid(f)) {
			Some(folder) => Ok(Some(format!(
				"Inside folder '{}' whose name contains invalid characters",
				folder
			))),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::{FsEvent, FsEventType, ObjectEvent};
	use crate::remote::{RemoteObject, RemoteObjectType};
	use std::path::PathBuf;

	fn filter(files: &[&str], folders: &[&str]) -> IgnoredNamesFilter {
		let config = FilterConfig {
			ignored_file_names: files.iter().map(|s| s.to_string()).collect(),
			ignored_folder_names: folders.iter().map(|s| s.to_string()).collect(),
			..FilterConfig::default()
		};
		IgnoredNamesFilter::new(&config, PathMatcher::new("/sync", "/remote")).unwrap()
	}

	fn fs_event(path: &str, is_dir: Option<bool>) -> SyncEvent {
		SyncEvent::Fs(FsEvent::new(FsEventType::Created, path, is_dir))
	}

	#[test]
	fn test_temp_files_always_ignored() {
		let f = filter(&[], &[]);
		let reason = f.check(&fs_event("/sync/a.txt.sync", Some(false))).unwrap();
		assert_eq!(reason.as_deref(), Some("File name 'a.txt.sync' matches ignore pattern '*.sync'"));
		assert_eq!(f.check(&fs_event("/sync/a.txt", Some(false))).unwrap(), None);
	}

	#[test]
	fn test_configured_patterns() {
		let f = filter(&["~*", "*.tmp"], &[".git"]);
		assert!(f.check(&fs_event("/sync/~lock", Some(false))).unwrap().is_some());
		assert!(f.check(&fs_event("/sync/x.tmp", None)).unwrap().is_some());
		assert!(f.check(&fs_event("/sync/.git", Some(true))).unwrap().is_some());
		// Folder patterns do not apply to files
		assert!(f.check(&fs_event("/sync/.git", Some(false))).unwrap().is_none());
	}

	#[test]
	fn test_objects_inside_ignored_folders() {
		let f = filter(&[], &["node_modules"]);
		let event = SyncEvent::Object(ObjectEvent::file(
			Some(PathBuf::from("/sync/app/node_modules/lib/index.js")),
			None,
		));
		let reason = f.check(&event).unwrap().unwrap();
		assert!(reason.contains("node_modules"));
	}

	#[test]
	fn test_check_is_idempotent() {
		let f = filter(&["*.bak"], &[]);
		let event = fs_event("/sync/doc.bak", Some(false));
		let first = f.check(&event).unwrap();
		let second = f.check(&event).unwrap();
		assert!(first.is_some());
		assert_eq!(first, second);
	}

	#[test]
	fn test_bad_pattern_is_config_error() {
		let config = FilterConfig { ignored_file_names: vec!["[".to_string()], ..FilterConfig::default() };
		assert!(IgnoredNamesFilter::new(&config, PathMatcher::new("/sync", "/")).is_err());
	}

	#[test]
	fn test_invalid_folder_names() {
		let f = InvalidFolderNameFilter::new(PathMatcher::new("/sync", "/remote"));
		for name in ["a?b", "a:b", "a|b", "a<b", "a>b", "a*b", "a\"b", "a\\b", "tab\there"] {
			let event = fs_event(&format!("/sync/{}", name), Some(true));
			assert!(f.check(&event).unwrap().is_some(), "{} should be invalid", name);
		}
		assert!(f.check(&fs_event("/sync/normal folder", Some(true))).unwrap().is_none());
		// Only folders are checked
		assert!(f.check(&fs_event("/sync/a?b", Some(false))).unwrap().is_none());
	}

	#[test]
	fn test_objects_inside_invalid_folders() {
		let f = InvalidFolderNameFilter::new(PathMatcher::new("/sync", "/remote"));
		let reason = f.check(&fs_event("/sync/bad?name/x.txt", Some(false))).unwrap();
		assert_eq!(
			reason.as_deref(),
			Some("Inside folder 'bad?name' whose name contains invalid characters")
		);
		assert!(f.check(&fs_event("/sync/ok/deeper|still/x.txt", None)).unwrap().is_some());

		let remote = RemoteObject {
			id: "doc-7".to_string(),
			name: "x.txt".to_string(),
			parent_id: Some("folder-6".to_string()),
			paths: vec!["/remote/a:b/x.txt".to_string()],
			object_type: RemoteObjectType::Document,
			change_token: Some("7".to_string()),
			last_modification_date: None,
			content_length: Some(1),
			content_hash: None,
			read_only: false,
		};
		let event = SyncEvent::Object(ObjectEvent::file(None, Some(remote)));
		assert!(f.check(&event).unwrap().unwrap().contains("'a:b'"));

		assert!(f.check(&fs_event("/sync/ok/x.txt", Some(false))).unwrap().is_none());
	}
}

// vim: ts=4
