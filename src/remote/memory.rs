//! In-process repository
//!
//! Keeps the whole object tree in memory with CMIS-like semantics: every
//! modification bumps the object's change token and appends to a change
//! log. Failures can be injected to exercise retry handling.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use super::{
	ChangeLogEntry, ChangeLogPage, ChangeType, RemoteObject, RemoteObjectType, RemoteRepository,
	RemoteResult,
};
use crate::error::RemoteError;
use crate::local::checksum_bytes;

const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
struct Node {
	object: RemoteObject,
	content: Vec<u8>,
}

#[derive(Debug)]
struct State {
	nodes: HashMap<String, Node>,
	next_id: u64,
	next_token: u64,
	log: Vec<(u64, ChangeLogEntry)>,
	/// Tokens below this are no longer valid
	log_floor: u64,
	failures: VecDeque<RemoteError>,
	read_only: HashSet<String>,
}

impl State {
	fn node(&self, id: &str) -> RemoteResult<&Node> {
		self.nodes.get(id).ok_or_else(|| RemoteError::NotFound { what: id.to_string() })
	}

	fn path_of(&self, id: &str) -> Option<String> {
		let mut names = Vec::new();
		let mut current = self.nodes.get(id)?;
		while let Some(parent_id) = current.object.parent_id.as_deref() {
			names.push(current.object.name.clone());
			current = self.nodes.get(parent_id)?;
		}
		names.reverse();
		Some(format!("/{}", names.join("/")))
	}

	fn snapshot(&self, id: &str) -> RemoteResult<RemoteObject> {
		let node = self.node(id)?;
		let mut object = node.object.clone();
		object.paths = self.path_of(id).into_iter().collect();
		if object.is_document() {
			object.content_length = Some(node.content.len() as u64);
			object.content_hash = Some(checksum_bytes(&node.content));
		}
		object.read_only = self.read_only.contains(id);
		Ok(object)
	}

	fn children_of(&self, id: &str) -> Vec<String> {
		let mut ids: Vec<String> = self
			.nodes
			.values()
			.filter(|n| n.object.parent_id.as_deref() == Some(id))
			.map(|n| n.object.id.clone())
			.collect();
		ids.sort();
		ids
	}

	fn check_name_free(&self, parent_id: &str, name: &str) -> RemoteResult<()> {
		let taken = self
			.nodes
			.values()
			.any(|n| n.object.parent_id.as_deref() == Some(parent_id) && n.object.name == name);
		if taken {
			return Err(RemoteError::NameConflict { name: name.to_string() });
		}
		Ok(())
	}

	fn check_writable(&self, id: &str) -> RemoteResult<()> {
		if self.read_only.contains(id) {
			return Err(RemoteError::PermissionDenied { what: id.to_string() });
		}
		Ok(())
	}

	fn take_failure(&mut self) -> RemoteResult<()> {
		match self.failures.pop_front() {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	fn log(&mut self, id: &str, change_type: ChangeType) -> u64 {
		self.next_token += 1;
		let token = self.next_token;
		self.log.push((
			token,
			ChangeLogEntry {
				object_id: id.to_string(),
				change_type,
				change_time: Some(Utc::now()),
			},
		));
		token
	}

	fn touch(&mut self, id: &str, change_type: ChangeType) {
		let token = self.log(id, change_type);
		if let Some(node) = self.nodes.get_mut(id) {
			node.object.change_token = Some(token.to_string());
			node.object.last_modification_date = Some(Utc::now());
		}
	}

	fn insert(&mut self, parent_id: &str, name: &str, tp: RemoteObjectType, content: Vec<u8>) -> String {
		self.next_id += 1;
		let id = match tp {
			RemoteObjectType::Folder => format!("folder-{}", self.next_id),
			RemoteObjectType::Document => format!("doc-{}", self.next_id),
		};
		let object = RemoteObject {
			id: id.clone(),
			name: name.to_string(),
			parent_id: Some(parent_id.to_string()),
			paths: Vec::new(),
			object_type: tp,
			change_token: None,
			last_modification_date: None,
			content_length: None,
			content_hash: None,
			read_only: false,
		};
		self.nodes.insert(id.clone(), Node { object, content });
		self.touch(&id, ChangeType::Created);
		id
	}
}

/// Repository that lives entirely in memory
pub struct MemoryRepository {
	state: Mutex<State>,
}

impl MemoryRepository {
	pub fn new() -> Self {
		let root = RemoteObject {
			id: ROOT_ID.to_string(),
			name: String::new(),
			parent_id: None,
			paths: vec!["/".to_string()],
			object_type: RemoteObjectType::Folder,
			change_token: Some("0".to_string()),
			last_modification_date: Some(Utc::now()),
			content_length: None,
			content_hash: None,
			read_only: false,
		};
		let mut nodes = HashMap::new();
		nodes.insert(ROOT_ID.to_string(), Node { object: root, content: Vec::new() });
		MemoryRepository {
			state: Mutex::new(State {
				nodes,
				next_id: 0,
				next_token: 0,
				log: Vec::new(),
				log_floor: 0,
				failures: VecDeque::new(),
				read_only: HashSet::new(),
			}),
		}
	}

	fn state(&self) -> std::sync::MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn root_id(&self) -> &'static str {
		ROOT_ID
	}

	/// Make the next repository call fail with `error`
	pub fn inject_failure(&self, error: RemoteError) {
		self.state().failures.push_back(error);
	}

	/// Refuse modifications of an object
	pub fn set_read_only(&self, id: &str, read_only: bool) {
		let mut state = self.state();
		if read_only {
			state.read_only.insert(id.to_string());
		} else {
			state.read_only.remove(id);
		}
	}

	/// Drop the change log so older tokens become invalid
	pub fn truncate_change_log(&self) {
		let mut state = self.state();
		state.log.clear();
		state.log_floor = state.next_token;
	}

	pub fn content(&self, id: &str) -> Option<Vec<u8>> {
		self.state().nodes.get(id).map(|n| n.content.clone())
	}

	pub fn object_count(&self) -> usize {
		self.state().nodes.len()
	}
}

impl Default for MemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl RemoteRepository for MemoryRepository {
	async fn get_object_by_id(&self, id: &str) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.snapshot(id)
	}

	async fn get_object_by_path(&self, path: &str) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		let mut current = ROOT_ID.to_string();
		for segment in path.split('/').filter(|s| !s.is_empty()) {
			let next = state
				.nodes
				.values()
				.find(|n| n.object.parent_id.as_deref() == Some(current.as_str()) && n.object.name == segment)
				.map(|n| n.object.id.clone());
			current = next.ok_or_else(|| RemoteError::NotFound { what: path.to_string() })?;
		}
		state.snapshot(&current)
	}

	async fn get_children(&self, folder_id: &str) -> RemoteResult<Vec<RemoteObject>> {
		let mut state = self.state();
		state.take_failure()?;
		if !state.node(folder_id)?.object.is_folder() {
			return Err(RemoteError::Other { message: format!("{} is not a folder", folder_id) });
		}
		state.children_of(folder_id).iter().map(|id| state.snapshot(id)).collect()
	}

	async fn create_folder(&self, parent_id: &str, name: &str) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.node(parent_id)?;
		state.check_writable(parent_id)?;
		state.check_name_free(parent_id, name)?;
		let id = state.insert(parent_id, name, RemoteObjectType::Folder, Vec::new());
		state.snapshot(&id)
	}

	async fn create_document(
		&self,
		parent_id: &str,
		name: &str,
		content: Option<&[u8]>,
	) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.node(parent_id)?;
		state.check_writable(parent_id)?;
		state.check_name_free(parent_id, name)?;
		let content = content.map(|c| c.to_vec()).unwrap_or_default();
		let id = state.insert(parent_id, name, RemoteObjectType::Document, content);
		state.snapshot(&id)
	}

	async fn set_content_stream(&self, id: &str, content: &[u8]) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(id)?;
		match state.nodes.get_mut(id) {
			Some(node) if node.object.is_document() => node.content = content.to_vec(),
			Some(_) => {
				return Err(RemoteError::Other { message: format!("{} is not a document", id) })
			}
			None => return Err(RemoteError::NotFound { what: id.to_string() }),
		}
		state.touch(id, ChangeType::Updated);
		state.snapshot(id)
	}

	async fn append_content_stream(
		&self,
		id: &str,
		chunk: &[u8],
		_is_last: bool,
	) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(id)?;
		match state.nodes.get_mut(id) {
			Some(node) if node.object.is_document() => node.content.extend_from_slice(chunk),
			Some(_) => {
				return Err(RemoteError::Other { message: format!("{} is not a document", id) })
			}
			None => return Err(RemoteError::NotFound { what: id.to_string() }),
		}
		state.touch(id, ChangeType::Updated);
		state.snapshot(id)
	}

	async fn get_content_stream(
		&self,
		id: &str,
		offset: u64,
		length: u64,
	) -> RemoteResult<Vec<u8>> {
		let mut state = self.state();
		state.take_failure()?;
		let content = &state.node(id)?.content;
		let start = (offset as usize).min(content.len());
		let end = start.saturating_add(length as usize).min(content.len());
		Ok(content[start..end].to_vec())
	}

	async fn move_object(
		&self,
		id: &str,
		source_folder_id: &str,
		target_folder_id: &str,
	) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(id)?;
		state.node(target_folder_id)?;
		let (current_parent, name) = {
			let node = state.node(id)?;
			(node.object.parent_id.clone(), node.object.name.clone())
		};
		if current_parent.as_deref() != Some(source_folder_id) {
			return Err(RemoteError::Other {
				message: format!("{} is not a child of {}", id, source_folder_id),
			});
		}
		state.check_name_free(target_folder_id, &name)?;
		if let Some(node) = state.nodes.get_mut(id) {
			node.object.parent_id = Some(target_folder_id.to_string());
		}
		state.touch(id, ChangeType::Updated);
		state.snapshot(id)
	}

	async fn rename(&self, id: &str, new_name: &str) -> RemoteResult<RemoteObject> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(id)?;
		let parent_id = state.node(id)?.object.parent_id.clone();
		if let Some(parent_id) = parent_id.as_deref() {
			state.check_name_free(parent_id, new_name)?;
		}
		if let Some(node) = state.nodes.get_mut(id) {
			node.object.name = new_name.to_string();
		}
		state.touch(id, ChangeType::Updated);
		state.snapshot(id)
	}

	async fn delete(&self, id: &str) -> RemoteResult<()> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(id)?;
		state.node(id)?;
		if !state.children_of(id).is_empty() {
			return Err(RemoteError::Other { message: format!("Folder {} is not empty", id) });
		}
		state.nodes.remove(id);
		state.log(id, ChangeType::Deleted);
		Ok(())
	}

	async fn delete_tree(&self, folder_id: &str) -> RemoteResult<()> {
		let mut state = self.state();
		state.take_failure()?;
		state.check_writable(folder_id)?;
		state.node(folder_id)?;
		let mut pending = vec![folder_id.to_string()];
		let mut removed = Vec::new();
		while let Some(id) = pending.pop() {
			pending.extend(state.children_of(&id));
			removed.push(id);
		}
		for id in removed {
			state.nodes.remove(&id);
			state.log(&id, ChangeType::Deleted);
		}
		Ok(())
	}

	async fn get_content_changes(
		&self,
		token: Option<&str>,
		max_items: usize,
	) -> RemoteResult<ChangeLogPage> {
		let mut state = self.state();
		state.take_failure()?;
		let since = match token {
			None => state.log_floor,
			Some(token) => match token.parse::<u64>() {
				Ok(since) if since >= state.log_floor => since,
				_ => return Err(RemoteError::InvalidChangeToken { token: token.to_string() }),
			},
		};
		let pending: Vec<&(u64, ChangeLogEntry)> =
			state.log.iter().filter(|(seq, _)| *seq > since).collect();
		let has_more = pending.len() > max_items;
		let page: Vec<&(u64, ChangeLogEntry)> = pending.into_iter().take(max_items).collect();
		let latest = page.last().map(|(seq, _)| *seq).unwrap_or(since);
		Ok(ChangeLogPage {
			entries: page.into_iter().map(|(_, e)| e.clone()).collect(),
			latest_token: Some(latest.to_string()),
			has_more,
		})
	}

	async fn latest_change_log_token(&self) -> RemoteResult<Option<String>> {
		let mut state = self.state();
		state.take_failure()?;
		Ok(Some(state.next_token.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_create_and_lookup_by_path() {
		let repo = MemoryRepository::new();
		let folder = repo.create_folder(ROOT_ID, "docs").await.unwrap();
		let doc = repo.create_document(&folder.id, "a.txt", Some(b"abc")).await.unwrap();

		assert_eq!(doc.paths, vec!["/docs/a.txt".to_string()]);
		assert_eq!(doc.content_length, Some(3));
		let found = repo.get_object_by_path("/docs/a.txt").await.unwrap();
		assert_eq!(found.id, doc.id);
	}

	#[tokio::test]
	async fn test_change_token_changes_on_update() {
		let repo = MemoryRepository::new();
		let doc = repo.create_document(ROOT_ID, "a", None).await.unwrap();
		let updated = repo.set_content_stream(&doc.id, b"new").await.unwrap();
		assert_ne!(doc.change_token, updated.change_token);
		assert_eq!(repo.content(&doc.id), Some(b"new".to_vec()));
	}

	#[tokio::test]
	async fn test_name_conflict() {
		let repo = MemoryRepository::new();
		repo.create_document(ROOT_ID, "a", None).await.unwrap();
		let result = repo.create_folder(ROOT_ID, "a").await;
		assert!(matches!(result, Err(RemoteError::NameConflict { .. })));
	}

	#[tokio::test]
	async fn test_ranged_content_read() {
		let repo = MemoryRepository::new();
		let doc = repo.create_document(ROOT_ID, "a", Some(b"0123456789")).await.unwrap();
		assert_eq!(repo.get_content_stream(&doc.id, 2, 3).await.unwrap(), b"234".to_vec());
		assert_eq!(repo.get_content_stream(&doc.id, 8, 10).await.unwrap(), b"89".to_vec());
		assert!(repo.get_content_stream(&doc.id, 20, 10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_change_log_paging() {
		let repo = MemoryRepository::new();
		let a = repo.create_document(ROOT_ID, "a", None).await.unwrap();
		repo.create_document(ROOT_ID, "b", None).await.unwrap();
		repo.delete(&a.id).await.unwrap();

		let page = repo.get_content_changes(None, 2).await.unwrap();
		assert_eq!(page.entries.len(), 2);
		assert!(page.has_more);
		let rest = repo.get_content_changes(page.latest_token.as_deref(), 10).await.unwrap();
		assert_eq!(rest.entries.len(), 1);
		assert_eq!(rest.entries[0].change_type, ChangeType::Deleted);
		assert!(!rest.has_more);
	}

	#[tokio::test]
	async fn test_truncated_log_rejects_old_token() {
		let repo = MemoryRepository::new();
		repo.create_document(ROOT_ID, "a", None).await.unwrap();
		repo.truncate_change_log();
		let result = repo.get_content_changes(Some("0"), 10).await;
		assert!(matches!(result, Err(RemoteError::InvalidChangeToken { .. })));
	}

	#[tokio::test]
	async fn test_injected_failure_is_consumed() {
		let repo = MemoryRepository::new();
		repo.inject_failure(RemoteError::Connection { message: "down".to_string() });
		assert!(repo.get_object_by_id(ROOT_ID).await.is_err());
		assert!(repo.get_object_by_id(ROOT_ID).await.is_ok());
	}

	#[tokio::test]
	async fn test_move_and_delete_tree() {
		let repo = MemoryRepository::new();
		let a = repo.create_folder(ROOT_ID, "a").await.unwrap();
		let b = repo.create_folder(ROOT_ID, "b").await.unwrap();
		let doc = repo.create_document(&a.id, "x", None).await.unwrap();

		let moved = repo.move_object(&doc.id, &a.id, &b.id).await.unwrap();
		assert_eq!(moved.paths, vec!["/b/x".to_string()]);

		repo.delete_tree(&b.id).await.unwrap();
		assert!(repo.get_object_by_id(&doc.id).await.is_err());
		assert_eq!(repo.object_count(), 2);
	}
}

// vim: ts=4
