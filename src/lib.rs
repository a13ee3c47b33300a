//! # cmissync - Bidirectional CMIS Folder Synchronization
//!
//! cmissync keeps a local folder and a folder of a CMIS repository in
//! sync. Changes from both sides travel through one ordered event queue:
//! filters drop what must not be synchronized, transformers turn raw
//! watcher and change log notifications into object events, and the sync
//! mechanism classifies each object event on both sides and dispatches it
//! to the solver of that situation pair.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cmissync::{Config, SyncEngine};
//! use cmissync::callbacks::NoListener;
//! use cmissync::remote::MemoryRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("./Documents", "/Sites/team/documentLibrary");
//!     let repo = Arc::new(MemoryRepository::new());
//!     let mut engine = SyncEngine::new(config, repo, Arc::new(NoListener)).await?;
//!     let processed = engine.sync_once().await;
//!     println!("Processed {} events", processed);
//!     Ok(())
//! }
//! ```
//!
//! ## Listening to the engine
//!
//! ```rust,ignore
//! use cmissync::callbacks::ListenerBuilder;
//!
//! let listener = ListenerBuilder::new()
//!     .on_ignored(|event, reason| println!("Ignored {}: {}", event, reason))
//!     .on_interaction_needed(|problem| eprintln!("{}", problem))
//!     .build();
//! ```

pub mod callbacks;
pub mod config;
pub mod crawler;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod local;
pub mod logging;
pub mod manager;
pub mod mechanism;
pub mod queue;
pub mod remote;
pub mod situation;
pub mod solver;
pub mod storage;
pub mod strategies;
pub mod transformer;
pub mod transmission;

// Re-export commonly used types
pub use config::Config;
pub use engine::SyncEngine;
pub use error::{InteractionNeeded, RemoteError, SolveError, StorageError, SyncError};
pub use events::{ObjectEvent, SyncEvent};
pub use situation::SituationType;
pub use storage::{MappedObject, MetaDataStorage};
pub use strategies::ConflictResolution;

// vim: ts=4
