//! notely-core - Core library for Notely
//!
//! This crate contains the note model, the remote API client, and the
//! client-side state used by every Notely interface: the partitioned note
//! store, the TTL cache, the durable sync queue, and the offline request
//! cache that stands in for a browser service worker.

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod filters;
pub mod models;
pub mod offline;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteDraft, NoteId, NoteUpdate};
