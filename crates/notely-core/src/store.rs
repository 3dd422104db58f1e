//! In-memory note store partitioned into active and archived notes.
//!
//! The store is the single source of truth for rendering. A note id lives in
//! exactly one partition, and the partition always agrees with
//! `note.archived`. Snapshots come back in insertion order; callers sort for
//! display.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::api::NotesApi;
use crate::error::Result;
use crate::models::{Note, NoteId, NoteUpdate};

/// Partition sizes at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub active_count: usize,
    pub archived_count: usize,
    pub total_count: usize,
}

/// One partition: id -> (insertion sequence, note).
#[derive(Debug, Default)]
struct Partition {
    entries: HashMap<NoteId, (u64, Note)>,
}

impl Partition {
    fn from_notes(notes: Vec<Note>, archived: bool, next_seq: &mut u64) -> Self {
        let mut partition = Self::default();
        for mut note in notes {
            note.archived = archived;
            partition.insert(note, next_seq);
        }
        partition
    }

    /// Insert or overwrite; an overwritten note keeps its position.
    fn insert(&mut self, note: Note, next_seq: &mut u64) {
        if let Some((_, existing)) = self.entries.get_mut(&note.id) {
            *existing = note;
            return;
        }
        let seq = *next_seq;
        *next_seq += 1;
        self.entries.insert(note.id.clone(), (seq, note));
    }

    fn snapshot(&self) -> Vec<Note> {
        let mut ordered = self.entries.values().collect::<Vec<_>>();
        ordered.sort_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, note)| note.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct Partitions {
    active: Partition,
    archived: Partition,
    next_seq: u64,
}

/// Authoritative in-memory representation of all known notes.
pub struct NoteStore {
    api: Arc<dyn NotesApi>,
    state: RwLock<Partitions>,
    load_lock: tokio::sync::Mutex<()>,
}

impl NoteStore {
    pub fn new(api: Arc<dyn NotesApi>) -> Self {
        Self {
            api,
            state: RwLock::new(Partitions::default()),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Partitions) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Partitions) -> T) -> T {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn active_notes(&self) -> Vec<Note> {
        self.read(|state| state.active.snapshot())
    }

    pub fn archived_notes(&self) -> Vec<Note> {
        self.read(|state| state.archived.snapshot())
    }

    /// Look a note up, active partition first.
    pub fn get_note(&self, id: &NoteId) -> Option<Note> {
        self.read(|state| {
            state
                .active
                .entries
                .get(id)
                .or_else(|| state.archived.entries.get(id))
                .map(|(_, note)| note.clone())
        })
    }

    /// Insert into the active partition, forcing `archived = false`.
    pub fn add_note(&self, mut note: Note) {
        note.archived = false;
        self.write(|state| {
            state.archived.entries.remove(&note.id);
            let Partitions {
                active, next_seq, ..
            } = state;
            active.insert(note, next_seq);
        });
    }

    /// Shallow-merge `update` into the note wherever it lives.
    ///
    /// Returns `false` when the id is unknown.
    pub fn update_note(&self, id: &NoteId, update: &NoteUpdate) -> bool {
        self.write(|state| {
            let entry = state
                .active
                .entries
                .get_mut(id)
                .or_else(|| state.archived.entries.get_mut(id));
            match entry {
                Some((_, note)) => {
                    update.apply(note);
                    true
                }
                None => false,
            }
        })
    }

    /// Remove from both partitions. Idempotent.
    pub fn delete_note(&self, id: &NoteId) {
        self.write(|state| {
            state.active.entries.remove(id);
            state.archived.entries.remove(id);
        });
    }

    /// Move an active note to the archived partition.
    ///
    /// Returns `false` when the note is not active.
    pub fn archive_note(&self, id: &NoteId) -> bool {
        self.write(|state| {
            let Some((_, mut note)) = state.active.entries.remove(id) else {
                return false;
            };
            note.archived = true;
            let Partitions {
                archived, next_seq, ..
            } = state;
            archived.insert(note, next_seq);
            true
        })
    }

    /// Move an archived note back to the active partition.
    ///
    /// Returns `false` when the note is not archived.
    pub fn unarchive_note(&self, id: &NoteId) -> bool {
        self.write(|state| {
            let Some((_, mut note)) = state.archived.entries.remove(id) else {
                return false;
            };
            note.archived = false;
            let Partitions {
                active, next_seq, ..
            } = state;
            active.insert(note, next_seq);
            true
        })
    }

    pub fn clear(&self) {
        self.write(|state| *state = Partitions::default());
    }

    pub fn stats(&self) -> StoreStats {
        self.read(|state| {
            let active_count = state.active.entries.len();
            let archived_count = state.archived.entries.len();
            StoreStats {
                active_count,
                archived_count,
                total_count: active_count + archived_count,
            }
        })
    }

    /// Replace all local state with the server's view.
    ///
    /// Both partitions are fetched before anything is touched; a failure in
    /// either call leaves the current state intact.
    pub async fn try_load_from_api(&self) -> Result<StoreStats> {
        let _loading = self.load_lock.lock().await;

        let active = self.api.list_active().await?;
        let archived = self.api.list_archived().await?;

        self.write(|state| {
            let mut next_seq = 0;
            let mut active = Partition::from_notes(active, false, &mut next_seq);
            let archived = Partition::from_notes(archived, true, &mut next_seq);
            // The server may briefly list a note in both; the archived view wins.
            active
                .entries
                .retain(|id, _| !archived.entries.contains_key(id));
            *state = Partitions {
                active,
                archived,
                next_seq,
            };
        });
        let stats = self.stats();

        tracing::info!(
            active = stats.active_count,
            archived = stats.archived_count,
            "Loaded notes from API"
        );
        Ok(stats)
    }

    /// [`Self::try_load_from_api`] reporting only success.
    pub async fn load_from_api(&self) -> bool {
        match self.try_load_from_api().await {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!("Failed to load notes from API: {error}");
                false
            }
        }
    }
}
