//! Durable FIFO queue of pending write operations.
//!
//! Writes that could not reach the API are appended here and replayed
//! later, strictly in submission order and one at a time. A pass stops at
//! the first failure so later operations never overtake an earlier one.
//! An operation that fails [`MAX_RETRIES`] times is discarded.

mod storage;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use storage::{FileStore, KeyValueStore, MemoryStore};

use crate::api::NotesApi;
use crate::error::{Error, Result};
use crate::models::{NoteDraft, NoteId};

/// Durable storage key holding the serialized queue.
pub const SYNC_QUEUE_KEY: &str = "sync-queue";

/// Failed attempts after which an operation is dropped.
pub const MAX_RETRIES: u32 = 3;

/// Operation type, serialized as the lowercase tag (`"create"`, ...).
///
/// Unrecognized tags survive a load as `Unknown` and fail at execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncOperationKind {
    Create,
    Update,
    Delete,
    Archive,
    Unarchive,
    Unknown(String),
}

impl SyncOperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for SyncOperationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "archive" => Self::Archive,
            "unarchive" => Self::Unarchive,
            _ => Self::Unknown(value),
        }
    }
}

impl From<SyncOperationKind> for String {
    fn from(value: SyncOperationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SyncOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued mutation awaiting replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    #[serde(rename = "type")]
    pub kind: SyncOperationKind,
    pub data: serde_json::Value,
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub retries: u32,
}

/// An operation before it is stamped and queued.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub kind: SyncOperationKind,
    pub data: serde_json::Value,
}

impl PendingOperation {
    /// Create a note. `local_id` names the optimistic copy so later queued
    /// operations on it can be pointed at the server id once it exists.
    pub fn create(draft: &NoteDraft, local_id: Option<&NoteId>) -> Self {
        let mut data = serde_json::json!({ "title": draft.title, "body": draft.body });
        if let Some(local_id) = local_id {
            data["localId"] = serde_json::Value::String(local_id.to_string());
        }
        Self {
            kind: SyncOperationKind::Create,
            data,
        }
    }

    pub fn update(id: &NoteId, draft: &NoteDraft) -> Self {
        Self {
            kind: SyncOperationKind::Update,
            data: serde_json::json!({ "id": id, "title": draft.title, "body": draft.body }),
        }
    }

    pub fn delete(id: &NoteId) -> Self {
        Self::targeting(SyncOperationKind::Delete, id)
    }

    pub fn archive(id: &NoteId) -> Self {
        Self::targeting(SyncOperationKind::Archive, id)
    }

    pub fn unarchive(id: &NoteId) -> Self {
        Self::targeting(SyncOperationKind::Unarchive, id)
    }

    fn targeting(kind: SyncOperationKind, id: &NoteId) -> Self {
        Self {
            kind,
            data: serde_json::json!({ "id": id }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePayload {
    title: String,
    body: String,
    #[serde(default)]
    local_id: Option<NoteId>,
}

#[derive(Debug, Deserialize)]
struct UpdatePayload {
    id: NoteId,
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct TargetPayload {
    id: NoteId,
}

/// A queued operation decoded into its typed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Create {
        /// Id of the optimistic copy, when one was shown locally.
        local_id: Option<NoteId>,
        draft: NoteDraft,
    },
    Update {
        id: NoteId,
        draft: NoteDraft,
    },
    Delete(NoteId),
    Archive(NoteId),
    Unarchive(NoteId),
}

impl SyncOperation {
    /// Decode `data` according to `kind`.
    ///
    /// Fails with [`Error::UnknownOperation`] for unrecognized kinds and
    /// with [`Error::InvalidOperation`] for malformed payloads.
    pub fn change(&self) -> Result<PendingChange> {
        let change = match &self.kind {
            SyncOperationKind::Create => {
                let payload: CreatePayload = decode_payload(self)?;
                PendingChange::Create {
                    local_id: payload.local_id,
                    draft: NoteDraft {
                        title: payload.title,
                        body: payload.body,
                    },
                }
            }
            SyncOperationKind::Update => {
                let payload: UpdatePayload = decode_payload(self)?;
                PendingChange::Update {
                    id: payload.id,
                    draft: NoteDraft {
                        title: payload.title,
                        body: payload.body,
                    },
                }
            }
            SyncOperationKind::Delete => {
                PendingChange::Delete(decode_payload::<TargetPayload>(self)?.id)
            }
            SyncOperationKind::Archive => {
                PendingChange::Archive(decode_payload::<TargetPayload>(self)?.id)
            }
            SyncOperationKind::Unarchive => {
                PendingChange::Unarchive(decode_payload::<TargetPayload>(self)?.id)
            }
            SyncOperationKind::Unknown(kind) => return Err(Error::UnknownOperation(kind.clone())),
        };
        Ok(change)
    }
}

/// Result of one `process_queue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another pass was already running; nothing was done.
    Skipped,
    /// Every queued operation was applied.
    Drained { applied: usize },
    /// The pass stopped at a failing operation.
    Stalled {
        applied: usize,
        operation_id: i64,
        retries: u32,
        dropped: bool,
        error: String,
    },
}

#[derive(Debug, Default)]
struct QueueState {
    operations: Vec<SyncOperation>,
    last_id: i64,
}

/// Resets the re-entrancy flag when a pass ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Persistent queue of writes replayed against the notes API.
pub struct SyncQueue {
    api: Arc<dyn NotesApi>,
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<QueueState>,
    processing: AtomicBool,
}

impl SyncQueue {
    /// Open the queue, restoring any operations persisted by a previous run.
    pub fn new(api: Arc<dyn NotesApi>, storage: Arc<dyn KeyValueStore>) -> Self {
        let operations = load_operations(storage.as_ref());
        let last_id = operations.iter().map(|op| op.id).max().unwrap_or(0);
        if !operations.is_empty() {
            tracing::info!(pending = operations.len(), "Restored sync queue");
        }
        Self {
            api,
            storage,
            state: Mutex::new(QueueState {
                operations,
                last_id,
            }),
            processing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write failures are logged and swallowed; the in-memory queue stays
    /// authoritative for this session.
    fn persist(&self, operations: &[SyncOperation]) {
        let result = serde_json::to_string(operations)
            .map_err(Error::from)
            .and_then(|raw| self.storage.set(SYNC_QUEUE_KEY, &raw));
        if let Err(error) = result {
            tracing::warn!("Failed to persist sync queue: {error}");
        }
    }

    /// Append an operation and persist the queue.
    pub fn add(&self, pending: PendingOperation) -> SyncOperation {
        let mut state = self.lock();
        let id = crate::util::unix_timestamp_millis_now().max(state.last_id + 1);
        state.last_id = id;

        let operation = SyncOperation {
            kind: pending.kind,
            data: pending.data,
            id,
            timestamp: Utc::now(),
            retries: 0,
        };
        state.operations.push(operation.clone());
        self.persist(&state.operations);
        tracing::debug!(id, kind = %operation.kind, "Queued sync operation");
        operation
    }

    /// Snapshot of pending operations in execution order.
    pub fn queue(&self) -> Vec<SyncOperation> {
        self.lock().operations.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().operations.is_empty()
    }

    /// Drop every pending operation.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.operations.clear();
        if let Err(error) = self.storage.remove(SYNC_QUEUE_KEY) {
            tracing::warn!("Failed to clear persisted sync queue: {error}");
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Replay queued operations in order until the queue is empty or one
    /// fails. Concurrent calls are ignored while a pass is running.
    pub async fn process_queue(&self) -> ProcessOutcome {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync queue pass already running; ignoring call");
            return ProcessOutcome::Skipped;
        }
        let _guard = ProcessingGuard(&self.processing);

        let mut applied = 0;
        loop {
            let Some(operation) = self.lock().operations.first().cloned() else {
                if applied > 0 {
                    tracing::info!(applied, "Sync queue drained");
                }
                return ProcessOutcome::Drained { applied };
            };

            match self.execute_operation(&operation).await {
                Ok(created) => {
                    self.complete(&operation, created.as_ref());
                    applied += 1;
                }
                Err(error) => {
                    let (retries, dropped) = self.record_failure(operation.id);
                    if dropped {
                        tracing::warn!(
                            id = operation.id,
                            kind = %operation.kind,
                            retries,
                            "Dropping sync operation after repeated failures: {error}"
                        );
                    } else {
                        tracing::warn!(
                            id = operation.id,
                            kind = %operation.kind,
                            retries,
                            "Sync operation failed: {error}"
                        );
                    }
                    return ProcessOutcome::Stalled {
                        applied,
                        operation_id: operation.id,
                        retries,
                        dropped,
                        error: error.to_string(),
                    };
                }
            }
        }
    }

    /// Run one operation against the API.
    ///
    /// Returns the server id of a created note, when the operation was a
    /// create.
    pub async fn execute_operation(&self, operation: &SyncOperation) -> Result<Option<NoteId>> {
        match operation.change()? {
            PendingChange::Create { draft, .. } => {
                let note = self.api.create(&draft).await?;
                Ok(Some(note.id))
            }
            PendingChange::Update { id, draft } => {
                self.api.update(&id, &draft).await?;
                Ok(None)
            }
            PendingChange::Delete(id) => {
                self.api.delete(&id).await?;
                Ok(None)
            }
            PendingChange::Archive(id) => {
                self.api.archive(&id).await?;
                Ok(None)
            }
            PendingChange::Unarchive(id) => {
                self.api.unarchive(&id).await?;
                Ok(None)
            }
        }
    }

    /// Pop a successfully applied operation and, for creates of an
    /// optimistic note, point later operations at the server id.
    fn complete(&self, operation: &SyncOperation, created: Option<&NoteId>) {
        let local_id = if operation.kind == SyncOperationKind::Create {
            decode_payload::<CreatePayload>(operation)
                .ok()
                .and_then(|payload| payload.local_id)
        } else {
            None
        };

        let mut state = self.lock();
        state.operations.retain(|queued| queued.id != operation.id);

        if let (Some(local_id), Some(server_id)) = (local_id, created) {
            for queued in &mut state.operations {
                if queued.data.get("id").and_then(serde_json::Value::as_str)
                    == Some(local_id.as_str())
                {
                    queued.data["id"] = serde_json::Value::String(server_id.to_string());
                }
            }
            tracing::debug!(%local_id, %server_id, "Remapped queued operations to server id");
        }

        self.persist(&state.operations);
    }

    /// Count a failed attempt; drop the operation once it is out of retries.
    fn record_failure(&self, operation_id: i64) -> (u32, bool) {
        let mut state = self.lock();
        let Some(index) = state
            .operations
            .iter()
            .position(|queued| queued.id == operation_id)
        else {
            // Cleared while in flight.
            return (0, false);
        };

        state.operations[index].retries += 1;
        let retries = state.operations[index].retries;
        let dropped = retries >= MAX_RETRIES;
        if dropped {
            state.operations.remove(index);
        }
        self.persist(&state.operations);
        (retries, dropped)
    }
}

fn decode_payload<T: DeserializeOwned>(operation: &SyncOperation) -> Result<T> {
    serde_json::from_value(operation.data.clone()).map_err(|error| Error::InvalidOperation {
        kind: operation.kind.to_string(),
        reason: error.to_string(),
    })
}

fn load_operations(storage: &dyn KeyValueStore) -> Vec<SyncOperation> {
    let raw = match storage.get(SYNC_QUEUE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(error) => {
            tracing::warn!("Failed to read persisted sync queue: {error}");
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        tracing::warn!("Discarding unreadable sync queue: {error}");
        Vec::new()
    })
}
