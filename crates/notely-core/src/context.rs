//! Application services wired together for a single client session.
//!
//! Writes try the API first. A transport failure queues the write and
//! applies it to the local store so the UI stays responsive offline; an
//! error reported by the API itself is returned to the caller untouched.
//!
//! Writes still waiting in the queue are laid over the store whenever it is
//! (re)built, so a fresh session sees the same notes the last one left.

use std::sync::Arc;

use chrono::Utc;

use crate::api::NotesApi;
use crate::cache::{CacheCategory, CacheManager};
use crate::error::{Error, Result};
use crate::filters::{filter_notes, normalize_query};
use crate::models::{Note, NoteDraft, NoteId, NoteUpdate};
use crate::store::{NoteStore, StoreStats};
use crate::sync::{KeyValueStore, PendingChange, PendingOperation, ProcessOutcome, SyncQueue};

const ACTIVE_KEY: &str = "notes:active";
const ARCHIVED_KEY: &str = "notes:archived";

/// How a write reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Applied by the API.
    Synced,
    /// Queued for replay and applied locally.
    Queued,
}

/// Outcome of a write: the affected note (when it still exists) and how it
/// was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult<T> {
    pub value: T,
    pub mode: WriteMode,
}

impl<T> WriteResult<T> {
    const fn synced(value: T) -> Self {
        Self {
            value,
            mode: WriteMode::Synced,
        }
    }

    const fn queued(value: T) -> Self {
        Self {
            value,
            mode: WriteMode::Queued,
        }
    }
}

pub struct NotesContext {
    api: Arc<dyn NotesApi>,
    store: NoteStore,
    cache: CacheManager<Vec<Note>>,
    queue: Arc<SyncQueue>,
}

impl NotesContext {
    pub fn new(api: Arc<dyn NotesApi>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_cache(api, storage, CacheManager::new())
    }

    pub fn with_cache(
        api: Arc<dyn NotesApi>,
        storage: Arc<dyn KeyValueStore>,
        cache: CacheManager<Vec<Note>>,
    ) -> Self {
        let context = Self {
            store: NoteStore::new(api.clone()),
            queue: Arc::new(SyncQueue::new(api.clone(), storage)),
            api,
            cache,
        };
        context.overlay_pending();
        context
    }

    pub const fn store(&self) -> &NoteStore {
        &self.store
    }

    pub const fn cache(&self) -> &CacheManager<Vec<Note>> {
        &self.cache
    }

    /// Shared handle to the queue, e.g. for [`crate::offline::forward_sync_requests`].
    pub fn queue(&self) -> Arc<SyncQueue> {
        self.queue.clone()
    }

    /// Reload both partitions from the API and reseed the list caches.
    pub async fn refresh(&self) -> Result<StoreStats> {
        self.store.try_load_from_api().await?;
        self.overlay_pending();
        let stats = self.store.stats();
        self.invalidate();
        self.cache
            .set(ACTIVE_KEY, self.store.active_notes(), CacheCategory::Notes);
        self.cache
            .set(ARCHIVED_KEY, self.store.archived_notes(), CacheCategory::Archive);
        Ok(stats)
    }

    /// Notes in one partition, in store order.
    pub fn list(&self, archived: bool) -> Vec<Note> {
        let (key, category) = list_slot(archived);
        if let Some(notes) = self.cache.get(key, category) {
            return notes;
        }
        let notes = if archived {
            self.store.archived_notes()
        } else {
            self.store.active_notes()
        };
        self.cache.set(key, notes.clone(), category);
        notes
    }

    /// Case-insensitive search within one partition, memoised per query.
    pub fn search(&self, query: &str, archived: bool) -> Vec<Note> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return self.list(archived);
        }

        let scope = if archived { "archived" } else { "active" };
        let key = format!("{scope}:{normalized}");
        if let Some(hits) = self.cache.get(&key, CacheCategory::Search) {
            return hits;
        }
        let hits = filter_notes(&self.list(archived), &normalized);
        self.cache.set(key, hits.clone(), CacheCategory::Search);
        hits
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// A single note, from the store when known, otherwise from the API.
    ///
    /// Local ids are never sent to the API.
    pub async fn get(&self, id: &NoteId) -> Result<Note> {
        if let Some(note) = self.store.get_note(id) {
            return Ok(note);
        }
        if id.is_local() {
            return Err(Error::NotFound(id.to_string()));
        }
        self.api.get(id).await
    }

    /// Title and body most recently queued for `id`, if any write to it is
    /// still waiting for sync.
    pub fn pending_draft(&self, id: &NoteId) -> Option<NoteDraft> {
        self.queue
            .queue()
            .iter()
            .rev()
            .find_map(|operation| match operation.change().ok()? {
                PendingChange::Update { id: target, draft } if &target == id => Some(draft),
                PendingChange::Create {
                    local_id: Some(local_id),
                    draft,
                } if &local_id == id => Some(draft),
                _ => None,
            })
    }

    pub async fn create(&self, draft: &NoteDraft) -> Result<WriteResult<Note>> {
        let result = match self.api.create(draft).await {
            Ok(note) => {
                self.store.add_note(note.clone());
                WriteResult::synced(note)
            }
            Err(error) if error.is_transport() => {
                tracing::warn!("Create failed offline, queueing: {error}");
                let note = Note::local(draft);
                self.queue
                    .add(PendingOperation::create(draft, Some(&note.id)));
                self.store.add_note(note.clone());
                WriteResult::queued(note)
            }
            Err(error) => return Err(error),
        };
        self.invalidate();
        Ok(result)
    }

    pub async fn update(&self, id: &NoteId, draft: &NoteDraft) -> Result<WriteResult<Note>> {
        let known = self.store.get_note(id);
        if id.is_local() {
            // Only the queue knows this note; the create replay remaps the id.
            let Some(mut note) = known else {
                return Err(Error::NotFound(id.to_string()));
            };
            let update = NoteUpdate::from_draft(draft);
            self.queue.add(PendingOperation::update(id, draft));
            self.store.update_note(id, &update);
            update.apply(&mut note);
            self.invalidate();
            return Ok(WriteResult::queued(note));
        }

        let result = match self.api.update(id, draft).await {
            Ok(server) => {
                let update = NoteUpdate {
                    title: Some(server.title.clone()),
                    body: Some(server.body.clone()),
                    last_modified: server.last_modified,
                };
                if !self.store.update_note(id, &update) {
                    self.store.add_note(server.clone());
                }
                WriteResult::synced(self.store.get_note(id).unwrap_or(server))
            }
            Err(error) if error.is_transport() => {
                tracing::warn!(%id, "Update failed offline, queueing: {error}");
                self.queue.add(PendingOperation::update(id, draft));
                let update = NoteUpdate::from_draft(draft);
                let note = match known {
                    Some(mut note) => {
                        self.store.update_note(id, &update);
                        update.apply(&mut note);
                        note
                    }
                    // Not loaded this session: report the draft as written.
                    None => Note::drafted(id.clone(), draft, Utc::now()),
                };
                WriteResult::queued(note)
            }
            Err(error) => return Err(error),
        };
        self.invalidate();
        Ok(result)
    }

    pub async fn delete(&self, id: &NoteId) -> Result<WriteResult<()>> {
        let result = self.apply_or_queue(id, TargetAction::Delete).await?;
        self.store.delete_note(id);
        self.invalidate();
        Ok(result)
    }

    pub async fn archive(&self, id: &NoteId) -> Result<WriteResult<()>> {
        let result = self.apply_or_queue(id, TargetAction::Archive).await?;
        self.store.archive_note(id);
        self.invalidate();
        Ok(result)
    }

    pub async fn unarchive(&self, id: &NoteId) -> Result<WriteResult<()>> {
        let result = self.apply_or_queue(id, TargetAction::Unarchive).await?;
        self.store.unarchive_note(id);
        self.invalidate();
        Ok(result)
    }

    /// Replay the queue; a fully drained queue is followed by a refresh so
    /// local ids are replaced with server ones.
    ///
    /// A failed refresh is logged and leaves the store as it was; the
    /// outcome of the replay is returned either way.
    pub async fn sync(&self) -> ProcessOutcome {
        let outcome = self.queue.process_queue().await;
        if matches!(outcome, ProcessOutcome::Drained { .. }) {
            if let Err(error) = self.refresh().await {
                tracing::warn!("Refresh after sync failed: {error}");
            }
        }
        outcome
    }

    /// Drop every cached list and search result.
    pub fn invalidate(&self) {
        self.cache.clear(None);
    }

    /// Apply queued writes to the store, oldest first.
    fn overlay_pending(&self) {
        let operations = self.queue.queue();
        if operations.is_empty() {
            return;
        }
        for operation in &operations {
            let change = match operation.change() {
                Ok(change) => change,
                Err(error) => {
                    tracing::debug!(id = operation.id, "Skipping queued operation: {error}");
                    continue;
                }
            };
            match change {
                PendingChange::Create {
                    local_id: Some(local_id),
                    draft,
                } => {
                    self.store
                        .add_note(Note::drafted(local_id, &draft, operation.timestamp));
                }
                PendingChange::Create { local_id: None, .. } => {}
                PendingChange::Update { id, draft } => {
                    let mut update = NoteUpdate::from_draft(&draft);
                    update.last_modified = Some(operation.timestamp);
                    self.store.update_note(&id, &update);
                }
                PendingChange::Delete(id) => self.store.delete_note(&id),
                PendingChange::Archive(id) => {
                    self.store.archive_note(&id);
                }
                PendingChange::Unarchive(id) => {
                    self.store.unarchive_note(&id);
                }
            }
        }
        tracing::debug!(pending = operations.len(), "Applied queued writes to store");
    }

    async fn apply_or_queue(&self, id: &NoteId, action: TargetAction) -> Result<WriteResult<()>> {
        if id.is_local() {
            self.queue.add(action.pending(id));
            return Ok(WriteResult::queued(()));
        }

        let sent = match action {
            TargetAction::Delete => self.api.delete(id).await,
            TargetAction::Archive => self.api.archive(id).await,
            TargetAction::Unarchive => self.api.unarchive(id).await,
        };
        match sent {
            Ok(message) => {
                tracing::debug!(%id, action = action.label(), %message, "Applied note write");
                Ok(WriteResult::synced(()))
            }
            Err(error) if error.is_transport() => {
                tracing::warn!(%id, action = action.label(), "Write failed offline, queueing: {error}");
                self.queue.add(action.pending(id));
                Ok(WriteResult::queued(()))
            }
            Err(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TargetAction {
    Delete,
    Archive,
    Unarchive,
}

impl TargetAction {
    const fn label(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Unarchive => "unarchive",
        }
    }

    fn pending(self, id: &NoteId) -> PendingOperation {
        match self {
            Self::Delete => PendingOperation::delete(id),
            Self::Archive => PendingOperation::archive(id),
            Self::Unarchive => PendingOperation::unarchive(id),
        }
    }
}

const fn list_slot(archived: bool) -> (&'static str, CacheCategory) {
    if archived {
        (ARCHIVED_KEY, CacheCategory::Archive)
    } else {
        (ACTIVE_KEY, CacheCategory::Notes)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::tests::note;
    use crate::sync::MemoryStore;

    /// In-memory stand-in for the notes server that can be taken offline.
    #[derive(Default)]
    struct FakeServer {
        notes: Mutex<Vec<Note>>,
        offline: AtomicBool,
        lists_offline: AtomicBool,
        next_id: AtomicUsize,
        list_calls: AtomicUsize,
    }

    async fn transport_error() -> Error {
        reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err()
            .into()
    }

    impl FakeServer {
        fn seeded(notes: Vec<Note>) -> Self {
            Self {
                notes: Mutex::new(notes),
                ..Self::default()
            }
        }

        async fn reachable(&self) -> Result<()> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(transport_error().await);
            }
            Ok(())
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn with_note<T>(&self, id: &NoteId, f: impl FnOnce(&mut Note) -> T) -> Result<T> {
            let mut notes = self.notes.lock().unwrap();
            let note = notes
                .iter_mut()
                .find(|note| &note.id == id)
                .ok_or_else(|| Error::Api(format!("Note {id} not found")))?;
            Ok(f(note))
        }

        fn titles(&self) -> Vec<String> {
            self.notes
                .lock()
                .unwrap()
                .iter()
                .map(|note| note.title.clone())
                .collect()
        }
    }

    #[async_trait]
    impl NotesApi for FakeServer {
        async fn list_active(&self) -> Result<Vec<Note>> {
            self.reachable().await?;
            if self.lists_offline.load(Ordering::SeqCst) {
                return Err(transport_error().await);
            }
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let notes = self.notes.lock().unwrap();
            Ok(notes.iter().filter(|note| !note.archived).cloned().collect())
        }

        async fn list_archived(&self) -> Result<Vec<Note>> {
            self.reachable().await?;
            let notes = self.notes.lock().unwrap();
            Ok(notes.iter().filter(|note| note.archived).cloned().collect())
        }

        async fn get(&self, id: &NoteId) -> Result<Note> {
            self.reachable().await?;
            self.with_note(id, |note| note.clone())
        }

        async fn create(&self, draft: &NoteDraft) -> Result<Note> {
            self.reachable().await?;
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut created = note(&format!("notes-{n}"), &draft.title);
            created.body.clone_from(&draft.body);
            self.notes.lock().unwrap().push(created.clone());
            Ok(created)
        }

        async fn update(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note> {
            self.reachable().await?;
            self.with_note(id, |note| {
                note.title.clone_from(&draft.title);
                note.body.clone_from(&draft.body);
                note.clone()
            })
        }

        async fn delete(&self, id: &NoteId) -> Result<String> {
            self.reachable().await?;
            self.with_note(id, |_| ())?;
            self.notes.lock().unwrap().retain(|note| &note.id != id);
            Ok("Note deleted".to_string())
        }

        async fn archive(&self, id: &NoteId) -> Result<String> {
            self.reachable().await?;
            self.with_note(id, |note| note.archived = true)?;
            Ok("Note archived".to_string())
        }

        async fn unarchive(&self, id: &NoteId) -> Result<String> {
            self.reachable().await?;
            self.with_note(id, |note| note.archived = false)?;
            Ok("Note unarchived".to_string())
        }
    }

    fn context(server: &Arc<FakeServer>) -> NotesContext {
        NotesContext::new(server.clone(), Arc::new(MemoryStore::new()))
    }

    fn draft(title: &str) -> NoteDraft {
        NoteDraft::new(title, format!("{title} body")).unwrap()
    }

    #[tokio::test]
    async fn refresh_seeds_store_and_list_cache() {
        let mut archived = note("n2", "Old");
        archived.archived = true;
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Fresh"), archived]));
        let ctx = context(&server);

        let stats = ctx.refresh().await.unwrap();
        assert_eq!(stats.total_count, 2);
        assert_eq!(ctx.list(false)[0].title, "Fresh");
        assert_eq!(ctx.list(true)[0].title, "Old");
        assert_eq!(ctx.cache().stats().total_entries, 2);
    }

    #[tokio::test]
    async fn search_is_memoised_and_invalidated_by_writes() {
        let server = Arc::new(FakeServer::seeded(vec![
            note("n1", "Groceries"),
            note("n2", "Standup"),
        ]));
        let ctx = context(&server);
        ctx.refresh().await.unwrap();

        assert_eq!(ctx.search("GROC", false).len(), 1);
        assert_eq!(
            ctx.cache().stats().by_category[&CacheCategory::Search],
            1
        );

        ctx.create(&draft("Grocery run")).await.unwrap();
        assert_eq!(ctx.cache().stats().total_entries, 0);
        assert_eq!(ctx.search("groc", false).len(), 2);
    }

    #[tokio::test]
    async fn online_writes_apply_to_server_and_store() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "First")]));
        let ctx = context(&server);
        ctx.refresh().await.unwrap();

        let created = ctx.create(&draft("Second")).await.unwrap();
        assert_eq!(created.mode, WriteMode::Synced);
        assert_eq!(created.value.id.as_str(), "notes-0");

        let updated = ctx
            .update(&NoteId::new("n1"), &draft("First (edited)"))
            .await
            .unwrap();
        assert_eq!(updated.value.title, "First (edited)");

        ctx.archive(&NoteId::new("n1")).await.unwrap();
        assert!(ctx.store().get_note(&NoteId::new("n1")).unwrap().archived);
        ctx.unarchive(&NoteId::new("n1")).await.unwrap();
        ctx.delete(&created.value.id).await.unwrap();

        assert_eq!(server.titles(), vec!["First (edited)".to_string()]);
        assert_eq!(ctx.stats().total_count, 1);
        assert!(ctx.queue().is_empty());
    }

    #[tokio::test]
    async fn api_errors_are_returned_without_queueing() {
        let server = Arc::new(FakeServer::default());
        let ctx = context(&server);

        let error = ctx.archive(&NoteId::new("missing")).await.unwrap_err();
        assert!(matches!(error, Error::Api(_)));
        assert!(ctx.queue().is_empty());
    }

    #[tokio::test]
    async fn offline_writes_are_queued_and_replayed_on_sync() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Existing")]));
        let ctx = context(&server);
        ctx.refresh().await.unwrap();
        server.set_offline(true);

        let created = ctx.create(&draft("Written offline")).await.unwrap();
        assert_eq!(created.mode, WriteMode::Queued);
        assert!(created.value.id.is_local());

        let archived = ctx.archive(&created.value.id).await.unwrap();
        assert_eq!(archived.mode, WriteMode::Queued);
        ctx.update(&NoteId::new("n1"), &draft("Edited offline"))
            .await
            .unwrap();

        assert_eq!(ctx.queue().len(), 3);
        assert_eq!(ctx.list(true)[0].title, "Written offline");
        assert_eq!(ctx.list(false)[0].title, "Edited offline");

        let stalled = ctx.sync().await;
        assert!(matches!(stalled, ProcessOutcome::Stalled { applied: 0, .. }));

        server.set_offline(false);
        let outcome = ctx.sync().await;
        assert_eq!(outcome, ProcessOutcome::Drained { applied: 3 });
        assert!(ctx.queue().is_empty());

        let archived = ctx.list(true);
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id.as_str(), "notes-0");
        assert_eq!(ctx.list(false)[0].title, "Edited offline");
    }

    #[tokio::test]
    async fn get_prefers_store_and_falls_back_to_api() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Remote")]));
        let ctx = context(&server);

        assert_eq!(ctx.get(&NoteId::new("n1")).await.unwrap().title, "Remote");

        server.set_offline(true);
        assert!(ctx.get(&NoteId::new("n1")).await.is_err());
        let local = ctx.create(&draft("Local only")).await.unwrap().value;
        assert_eq!(ctx.get(&local.id).await.unwrap().title, "Local only");
    }

    #[tokio::test]
    async fn offline_update_of_unloaded_note_is_queued() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Remote")]));
        server.set_offline(true);
        let ctx = context(&server);

        let updated = ctx
            .update(&NoteId::new("n1"), &draft("Edited elsewhere"))
            .await
            .unwrap();
        assert_eq!(updated.mode, WriteMode::Queued);
        assert_eq!(updated.value.title, "Edited elsewhere");
        assert_eq!(ctx.queue().len(), 1);
        assert_eq!(ctx.stats().total_count, 0);
        assert_eq!(
            ctx.pending_draft(&NoteId::new("n1")),
            Some(draft("Edited elsewhere"))
        );

        server.set_offline(false);
        assert_eq!(ctx.sync().await, ProcessOutcome::Drained { applied: 1 });
        assert_eq!(server.titles(), vec!["Edited elsewhere".to_string()]);
    }

    #[tokio::test]
    async fn new_session_sees_writes_queued_by_the_last_one() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Remote")]));
        let storage = Arc::new(MemoryStore::new());
        server.set_offline(true);

        let first = NotesContext::new(server.clone(), storage.clone());
        let local = first.create(&draft("Offline")).await.unwrap().value;
        first
            .update(&local.id, &draft("Offline (edited)"))
            .await
            .unwrap();
        first.archive(&NoteId::new("n1")).await.unwrap();
        drop(first);

        let second = NotesContext::new(server.clone(), storage);
        let restored = second.get(&local.id).await.unwrap();
        assert_eq!(restored.title, "Offline (edited)");
        assert_eq!(
            second.pending_draft(&local.id),
            Some(draft("Offline (edited)"))
        );

        server.set_offline(false);
        second.refresh().await.unwrap();
        assert_eq!(second.list(false).len(), 1);
        assert_eq!(second.list(false)[0].id, local.id);
        assert_eq!(second.list(true)[0].id.as_str(), "n1");
    }

    #[tokio::test]
    async fn unknown_local_id_is_not_looked_up_remotely() {
        let server = Arc::new(FakeServer::default());
        let ctx = context(&server);

        let error = ctx.get(&NoteId::local()).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn sync_reports_drained_queue_when_refresh_fails() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Remote")]));
        let ctx = context(&server);
        ctx.refresh().await.unwrap();
        server.set_offline(true);
        ctx.archive(&NoteId::new("n1")).await.unwrap();

        server.set_offline(false);
        server.lists_offline.store(true, Ordering::SeqCst);
        let outcome = ctx.sync().await;
        assert_eq!(outcome, ProcessOutcome::Drained { applied: 1 });
        assert!(ctx.queue().is_empty());
        assert!(ctx.store().get_note(&NoteId::new("n1")).unwrap().archived);
    }

    #[tokio::test]
    async fn list_is_served_from_cache_between_refreshes() {
        let server = Arc::new(FakeServer::seeded(vec![note("n1", "Cached")]));
        let ctx = context(&server);
        ctx.refresh().await.unwrap();
        let calls = server.list_calls.load(Ordering::SeqCst);

        ctx.list(false);
        ctx.search("cached", false);
        assert_eq!(server.list_calls.load(Ordering::SeqCst), calls);
    }
}
