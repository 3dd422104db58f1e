//! The offline worker task and the handle clients use to reach it.

use std::collections::HashSet;
use std::sync::Arc;

use reqwest::Method;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{
    CacheStorage, CachedResponse, Network, OfflineRequest, API_CACHE, CURRENT_CACHES,
    RUNTIME_CACHE, SHELL_CACHE,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::sync::SyncQueue;

const EVENT_BUFFER: usize = 64;
const CLIENT_BUFFER: usize = 16;

/// Lifecycle of the worker. Requests are only intercepted once activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installed,
    Activated,
}

/// Messages posted from the worker to every connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Connectivity is back; replay the sync queue.
    SyncRequested,
    /// The worker took control of open clients.
    Claimed,
    /// A cached asset was refreshed in the background.
    CacheUpdated { url: String },
}

/// Background sync tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTag {
    SyncNotes,
    CreateNote(String),
    UpdateNote(String),
    DeleteNote(String),
    Unrecognized(String),
}

impl SyncTag {
    pub fn parse(tag: &str) -> Self {
        if tag == "sync-notes" {
            return Self::SyncNotes;
        }
        if let Some(rest) = tag.strip_prefix("create-note-") {
            return Self::CreateNote(rest.to_string());
        }
        if let Some(rest) = tag.strip_prefix("update-note-") {
            return Self::UpdateNote(rest.to_string());
        }
        if let Some(rest) = tag.strip_prefix("delete-note-") {
            return Self::DeleteNote(rest.to_string());
        }
        Self::Unrecognized(tag.to_string())
    }
}

/// What the worker did with a sync event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDispatch {
    /// `SyncRequested` was posted to this many clients.
    Broadcast { receivers: usize },
    /// Per-note tag accepted; replay happens through the sync queue.
    Acknowledged(SyncTag),
    Ignored(String),
}

enum WorkerEvent {
    Install {
        reply: oneshot::Sender<Result<usize>>,
    },
    Activate {
        reply: oneshot::Sender<Vec<String>>,
    },
    Fetch {
        request: OfflineRequest,
        reply: oneshot::Sender<Result<CachedResponse>>,
    },
    Sync {
        tag: String,
        reply: oneshot::Sender<SyncDispatch>,
    },
    State {
        reply: oneshot::Sender<WorkerState>,
    },
}

/// Client-side handle to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    events: mpsc::Sender<WorkerEvent>,
    clients: broadcast::Sender<ClientMessage>,
}

impl WorkerHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(build(reply))
            .await
            .map_err(|_| Error::Worker("worker has stopped".to_string()))?;
        response
            .await
            .map_err(|_| Error::Worker("worker dropped the reply".to_string()))
    }

    /// Pre-cache the app shell. Returns the number of cached assets.
    pub async fn install(&self) -> Result<usize> {
        self.request(|reply| WorkerEvent::Install { reply }).await?
    }

    /// Remove outdated caches and take control. Returns the deleted cache names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        self.request(|reply| WorkerEvent::Activate { reply }).await
    }

    /// Route a request through the worker.
    pub async fn fetch(&self, request: OfflineRequest) -> Result<CachedResponse> {
        self.request(|reply| WorkerEvent::Fetch { request, reply })
            .await?
    }

    /// Deliver a background sync event.
    pub async fn sync(&self, tag: &str) -> Result<SyncDispatch> {
        let tag = tag.to_string();
        self.request(|reply| WorkerEvent::Sync { tag, reply }).await
    }

    pub async fn state(&self) -> Result<WorkerState> {
        self.request(|reply| WorkerEvent::State { reply }).await
    }

    /// Listen for messages posted by the worker.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientMessage> {
        self.clients.subscribe()
    }
}

/// Everything a single fetch needs; cloned into a task per request.
#[derive(Clone)]
struct FetchRouter {
    api_base_url: Arc<str>,
    index_url: Arc<str>,
    shell_urls: Arc<HashSet<String>>,
    caches: CacheStorage,
    network: Arc<dyn Network>,
    clients: broadcast::Sender<ClientMessage>,
}

impl FetchRouter {
    fn is_api_request(&self, url: &str) -> bool {
        url.starts_with(self.api_base_url.as_ref())
    }

    fn asset_cache_for(&self, url: &str) -> &'static str {
        if self.shell_urls.contains(url) {
            SHELL_CACHE
        } else {
            RUNTIME_CACHE
        }
    }

    async fn handle(&self, request: OfflineRequest, controlled: bool) -> Result<CachedResponse> {
        if !controlled || request.method != Method::GET {
            return self.network.fetch(&request).await;
        }
        if self.is_api_request(&request.url) {
            Ok(self.network_first(&request).await)
        } else {
            Ok(self.cache_first(request).await)
        }
    }

    async fn network_first(&self, request: &OfflineRequest) -> CachedResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.caches.put(API_CACHE, &request.url, response.clone());
                }
                response
            }
            Err(error) => {
                tracing::debug!(url = %request.url, "API request failed, trying cache: {error}");
                self.caches
                    .match_in(API_CACHE, &request.url)
                    .unwrap_or_else(CachedResponse::offline_json)
            }
        }
    }

    async fn cache_first(&self, request: OfflineRequest) -> CachedResponse {
        if let Some(cached) = self.caches.match_any(&request.url) {
            let router = self.clone();
            tokio::spawn(async move { router.revalidate(request).await });
            return cached;
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.is_success() {
                    let cache = self.asset_cache_for(&request.url);
                    self.caches.put(cache, &request.url, response.clone());
                }
                response
            }
            Err(error) => {
                tracing::debug!(url = %request.url, "Asset request failed offline: {error}");
                if request.accepts_html() {
                    if let Some(index) = self.caches.match_any(&self.index_url) {
                        return index;
                    }
                }
                CachedResponse::service_unavailable()
            }
        }
    }

    async fn revalidate(&self, request: OfflineRequest) {
        match self.network.fetch(&request).await {
            Ok(response) if response.is_success() => {
                let cache = self.asset_cache_for(&request.url);
                self.caches.put(cache, &request.url, response);
                let _ = self.clients.send(ClientMessage::CacheUpdated {
                    url: request.url.clone(),
                });
            }
            Ok(response) => {
                tracing::debug!(url = %request.url, status = response.status, "Revalidation skipped");
            }
            Err(error) => {
                tracing::debug!(url = %request.url, "Revalidation failed: {error}");
            }
        }
    }
}

struct OfflineWorker {
    state: WorkerState,
    skip_waiting: bool,
    static_asset_urls: Vec<String>,
    router: FetchRouter,
}

impl OfflineWorker {
    async fn run(mut self, mut events: mpsc::Receiver<WorkerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                WorkerEvent::Install { reply } => {
                    let _ = reply.send(self.install().await);
                }
                WorkerEvent::Activate { reply } => {
                    let _ = reply.send(self.activate());
                }
                WorkerEvent::Fetch { request, reply } => {
                    let router = self.router.clone();
                    let controlled = self.state == WorkerState::Activated;
                    tokio::spawn(async move {
                        let _ = reply.send(router.handle(request, controlled).await);
                    });
                }
                WorkerEvent::Sync { tag, reply } => {
                    let _ = reply.send(self.dispatch_sync(&tag));
                }
                WorkerEvent::State { reply } => {
                    let _ = reply.send(self.state);
                }
            }
        }
        tracing::debug!("Offline worker stopped");
    }

    /// Fetch every shell asset; the shell cache is only written when all succeed.
    async fn install(&mut self) -> Result<usize> {
        let mut fetched = Vec::with_capacity(self.static_asset_urls.len());
        for url in &self.static_asset_urls {
            let response = self.router.network.fetch(&OfflineRequest::get(url)).await?;
            if !response.is_success() {
                return Err(Error::Worker(format!(
                    "pre-caching {url} failed with HTTP {}",
                    response.status
                )));
            }
            fetched.push((url.clone(), response));
        }

        let count = fetched.len();
        self.router.caches.put_all(SHELL_CACHE, fetched);
        self.state = WorkerState::Installed;
        self.skip_waiting = true;
        tracing::info!(assets = count, "Offline worker installed");
        Ok(count)
    }

    fn activate(&mut self) -> Vec<String> {
        if self.state == WorkerState::Parsed && !self.skip_waiting {
            tracing::warn!("Activating offline worker before install");
        }

        let stale = self
            .router
            .caches
            .cache_names()
            .into_iter()
            .filter(|name| !CURRENT_CACHES.contains(&name.as_str()))
            .collect::<Vec<_>>();
        for name in &stale {
            self.router.caches.delete(name);
            tracing::info!(cache = %name, "Deleted outdated cache");
        }

        self.state = WorkerState::Activated;
        let _ = self.router.clients.send(ClientMessage::Claimed);
        stale
    }

    fn dispatch_sync(&self, raw_tag: &str) -> SyncDispatch {
        match SyncTag::parse(raw_tag) {
            SyncTag::SyncNotes => {
                let receivers = self
                    .router
                    .clients
                    .send(ClientMessage::SyncRequested)
                    .unwrap_or(0);
                tracing::info!(receivers, "Background sync requested");
                SyncDispatch::Broadcast { receivers }
            }
            SyncTag::Unrecognized(tag) => {
                tracing::debug!(%tag, "Ignoring unknown sync tag");
                SyncDispatch::Ignored(tag)
            }
            tag => {
                tracing::debug!(?tag, "Acknowledged per-note sync tag");
                SyncDispatch::Acknowledged(tag)
            }
        }
    }
}

/// Start the worker on its own task.
pub fn spawn_worker(
    config: &ClientConfig,
    caches: CacheStorage,
    network: Arc<dyn Network>,
) -> WorkerHandle {
    let (events, receiver) = mpsc::channel(EVENT_BUFFER);
    let (clients, _) = broadcast::channel(CLIENT_BUFFER);

    let static_asset_urls = config.static_asset_urls();
    let router = FetchRouter {
        api_base_url: Arc::from(config.api_base_url.as_str()),
        index_url: Arc::from(format!("{}/index.html", config.app_origin).as_str()),
        shell_urls: Arc::new(static_asset_urls.iter().cloned().collect()),
        caches,
        network,
        clients: clients.clone(),
    };
    let worker = OfflineWorker {
        state: WorkerState::Parsed,
        skip_waiting: false,
        static_asset_urls,
        router,
    };
    tokio::spawn(worker.run(receiver));

    WorkerHandle { events, clients }
}

/// Replay `queue` whenever the worker posts [`ClientMessage::SyncRequested`].
pub fn forward_sync_requests(
    mut messages: broadcast::Receiver<ClientMessage>,
    queue: Arc<SyncQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(ClientMessage::SyncRequested) => {
                    let outcome = queue.process_queue().await;
                    tracing::debug!(?outcome, "Processed sync queue after background sync");
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::NoteId;
    use crate::store::tests::ScriptedApi;
    use crate::sync::{MemoryStore, PendingOperation};

    #[derive(Default)]
    struct FakeNetwork {
        responses: Mutex<HashMap<String, CachedResponse>>,
        offline: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeNetwork {
        fn serve(&self, url: &str, body: &str) {
            self.responses.lock().unwrap().insert(
                url.to_string(),
                CachedResponse::new(200, Some("text/plain"), body),
            );
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, request: &OfflineRequest) -> Result<CachedResponse> {
            self.calls.lock().unwrap().push(request.url.clone());
            if self.offline.load(Ordering::SeqCst) {
                return Err(Error::Worker("network unreachable".to_string()));
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| CachedResponse::new(404, None, "not found")))
        }
    }

    const API: &str = "https://notes-api.dicoding.dev/v2";
    const ORIGIN: &str = "http://localhost:8080";

    fn config() -> ClientConfig {
        ClientConfig {
            static_assets: vec!["/index.html".to_string(), "/app.js".to_string()],
            ..Default::default()
        }
    }

    async fn activated_worker() -> (Arc<FakeNetwork>, CacheStorage, WorkerHandle) {
        let network = Arc::new(FakeNetwork::default());
        network.serve(&format!("{ORIGIN}/index.html"), "<html>shell</html>");
        network.serve(&format!("{ORIGIN}/app.js"), "console.log(1)");
        let caches = CacheStorage::new();
        let handle = spawn_worker(&config(), caches.clone(), network.clone());
        assert_eq!(handle.install().await.unwrap(), 2);
        handle.activate().await.unwrap();
        (network, caches, handle)
    }

    #[tokio::test]
    async fn install_precaches_shell_and_activate_drops_stale_caches() {
        let network = Arc::new(FakeNetwork::default());
        network.serve(&format!("{ORIGIN}/index.html"), "<html></html>");
        network.serve(&format!("{ORIGIN}/app.js"), "js");
        let caches = CacheStorage::new();
        caches.put("notely-shell-v0", "old", CachedResponse::new(200, None, "old"));
        caches.put(API_CACHE, "kept", CachedResponse::new(200, None, "kept"));

        let handle = spawn_worker(&config(), caches.clone(), network);
        let mut messages = handle.subscribe();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Parsed);

        handle.install().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Installed);
        assert_eq!(caches.entry_count(SHELL_CACHE), 2);

        let deleted = handle.activate().await.unwrap();
        assert_eq!(deleted, vec!["notely-shell-v0".to_string()]);
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
        assert_eq!(caches.entry_count(API_CACHE), 1);
        assert_eq!(messages.recv().await.unwrap(), ClientMessage::Claimed);
    }

    #[tokio::test]
    async fn install_fails_without_partial_shell_cache() {
        let network = Arc::new(FakeNetwork::default());
        network.serve(&format!("{ORIGIN}/index.html"), "<html></html>");
        let caches = CacheStorage::new();
        let handle = spawn_worker(&config(), caches.clone(), network);

        assert!(handle.install().await.is_err());
        assert_eq!(caches.entry_count(SHELL_CACHE), 0);
        assert_eq!(handle.state().await.unwrap(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn api_requests_are_network_first_with_cache_fallback() {
        let (network, caches, handle) = activated_worker().await;
        let url = format!("{API}/notes");
        network.serve(&url, r#"{"error":false,"data":[]}"#);

        let online = handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert_eq!(online.status, 200);
        assert!(caches.match_in(API_CACHE, &url).is_some());

        network.set_offline(true);
        let offline = handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert_eq!(offline, online);

        let missing = handle
            .fetch(OfflineRequest::get(format!("{API}/notes/archived")))
            .await
            .unwrap();
        assert_eq!(missing, CachedResponse::offline_json());
    }

    #[tokio::test]
    async fn api_error_responses_are_not_cached() {
        let (_, caches, handle) = activated_worker().await;
        let url = format!("{API}/notes/missing");
        let response = handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(caches.match_in(API_CACHE, &url).is_none());
    }

    #[tokio::test]
    async fn static_assets_are_cache_first_and_revalidated() {
        let (network, caches, handle) = activated_worker().await;
        let mut messages = handle.subscribe();
        let url = format!("{ORIGIN}/app.js");
        network.serve(&url, "console.log(2)");

        let served = handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert_eq!(served.text(), "console.log(1)");

        let message = tokio::time::timeout(Duration::from_secs(1), messages.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message, ClientMessage::CacheUpdated { url: url.clone() });
        assert_eq!(
            caches.match_in(SHELL_CACHE, &url).unwrap().text(),
            "console.log(2)"
        );
    }

    #[tokio::test]
    async fn static_miss_goes_to_network_and_runtime_cache() {
        let (network, caches, handle) = activated_worker().await;
        let url = format!("{ORIGIN}/logo.svg");
        network.serve(&url, "<svg/>");

        let response = handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert_eq!(response.text(), "<svg/>");
        assert!(caches.match_in(RUNTIME_CACHE, &url).is_some());
    }

    #[tokio::test]
    async fn offline_static_miss_falls_back_to_index_or_503() {
        let (network, _, handle) = activated_worker().await;
        network.set_offline(true);

        let page = handle
            .fetch(OfflineRequest::get(format!("{ORIGIN}/archive")).with_accept("text/html"))
            .await
            .unwrap();
        assert_eq!(page.text(), "<html>shell</html>");

        let image = handle
            .fetch(OfflineRequest::get(format!("{ORIGIN}/logo.svg")))
            .await
            .unwrap();
        assert_eq!(image.status, 503);
    }

    #[tokio::test]
    async fn uncontrolled_and_non_get_requests_bypass_caches() {
        let network = Arc::new(FakeNetwork::default());
        let caches = CacheStorage::new();
        let handle = spawn_worker(&config(), caches.clone(), network.clone());
        let url = format!("{API}/notes");
        network.serve(&url, "{}");

        handle.fetch(OfflineRequest::get(&url)).await.unwrap();
        assert!(caches.match_in(API_CACHE, &url).is_none());

        let (network, caches, handle) = activated_worker().await;
        let before = network.call_count();
        let post = OfflineRequest {
            method: Method::POST,
            ..OfflineRequest::get(&url)
        };
        network.set_offline(true);
        assert!(handle.fetch(post).await.is_err());
        assert_eq!(network.call_count(), before + 1);
        assert!(caches.match_in(API_CACHE, &url).is_none());
    }

    #[test]
    fn sync_tags_parse() {
        assert_eq!(SyncTag::parse("sync-notes"), SyncTag::SyncNotes);
        assert_eq!(
            SyncTag::parse("create-note-42"),
            SyncTag::CreateNote("42".to_string())
        );
        assert_eq!(
            SyncTag::parse("update-note-abc"),
            SyncTag::UpdateNote("abc".to_string())
        );
        assert_eq!(
            SyncTag::parse("delete-note-x"),
            SyncTag::DeleteNote("x".to_string())
        );
        assert_eq!(
            SyncTag::parse("refresh"),
            SyncTag::Unrecognized("refresh".to_string())
        );
    }

    #[tokio::test]
    async fn sync_notes_tag_replays_queue_through_clients() {
        let (_, _, handle) = activated_worker().await;
        let queue = Arc::new(SyncQueue::new(
            Arc::new(ScriptedApi::default()),
            Arc::new(MemoryStore::new()),
        ));
        queue.add(PendingOperation::archive(&NoteId::new("n1")));

        let listener = forward_sync_requests(handle.subscribe(), queue.clone());
        let dispatch = handle.sync("sync-notes").await.unwrap();
        assert_eq!(dispatch, SyncDispatch::Broadcast { receivers: 1 });

        for _ in 0..50 {
            if queue.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.is_empty());

        assert!(matches!(
            handle.sync("delete-note-n1").await.unwrap(),
            SyncDispatch::Acknowledged(SyncTag::DeleteNote(_))
        ));
        assert_eq!(
            handle.sync("other").await.unwrap(),
            SyncDispatch::Ignored("other".to_string())
        );
        listener.abort();
    }
}
