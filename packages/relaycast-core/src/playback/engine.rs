//! Render engine boundary.
//!
//! The orchestrator treats the media engine as a black box: it hands over a
//! URL and MIME type, receives lifecycle events, and disposes the load when
//! the attempt is superseded. Loads are held through a [`LoadLease`] so the
//! engine is released on every exit path, including orchestrator teardown.

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::orchestrator::OrchestratorInput;
use crate::protocol_constants::{
    ENGINE_ERR_DECODE, ENGINE_ERR_NETWORK, ENGINE_ERR_SRC_NOT_SUPPORTED,
};
use crate::runtime::{TaskSpawner, TokioSpawner};

/// What the engine should load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub mime_type: &'static str,
}

/// Lifecycle events reported by an engine for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// `loadstart`: the engine began fetching.
    Started,
    /// `canplay`: enough media is buffered to start.
    Ready,
    /// `play`: playback is running.
    Playing,
    /// `error(code)`: media error with a numeric engine code.
    Failed(u16),
    /// The load could not be issued at all (bad URL, navigation failure).
    LoadFailed(String),
}

/// Where an engine reports events for one load.
///
/// Every event is tagged with the epoch of the load that produced it, so
/// events from a disposed load are recognised as stale.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<OrchestratorInput>,
}

impl EngineEventSink {
    pub(crate) fn new(epoch: u64, tx: mpsc::UnboundedSender<OrchestratorInput>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Reports an event. Returns `false` once the orchestrator is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx
            .send(OrchestratorInput::Engine {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// A media engine driven by the orchestrator.
///
/// One engine instance serves one session; a new `load` always follows a
/// `dispose` of the previous one.
pub trait RenderEngine: Send + Sync {
    /// Starts loading `request`, reporting progress through `sink`.
    ///
    /// Must not block; long-running work belongs on a background task.
    fn load(&self, request: &LoadRequest, sink: EngineEventSink);

    /// Releases the current load. Must be idempotent.
    fn dispose(&self);
}

/// Scoped ownership of an engine load. Dropping the lease disposes it.
pub struct LoadLease {
    engine: Arc<dyn RenderEngine>,
    epoch: u64,
}

impl LoadLease {
    /// Issues `request` to `engine` and returns the guard for it.
    pub fn acquire(
        engine: Arc<dyn RenderEngine>,
        request: &LoadRequest,
        sink: EngineEventSink,
    ) -> Self {
        let epoch = sink.epoch();
        engine.load(request, sink);
        Self { engine, epoch }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl Drop for LoadLease {
    fn drop(&mut self) {
        log::trace!("[Engine] Disposing load for epoch {}", self.epoch);
        self.engine.dispose();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Probe Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Headless engine that verifies a candidate actually serves media.
///
/// Issues a GET for the candidate and maps the outcome to engine codes:
///
/// | Outcome | Event |
/// |---|---|
/// | connect error, timeout, 5xx | `Failed(2)` |
/// | 4xx, or an HTML page instead of media | `Failed(4)` |
/// | empty body | `Failed(3)` |
/// | first media bytes received | `Ready`, then `Playing` |
///
/// The probe stops reading after the first chunk; it confirms the source is
/// live, it does not play it.
pub struct HttpProbeEngine {
    client: Client,
    spawner: TokioSpawner,
    current: Mutex<Option<CancellationToken>>,
}

impl HttpProbeEngine {
    pub fn new(client: Client, spawner: TokioSpawner) -> Self {
        Self {
            client,
            spawner,
            current: Mutex::new(None),
        }
    }
}

impl RenderEngine for HttpProbeEngine {
    fn load(&self, request: &LoadRequest, sink: EngineEventSink) {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let client = self.client.clone();
        let request = request.clone();
        self.spawner.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    log::trace!("[Engine] Probe cancelled: {}", request.url);
                }
                _ = probe(&client, &request, &sink) => {}
            }
        });
    }

    fn dispose(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

async fn probe(client: &Client, request: &LoadRequest, sink: &EngineEventSink) {
    if !sink.emit(EngineEvent::Started) {
        return;
    }

    let response = match client
        .get(&request.url)
        .header(ACCEPT, format!("{}, */*;q=0.8", request.mime_type))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_builder() => {
            sink.emit(EngineEvent::LoadFailed(e.to_string()));
            return;
        }
        Err(e) => {
            log::debug!("[Engine] Probe request failed for {}: {}", request.url, e);
            sink.emit(EngineEvent::Failed(ENGINE_ERR_NETWORK));
            return;
        }
    };

    if let Some(code) = status_error_code(response.status()) {
        log::debug!(
            "[Engine] Probe got HTTP {} for {}",
            response.status(),
            request.url
        );
        sink.emit(EngineEvent::Failed(code));
        return;
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"));
    if is_html {
        log::debug!("[Engine] Probe got an HTML page for {}", request.url);
        sink.emit(EngineEvent::Failed(ENGINE_ERR_SRC_NOT_SUPPORTED));
        return;
    }

    let mut response = response;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) if chunk.is_empty() => continue,
            Ok(Some(_)) => {
                sink.emit(EngineEvent::Ready);
                sink.emit(EngineEvent::Playing);
                return;
            }
            Ok(None) => {
                sink.emit(EngineEvent::Failed(ENGINE_ERR_DECODE));
                return;
            }
            Err(e) => {
                log::debug!("[Engine] Probe body failed for {}: {}", request.url, e);
                sink.emit(EngineEvent::Failed(ENGINE_ERR_NETWORK));
                return;
            }
        }
    }
}

/// Maps a non-success HTTP status to an engine error code.
fn status_error_code(status: StatusCode) -> Option<u16> {
    if status.is_server_error() {
        Some(ENGINE_ERR_NETWORK)
    } else if status.is_client_error() {
        Some(ENGINE_ERR_SRC_NOT_SUPPORTED)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::header;
    use axum::routing::get;
    use axum::Router;

    struct CountingEngine {
        loads: AtomicUsize,
        disposals: AtomicUsize,
    }

    impl RenderEngine for CountingEngine {
        fn load(&self, _request: &LoadRequest, _sink: EngineEventSink) {
            self.loads.fetch_add(1, Ordering::SeqCst);
        }

        fn dispose(&self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(url: String) -> LoadRequest {
        LoadRequest {
            url,
            mime_type: "video/mp4",
        }
    }

    #[test]
    fn dropping_lease_disposes_load() {
        let engine = Arc::new(CountingEngine {
            loads: AtomicUsize::new(0),
            disposals: AtomicUsize::new(0),
        });
        let (tx, _rx) = mpsc::unbounded_channel();

        let lease = LoadLease::acquire(
            engine.clone(),
            &request("http://x".into()),
            EngineEventSink::new(7, tx),
        );
        assert_eq!(lease.epoch(), 7);
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.disposals.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(engine.disposals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_codes_map_to_engine_errors() {
        assert_eq!(
            status_error_code(StatusCode::BAD_GATEWAY),
            Some(ENGINE_ERR_NETWORK)
        );
        assert_eq!(
            status_error_code(StatusCode::NOT_FOUND),
            Some(ENGINE_ERR_SRC_NOT_SUPPORTED)
        );
        assert_eq!(status_error_code(StatusCode::OK), None);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn probe_events(url: String) -> Vec<EngineEvent> {
        let engine = HttpProbeEngine::new(Client::new(), TokioSpawner::current());
        let (tx, mut rx) = mpsc::unbounded_channel();
        engine.load(&request(url), EngineEventSink::new(1, tx));

        let mut events = Vec::new();
        while let Ok(Some(input)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            if let OrchestratorInput::Engine { epoch, event } = input {
                assert_eq!(epoch, 1);
                let done = !matches!(event, EngineEvent::Started | EngineEvent::Ready);
                events.push(event);
                if done {
                    break;
                }
            }
        }
        events
    }

    #[tokio::test]
    async fn probe_reports_playing_for_media() {
        let base = serve(Router::new().route(
            "/live.mp4",
            get(|| async { ([(header::CONTENT_TYPE, "video/mp4")], vec![0u8; 64]) }),
        ))
        .await;

        let events = probe_events(format!("{}/live.mp4", base)).await;
        assert_eq!(
            events,
            vec![EngineEvent::Started, EngineEvent::Ready, EngineEvent::Playing]
        );
    }

    #[tokio::test]
    async fn probe_reports_unsupported_for_html_page() {
        let base = serve(Router::new().route(
            "/play",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        ))
        .await;

        let events = probe_events(format!("{}/play", base)).await;
        assert_eq!(events.last(), Some(&EngineEvent::Failed(ENGINE_ERR_SRC_NOT_SUPPORTED)));
    }

    #[tokio::test]
    async fn probe_reports_network_error_for_server_error() {
        let base = serve(Router::new().route(
            "/play",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        ))
        .await;

        let events = probe_events(format!("{}/play", base)).await;
        assert_eq!(events.last(), Some(&EngineEvent::Failed(ENGINE_ERR_NETWORK)));
    }

    #[tokio::test]
    async fn probe_reports_decode_error_for_empty_body() {
        let base = serve(Router::new().route("/empty", get(|| async { "" }))).await;

        let events = probe_events(format!("{}/empty", base)).await;
        assert_eq!(events.last(), Some(&EngineEvent::Failed(ENGINE_ERR_DECODE)));
    }

    #[tokio::test]
    async fn probe_reports_load_failure_for_invalid_url() {
        let events = probe_events("not a url".to_string()).await;
        assert!(matches!(events.last(), Some(EngineEvent::LoadFailed(_))));
    }
}
