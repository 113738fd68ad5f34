//! Remote layout-model analysis.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use super::LayoutAnalyser;
use crate::types::{DocumentDescriptor, DocumentProfile, PageMetrics};
use crate::{Result, RouterError};

/// Default deadline for one `analyse` call, retries included.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries after a transient transport failure.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default limit on inference workers still running, including abandoned ones.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Deep-learning layout models a remote service may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutModelType {
    LayoutlmV3,
    Docformer,
    TableDetr,
    FormClassifier,
}

impl LayoutModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutModelType::LayoutlmV3 => "layoutlm_v3",
            LayoutModelType::Docformer => "docformer",
            LayoutModelType::TableDetr => "table_detr",
            LayoutModelType::FormClassifier => "form_classifier",
        }
    }
}

impl fmt::Display for LayoutModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client for an external layout model.
///
/// `Ok(None)` and `Ok(Some(vec![]))` both mean the model produced nothing
/// usable. Transport problems should be reported as
/// [`RouterError::Transport`] so they are retried.
///
/// Implementations should bound their own I/O time. A call that outlives the
/// analyser's deadline is abandoned but keeps its worker thread until it
/// returns, and while [`DEFAULT_MAX_IN_FLIGHT`] such workers are alive new
/// inferences are refused.
pub trait LayoutModelClient: Send + Sync {
    fn name(&self) -> &str {
        "layout-model"
    }

    fn infer(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<Option<Vec<PageMetrics>>>;
}

/// Delegates page analysis to a [`LayoutModelClient`] under a deadline.
///
/// Each inference attempt runs on a worker thread; the caller waits at most
/// until the deadline. Transient transport failures are retried with a short
/// linear backoff while time remains. On timeout, transport failure or an
/// empty result the configured fallback analyser runs in the same call.
pub struct ModelBackedLayoutAnalyser {
    client: Arc<dyn LayoutModelClient>,
    timeout: Duration,
    max_retries: u32,
    send_content: bool,
    fallback: Option<Arc<dyn LayoutAnalyser>>,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases a worker slot when the inference thread finishes.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ModelBackedLayoutAnalyser {
    pub fn new(client: Arc<dyn LayoutModelClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_MODEL_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            send_content: true,
            fallback: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether document bytes are resolved and forwarded to the model.
    pub fn with_send_content(mut self, send_content: bool) -> Self {
        self.send_content = send_content;
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LayoutAnalyser>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Maximum number of inference workers alive at once.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    fn acquire_slot(&self) -> Result<InFlightSlot> {
        let acquired = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_in_flight).then_some(current + 1)
            });
        match acquired {
            Ok(_) => Ok(InFlightSlot(Arc::clone(&self.in_flight))),
            Err(current) => Err(RouterError::Other(format!(
                "Layout model has {} inferences still running, refusing new work",
                current
            ))),
        }
    }

    fn timeout_error(&self) -> RouterError {
        RouterError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    fn attempt(
        &self,
        descriptor: &DocumentDescriptor,
        content: Option<&[u8]>,
        remaining: Duration,
    ) -> Result<Option<Vec<PageMetrics>>> {
        let (tx, rx) = mpsc::channel();
        let client = Arc::clone(&self.client);
        let descriptor = descriptor.clone();
        let content = content.map(<[u8]>::to_vec);
        let slot = self.acquire_slot()?;

        std::thread::Builder::new()
            .name("idp-layout-model".to_string())
            .spawn(move || {
                let _slot = slot;
                let result = client.infer(&descriptor, content.as_deref());
                let _ = tx.send(result);
            })
            .map_err(|e| RouterError::Other(format!("Failed to spawn layout model worker: {}", e)))?;

        match rx.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(self.timeout_error()),
            Err(RecvTimeoutError::Disconnected) => Err(RouterError::Other(
                "Layout model worker exited without a result".to_string(),
            )),
        }
    }

    fn infer_with_deadline(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<Vec<PageMetrics>> {
        let deadline = Instant::now() + self.timeout;
        let mut attempt = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timeout_error());
            }

            match self.attempt(descriptor, content, remaining) {
                Ok(Some(pages)) if !pages.is_empty() => return Ok(pages),
                Ok(_) => return Err(RouterError::EmptyInference(descriptor.object_key.clone())),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(100 * (attempt as u64 + 1));
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    tracing::debug!(
                        object_key = %descriptor.object_key,
                        client = self.client.name(),
                        attempt = attempt + 1,
                        error = %err,
                        "Transient layout model failure, retrying"
                    );
                    std::thread::sleep(backoff.min(remaining));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl LayoutAnalyser for ModelBackedLayoutAnalyser {
    fn name(&self) -> &str {
        "model_backed"
    }

    fn requires_content(&self) -> bool {
        self.send_content || self.fallback.as_ref().is_some_and(|fallback| fallback.requires_content())
    }

    fn analyse(&self, descriptor: &DocumentDescriptor, content: Option<&[u8]>) -> Result<DocumentProfile> {
        let forwarded = if self.send_content { content } else { None };
        match self.infer_with_deadline(descriptor, forwarded) {
            Ok(pages) => Ok(DocumentProfile::from_pages(pages)),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    tracing::warn!(
                        object_key = %descriptor.object_key,
                        client = self.client.name(),
                        fallback = fallback.name(),
                        error = %err,
                        "Layout model inference failed, using fallback analyser"
                    );
                    fallback.analyse(descriptor, content)
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::HeuristicLayoutAnalyser;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum Behaviour {
        Pages(usize),
        Empty,
        FailTransport,
        Sleep(Duration),
    }

    struct ScriptedClient {
        behaviour: Behaviour,
        calls: AtomicU32,
        succeed_after: Option<u32>,
    }

    impl ScriptedClient {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: AtomicU32::new(0),
                succeed_after: None,
            }
        }
    }

    impl LayoutModelClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        fn infer(&self, _descriptor: &DocumentDescriptor, _content: Option<&[u8]>) -> Result<Option<Vec<PageMetrics>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(after) = self.succeed_after
                && call > after
            {
                return Ok(Some(vec![PageMetrics::new(0, 0.9, 0.0, 0.0)]));
            }
            match &self.behaviour {
                Behaviour::Pages(count) => Ok(Some(
                    (0..*count).map(|i| PageMetrics::new(i as u32, 0.7, 0.1, 0.0)).collect(),
                )),
                Behaviour::Empty => Ok(Some(Vec::new())),
                Behaviour::FailTransport => Err(RouterError::transport("connection refused")),
                Behaviour::Sleep(duration) => {
                    std::thread::sleep(*duration);
                    Ok(Some(vec![PageMetrics::new(0, 0.7, 0.1, 0.0)]))
                }
            }
        }
    }

    fn descriptor() -> DocumentDescriptor {
        DocumentDescriptor {
            object_key: "inbound/claim.pdf".to_string(),
            bucket: None,
            payload: json!({"documentMetadata": {"pageCount": 9}}),
            mime_type: "application/pdf".to_string(),
            request_override: None,
        }
    }

    #[test]
    fn test_model_pages_become_profile() {
        let analyser = ModelBackedLayoutAnalyser::new(Arc::new(ScriptedClient::new(Behaviour::Pages(4))));
        let profile = analyser.analyse(&descriptor(), None).unwrap();
        assert_eq!(profile.page_count(), 4);
    }

    #[test]
    fn test_empty_inference_without_fallback() {
        let analyser = ModelBackedLayoutAnalyser::new(Arc::new(ScriptedClient::new(Behaviour::Empty)));
        let err = analyser.analyse(&descriptor(), None).unwrap_err();
        assert!(matches!(err, RouterError::EmptyInference(_)));
    }

    #[test]
    fn test_empty_inference_uses_fallback() {
        let analyser = ModelBackedLayoutAnalyser::new(Arc::new(ScriptedClient::new(Behaviour::Empty)))
            .with_fallback(Arc::new(HeuristicLayoutAnalyser));
        assert_eq!(analyser.analyse(&descriptor(), None).unwrap().page_count(), 9);
    }

    #[test]
    fn test_transport_failures_are_retried() {
        let client = Arc::new(ScriptedClient {
            succeed_after: Some(2),
            ..ScriptedClient::new(Behaviour::FailTransport)
        });
        let analyser = ModelBackedLayoutAnalyser::new(client.clone())
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(2);

        let profile = analyser.analyse(&descriptor(), None).unwrap();
        assert_eq!(profile.page_count(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let client = Arc::new(ScriptedClient::new(Behaviour::FailTransport));
        let analyser = ModelBackedLayoutAnalyser::new(client.clone())
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1);

        let err = analyser.analyse(&descriptor(), None).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timeout_runs_fallback_in_same_call() {
        let analyser = ModelBackedLayoutAnalyser::new(Arc::new(ScriptedClient::new(Behaviour::Sleep(
            Duration::from_secs(2),
        ))))
        .with_timeout(Duration::from_millis(50))
        .with_fallback(Arc::new(HeuristicLayoutAnalyser));

        let started = Instant::now();
        let profile = analyser.analyse(&descriptor(), None).unwrap();
        assert_eq!(profile.page_count(), 9);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_without_fallback() {
        let analyser = ModelBackedLayoutAnalyser::new(Arc::new(ScriptedClient::new(Behaviour::Sleep(
            Duration::from_millis(500),
        ))))
        .with_timeout(Duration::from_millis(20));

        let err = analyser.analyse(&descriptor(), None).unwrap_err();
        assert!(matches!(err, RouterError::Timeout { timeout_ms: 20 }));
    }

    #[test]
    fn test_requires_content_follows_fallback() {
        let client: Arc<dyn LayoutModelClient> = Arc::new(ScriptedClient::new(Behaviour::Empty));

        let heuristic_only = ModelBackedLayoutAnalyser::new(Arc::clone(&client))
            .with_send_content(false)
            .with_fallback(Arc::new(HeuristicLayoutAnalyser));
        assert!(!heuristic_only.requires_content());

        let inspecting = ModelBackedLayoutAnalyser::new(client)
            .with_send_content(false)
            .with_fallback(Arc::new(crate::layout::ContentInspectingLayoutAnalyser::new()));
        assert!(inspecting.requires_content());
    }

    #[test]
    fn test_abandoned_workers_are_bounded() {
        let client = Arc::new(ScriptedClient::new(Behaviour::Sleep(Duration::from_millis(500))));
        let analyser = ModelBackedLayoutAnalyser::new(client.clone())
            .with_timeout(Duration::from_millis(20))
            .with_max_in_flight(1)
            .with_fallback(Arc::new(HeuristicLayoutAnalyser));

        assert_eq!(analyser.analyse(&descriptor(), None).unwrap().page_count(), 9);
        assert_eq!(analyser.analyse(&descriptor(), None).unwrap().page_count(), 9);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(700));
        assert_eq!(analyser.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_type_names() {
        assert_eq!(LayoutModelType::LayoutlmV3.as_str(), "layoutlm_v3");
        let parsed: LayoutModelType = serde_json::from_value(json!("table_detr")).unwrap();
        assert_eq!(parsed, LayoutModelType::TableDetr);
        assert_eq!(serde_json::to_value(LayoutModelType::FormClassifier).unwrap(), json!("form_classifier"));
    }
}
