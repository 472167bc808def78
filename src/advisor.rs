//! Advisory service interface and polling.
//!
//! Suggestions are non-authoritative annotations produced by an external
//! reviewer service for a snapshot of the text. They may be stale by the
//! time they arrive and never feed back into document state. A failed
//! fetch is simply a skipped tick — no retry, no effect on the socket
//! loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often the client refreshes suggestions while attached.
pub const DEFAULT_SUGGEST_INTERVAL: Duration = Duration::from_secs(10);

/// Severity classification of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Error,
    Warning,
    Info,
}

/// One advisory annotation, attached to a 0-based line of the snapshot it
/// was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub text: String,
}

/// Advisory client errors.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("advisory service error: {0}")]
    Service(String),
}

/// Request/response advisory service. Stateless from the caller's point
/// of view; failures are non-fatal.
#[async_trait]
pub trait AdvisoryService: Send + Sync {
    async fn suggest(&self, session_id: &str, code: &str)
        -> Result<Vec<Suggestion>, AdvisoryError>;
}

#[derive(Serialize)]
struct SuggestRequest<'a> {
    session_id: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct SuggestResponse {
    suggestions: Vec<Suggestion>,
}

/// HTTP advisory client: POSTs `{session_id, code}` to `{base}/suggest`
/// and expects `{"suggestions": [...]}` back.
pub struct HttpAdvisor {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAdvisor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AdvisoryService for HttpAdvisor {
    async fn suggest(
        &self,
        session_id: &str,
        code: &str,
    ) -> Result<Vec<Suggestion>, AdvisoryError> {
        let response = self
            .http
            .post(format!("{}/suggest", self.base_url))
            .json(&SuggestRequest { session_id, code })
            .send()
            .await?
            .error_for_status()?;

        let body: SuggestResponse = response.json().await?;
        Ok(body.suggestions)
    }
}

/// Periodic suggestion fetcher for an attached editing surface.
///
/// Every tick it reads the latest text from the watch channel, asks the
/// service, and forwards results over mpsc. The task is decoupled from
/// the socket loop and is aborted when the handle drops, so no fetch
/// outlives the surface it belongs to.
pub struct SuggestionPoller {
    handle: JoinHandle<()>,
}

impl SuggestionPoller {
    pub fn spawn(
        service: Arc<dyn AdvisoryService>,
        session_id: String,
        interval: Duration,
        code_rx: watch::Receiver<String>,
        results_tx: mpsc::Sender<Vec<Suggestion>>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The zeroth tick fires immediately; skip it so the first
            // fetch happens one full interval after attach.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let code = code_rx.borrow().clone();
                match service.suggest(&session_id, &code).await {
                    Ok(suggestions) => {
                        if results_tx.send(suggestions).await.is_err() {
                            break; // Surface is gone.
                        }
                    }
                    Err(e) => {
                        log::warn!("suggestion fetch failed for session {session_id}: {e}");
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SuggestionPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdvisor {
        result: Result<Vec<Suggestion>, String>,
    }

    #[async_trait]
    impl AdvisoryService for StubAdvisor {
        async fn suggest(
            &self,
            _session_id: &str,
            _code: &str,
        ) -> Result<Vec<Suggestion>, AdvisoryError> {
            match &self.result {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(AdvisoryError::Service(e.clone())),
            }
        }
    }

    fn sample_suggestions() -> Vec<Suggestion> {
        vec![
            Suggestion {
                line: 0,
                kind: SuggestionKind::Info,
                text: "Start by defining a function".into(),
            },
            Suggestion {
                line: 3,
                kind: SuggestionKind::Warning,
                text: "Consider renaming variable for clarity".into(),
            },
        ]
    }

    #[test]
    fn test_suggestion_wire_shape() {
        let s = Suggestion {
            line: 2,
            kind: SuggestionKind::Error,
            text: "missing colon".into(),
        };
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"line":2,"type":"error","text":"missing colon"}"#);

        let back: Suggestion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_suggest_response_parses() {
        let body = r#"{"suggestions":[{"line":1,"type":"warning","text":"w"}]}"#;
        let parsed: SuggestResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.suggestions.len(), 1);
        assert_eq!(parsed.suggestions[0].kind, SuggestionKind::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_fetches_on_interval() {
        let service = Arc::new(StubAdvisor {
            result: Ok(sample_suggestions()),
        });
        let (_code_tx, code_rx) = watch::channel("print('hi')".to_string());
        let (results_tx, mut results_rx) = mpsc::channel(4);

        let _poller = SuggestionPoller::spawn(
            service,
            "s1".into(),
            Duration::from_secs(10),
            code_rx,
            results_tx,
        );

        // Nothing before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(results_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let received = results_rx.recv().await.unwrap();
        assert_eq!(received, sample_suggestions());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_failure_skips_tick() {
        let service = Arc::new(StubAdvisor {
            result: Err("upstream down".into()),
        });
        let (_code_tx, code_rx) = watch::channel(String::new());
        let (results_tx, mut results_rx) = mpsc::channel(4);

        let _poller = SuggestionPoller::spawn(
            service,
            "s1".into(),
            Duration::from_secs(10),
            code_rx,
            results_tx,
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        // Failed fetches produce no results and no panic.
        assert!(results_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poller_aborts_on_drop() {
        let service = Arc::new(StubAdvisor {
            result: Ok(Vec::new()),
        });
        let (_code_tx, code_rx) = watch::channel(String::new());
        let (results_tx, _results_rx) = mpsc::channel(4);

        let poller = SuggestionPoller::spawn(
            service,
            "s1".into(),
            Duration::from_secs(10),
            code_rx,
            results_tx,
        );
        let handle_probe = poller.handle.abort_handle();
        drop(poller);

        for _ in 0..50 {
            if handle_probe.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("poller task still running after drop");
    }
}
