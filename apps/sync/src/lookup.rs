#![allow(dead_code)]

//! Debounced, abortable typeahead lookups (university names, city/state
//! pickers). A new query supersedes the one in flight: the previous task is
//! aborted and its result never delivered. Results carry the generation that
//! produced them so receivers can drop stale completions that raced an abort.
//!
//! The reconciliation save flow is intentionally NOT cancellable; this
//! machinery exists only for lookup inputs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::errors::ApiError;

#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, term: &str) -> Result<Vec<String>, ApiError>;
}

/// `GET <path>?q=<term>` against one of the app's lookup endpoints.
pub struct RestSuggestionSource {
    api: ApiClient,
    path: String,
}

impl RestSuggestionSource {
    pub fn new(api: ApiClient, path: impl Into<String>) -> Self {
        Self {
            api,
            path: path.into(),
        }
    }
}

#[async_trait]
impl SuggestionSource for RestSuggestionSource {
    async fn suggest(&self, term: &str) -> Result<Vec<String>, ApiError> {
        self.api.get_json_query(&self.path, &[("q", term)]).await
    }
}

#[derive(Debug)]
pub struct LookupResult {
    pub generation: u64,
    pub term: String,
    pub outcome: Result<Vec<String>, ApiError>,
}

/// One typeahead input's lookup state. Owned by the input; dropping it
/// (unmount) aborts whatever is still in flight.
pub struct Typeahead {
    source: Arc<dyn SuggestionSource>,
    debounce: Duration,
    generation: u64,
    inflight: Option<JoinHandle<()>>,
    results: UnboundedSender<LookupResult>,
}

impl Typeahead {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

    pub fn new(
        source: Arc<dyn SuggestionSource>,
        debounce: Duration,
    ) -> (Self, UnboundedReceiver<LookupResult>) {
        let (results, receiver) = mpsc::unbounded_channel();
        (
            Self {
                source,
                debounce,
                generation: 0,
                inflight: None,
                results,
            },
            receiver,
        )
    }

    /// Schedules a lookup for `term` after the debounce window, superseding
    /// (and aborting) any lookup still in flight. Blank input short-circuits
    /// to an empty suggestion list without a network call.
    pub fn query(&mut self, term: &str) {
        self.generation += 1;
        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }

        let generation = self.generation;
        let term = term.trim().to_string();
        if term.is_empty() {
            let _ = self.results.send(LookupResult {
                generation,
                term,
                outcome: Ok(Vec::new()),
            });
            return;
        }

        let source = Arc::clone(&self.source);
        let results = self.results.clone();
        let debounce = self.debounce;
        self.inflight = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let outcome = source.suggest(&term).await;
            let _ = results.send(LookupResult {
                generation,
                term,
                outcome,
            });
        }));
    }

    /// The generation of the most recent query; receivers drop anything
    /// older.
    pub fn current_generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Typeahead {
    fn drop(&mut self) {
        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
    }
}
