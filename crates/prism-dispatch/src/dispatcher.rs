//! Concurrent fan-out dispatcher.
//!
//! One dispatch targets a session's columns, one tokio task per provider.
//! Tasks are fully independent: each streams its vendor response, forwards
//! chunks onto the shared event channel, and persists exactly one terminal
//! assistant message for its column. A failure in one task never touches
//! its siblings. A coordinator task waits for all of them and records one
//! history entry for the whole dispatch.
//!
//! One in-flight dispatch per column: targeting a busy column rejects the
//! whole dispatch with [`DispatchError::Conflict`] before anything is
//! written.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use prism_core::events::StreamEvent;
use prism_llm::secrets::SecretStore;
use prism_llm::{AdapterError, ChatMessage, CompletionRequest, ProviderAdapter, ProviderConfig, adapter_for};
use prism_store::row_types::{HistoryRow, ProviderRow};
use prism_store::types::{MessageStatus, ResponseSnapshot};
use prism_store::{ChatStore, StoreError};

use crate::errors::{DispatchError, Result};
use crate::events::{DispatchEvent, DispatchEventKind};

/// Error marker recorded on messages finalized by cancellation.
const CANCELLED_MARKER: &str = "cancelled";

/// The fan-out dispatcher. Cheap to share behind an `Arc`.
pub struct Dispatcher {
    store: Arc<ChatStore>,
    secrets: Arc<dyn SecretStore>,
    busy: Arc<Mutex<HashSet<String>>>,
}

/// Handle to one in-flight dispatch.
#[derive(Debug)]
pub struct DispatchHandle {
    /// Interleaved events from all provider tasks. The channel closes once
    /// every task has emitted its terminal event.
    pub events: mpsc::UnboundedReceiver<DispatchEvent>,
    token: CancellationToken,
    history: JoinHandle<Result<HistoryRow>>,
}

impl DispatchHandle {
    /// Cancel the dispatch. Each task stops consuming its stream and
    /// persists whatever text has accumulated as a partial message.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for every provider task to finish and return the recorded
    /// history entry.
    pub async fn into_history(self) -> Result<HistoryRow> {
        self.history
            .await
            .map_err(|e| StoreError::Internal(format!("dispatch coordinator failed: {e}")))?
    }
}

/// Releases a column's busy slot when the provider task finishes, however
/// it finishes.
struct BusyGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    column_id: String,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if let Ok(mut busy) = self.busy.lock() {
            let _ = busy.remove(&self.column_id);
        }
    }
}

/// Everything a provider task needs, resolved before anything is spawned.
struct Target {
    provider_id: String,
    column_id: String,
    adapter: Box<dyn ProviderAdapter>,
    guard: BusyGuard,
}

/// How one provider's stream ended.
enum StreamOutcome {
    Complete(String),
    Cancelled(String),
    Failed(String, AdapterError),
}

impl Dispatcher {
    /// Create a dispatcher over a store and a secret store.
    pub fn new(store: Arc<ChatStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            secrets,
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Resolve a provider row into a ready adapter, pulling the raw key
    /// out of the secret store.
    pub(crate) fn adapter_for_row(&self, row: &ProviderRow) -> Result<Box<dyn ProviderAdapter>> {
        let api_key = match &row.secret_ref {
            None => None,
            Some(secret_ref) => match self.secrets.get_secret(secret_ref)? {
                Some(bytes) => Some(String::from_utf8(bytes).map_err(|_| {
                    AdapterError::Secret("stored API key is not valid UTF-8".into())
                })?),
                // The reference dangles; the key was removed out of band.
                None => return Err(DispatchError::MissingApiKey(row.id.clone())),
            },
        };
        let base_url = row
            .base_url
            .clone()
            .or_else(|| row.kind.default_base_url().map(String::from))
            .ok_or_else(|| {
                StoreError::Validation(format!("provider {} has no base URL", row.id))
            })?;
        let config = ProviderConfig {
            kind: row.kind,
            base_url,
            model: row.model.clone(),
            api_key,
        };
        Ok(adapter_for(&config)?)
    }

    /// Load a provider row, mapping absence to [`DispatchError::UnknownProvider`].
    pub(crate) fn provider_row(&self, provider_id: &str) -> Result<ProviderRow> {
        self.store.provider_row(provider_id).map_err(|e| match e {
            StoreError::ProviderNotFound(id) => DispatchError::UnknownProvider(id),
            other => other.into(),
        })
    }

    /// Fan a prompt out to the given providers' columns in a session.
    ///
    /// Validation (unknown provider, missing column, busy column, dangling
    /// key reference) rejects the whole dispatch before any write. After
    /// validation, one user message is appended per column and one task
    /// spawned per provider; per-provider failures from that point on are
    /// isolated to their own column.
    pub fn dispatch(
        &self,
        session_id: &str,
        prompt: &str,
        provider_ids: &[String],
    ) -> Result<DispatchHandle> {
        if provider_ids.is_empty() {
            return Err(StoreError::Validation("dispatch targets no providers".into()).into());
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(StoreError::Validation("prompt is empty".into()).into());
        }
        let session = self.store.get_session(session_id)?;

        // Resolve every target fully before marking anything busy.
        let mut resolved = Vec::with_capacity(provider_ids.len());
        for provider_id in provider_ids {
            let row = self.provider_row(provider_id)?;
            let column = self
                .store
                .find_column_for_provider(session_id, provider_id)?
                .ok_or_else(|| {
                    StoreError::Validation(format!(
                        "provider {provider_id} has no column in session {session_id}"
                    ))
                })?;
            let adapter = self.adapter_for_row(&row)?;
            resolved.push((row.id, column.id, adapter));
        }

        // Claim all columns atomically; any busy column rejects the lot.
        let targets = {
            let mut busy = self
                .busy
                .lock()
                .map_err(|_| StoreError::Internal("busy set lock poisoned".into()))?;
            if let Some((_, column_id, _)) =
                resolved.iter().find(|(_, col, _)| busy.contains(col))
            {
                return Err(DispatchError::Conflict {
                    column_id: column_id.clone(),
                });
            }
            resolved
                .into_iter()
                .map(|(provider_id, column_id, adapter)| {
                    let _ = busy.insert(column_id.clone());
                    Target {
                        provider_id,
                        adapter,
                        guard: BusyGuard {
                            busy: Arc::clone(&self.busy),
                            column_id: column_id.clone(),
                        },
                        column_id,
                    }
                })
                .collect::<Vec<_>>()
        };

        info!(
            session_id,
            providers = targets.len(),
            "dispatching prompt"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let started = Instant::now();

        let mut tasks = Vec::with_capacity(targets.len());
        for target in targets {
            // The user message lands before the task spawns, so the column
            // log is consistent even if the stream dies instantly.
            let _ = self.store.append_user_message(&target.column_id, prompt)?;
            let request = self.build_request(&session.session.system_prompt, &target.column_id)?;
            tasks.push(tokio::spawn(run_provider(
                Arc::clone(&self.store),
                target,
                request,
                tx.clone(),
                token.child_token(),
            )));
        }
        drop(tx);

        let store = Arc::clone(&self.store);
        let prompt = prompt.to_string();
        let provider_ids = provider_ids.to_vec();
        let history = tokio::spawn(async move {
            let mut snapshots = Vec::with_capacity(tasks.len());
            for task in tasks {
                match task.await {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => error!(error = %e, "provider task panicked"),
                }
            }
            let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
            let entry =
                store.record_history(&prompt, &provider_ids, &snapshots, Some(latency_ms))?;
            debug!(history_id = %entry.id, latency_ms, "dispatch recorded");
            Ok(entry)
        });

        Ok(DispatchHandle {
            events: rx,
            token,
            history,
        })
    }

    /// Rebuild the conversation context for a column: every complete
    /// message in sequence order, which at this point includes the freshly
    /// appended user prompt.
    fn build_request(
        &self,
        system_prompt: &Option<String>,
        column_id: &str,
    ) -> Result<CompletionRequest> {
        let messages = self
            .store
            .column_messages(column_id)?
            .into_iter()
            .filter(|m| m.status == MessageStatus::Complete)
            .map(|m| ChatMessage {
                role: m.role,
                content: m.body,
            })
            .collect();
        Ok(CompletionRequest {
            system_prompt: system_prompt.clone(),
            messages,
            max_tokens: None,
            temperature: None,
        })
    }
}

/// One provider's end-to-end dispatch: stream, forward, persist, report.
async fn run_provider(
    store: Arc<ChatStore>,
    target: Target,
    request: CompletionRequest,
    tx: mpsc::UnboundedSender<DispatchEvent>,
    cancel: CancellationToken,
) -> ResponseSnapshot {
    let Target {
        provider_id,
        column_id,
        adapter,
        guard: _guard,
    } = target;

    let emit = |kind: DispatchEventKind| {
        // A dropped receiver just means nobody is watching; persistence
        // still has to happen.
        let _ = tx.send(DispatchEvent {
            column_id: column_id.clone(),
            provider_id: provider_id.clone(),
            kind,
        });
    };

    let outcome = consume_stream(adapter.as_ref(), &request, &cancel, |text| {
        emit(DispatchEventKind::Chunk { text });
    })
    .await;

    match outcome {
        StreamOutcome::Complete(text) => {
            match store.append_assistant_message(&column_id, &text, MessageStatus::Complete, None)
            {
                Ok(message) => {
                    debug!(column_id, provider_id, chars = text.len(), "stream complete");
                    emit(DispatchEventKind::Completed { message });
                    ResponseSnapshot {
                        provider_id,
                        text,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(column_id, error = %e, "failed to persist complete message");
                    emit(DispatchEventKind::Failed {
                        category: "storage",
                        error: e.to_string(),
                        message: None,
                    });
                    ResponseSnapshot {
                        provider_id,
                        text,
                        error: Some(e.to_string()),
                    }
                }
            }
        }
        StreamOutcome::Cancelled(partial) => {
            let message = store
                .append_assistant_message(
                    &column_id,
                    &partial,
                    MessageStatus::Partial,
                    Some(CANCELLED_MARKER),
                )
                .map_err(|e| error!(column_id, error = %e, "failed to persist partial message"))
                .ok();
            info!(column_id, provider_id, chars = partial.len(), "dispatch cancelled");
            emit(DispatchEventKind::Cancelled { message });
            ResponseSnapshot {
                provider_id,
                text: partial,
                error: Some(CANCELLED_MARKER.to_string()),
            }
        }
        StreamOutcome::Failed(partial, err) => {
            let marker = err.to_string();
            let message = store
                .append_assistant_message(
                    &column_id,
                    &partial,
                    MessageStatus::Error,
                    Some(&marker),
                )
                .map_err(|e| error!(column_id, error = %e, "failed to persist error message"))
                .ok();
            warn!(
                column_id,
                provider_id,
                category = err.category(),
                error = %err,
                "provider stream failed"
            );
            emit(DispatchEventKind::Failed {
                category: err.category(),
                error: marker.clone(),
                message,
            });
            ResponseSnapshot {
                provider_id,
                text: partial,
                error: Some(marker),
            }
        }
    }
}

/// Drive one adapter stream to its end, forwarding chunks as they arrive.
///
/// Cancellation is cooperative: the select arm wins while the request is
/// opening or between chunks, the stream is dropped, and dropping the
/// underlying response body aborts the HTTP request.
async fn consume_stream(
    adapter: &dyn ProviderAdapter,
    request: &CompletionRequest,
    cancel: &CancellationToken,
    mut on_chunk: impl FnMut(String),
) -> StreamOutcome {
    let mut accumulated = String::new();
    let mut stream = tokio::select! {
        () = cancel.cancelled() => return StreamOutcome::Cancelled(accumulated),
        opened = adapter.stream(request) => match opened {
            Ok(stream) => stream,
            Err(e) => return StreamOutcome::Failed(accumulated, e),
        },
    };
    loop {
        tokio::select! {
            () = cancel.cancelled() => return StreamOutcome::Cancelled(accumulated),
            item = stream.next() => match item {
                Some(Ok(StreamEvent::Delta { text })) => {
                    accumulated.push_str(&text);
                    on_chunk(text);
                }
                Some(Ok(StreamEvent::Done)) | None => {
                    return StreamOutcome::Complete(accumulated);
                }
                Some(Err(e)) => return StreamOutcome::Failed(accumulated, e),
            }
        }
    }
}
