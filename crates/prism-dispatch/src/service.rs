//! The operations surface exposed to the embedding UI layer.
//!
//! Thin orchestration over [`ChatStore`], the secret store, and the
//! dispatcher: raw API keys cross exactly one boundary here (`set_api_key`
//! into the secret store) and are otherwise only ever pulled out again to
//! build an adapter.

use std::sync::Arc;

use tracing::info;

use prism_llm::secrets::SecretStore;
use prism_llm::{ChunkStream, CompletionRequest, test_connection};
use prism_store::cursor::{Cursor, Page};
use prism_store::export::{self, ExportFormat};
use prism_store::row_types::HistoryRow;
use prism_store::types::{
    CreateProvider, CreateSession, ProviderView, RetentionPolicy, SearchHit, UpdateProvider,
    UpdateSession,
};
use prism_store::ChatStore;

use crate::dispatcher::{DispatchHandle, Dispatcher};
use crate::errors::Result;

/// The Prism service: every operation the UI layer calls.
pub struct Service {
    store: Arc<ChatStore>,
    secrets: Arc<dyn SecretStore>,
    dispatcher: Dispatcher,
}

impl Service {
    /// Assemble the service over an opened store and a secret store.
    pub fn new(store: Arc<ChatStore>, secrets: Arc<dyn SecretStore>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&store), Arc::clone(&secrets));
        Self {
            store,
            secrets,
            dispatcher,
        }
    }

    /// The underlying store, for read paths the embedding host wires up
    /// directly (session lists, message pages, turn reads).
    #[must_use]
    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    // ── Providers ────────────────────────────────────────────────────────

    /// Create a provider. The first one created becomes active. A key
    /// given here goes straight into the secret store; the returned view
    /// never carries it.
    pub fn create_provider(
        &self,
        req: &CreateProvider,
        api_key: Option<&str>,
    ) -> Result<ProviderView> {
        let view = self.store.create_provider(req)?;
        if let Some(key) = api_key {
            self.set_api_key(&view.id, key)?;
            return Ok(self.store.get_provider(&view.id)?);
        }
        Ok(view)
    }

    /// List providers in display order. Views carry `has_api_key`, never
    /// the key.
    pub fn list_providers(&self) -> Result<Vec<ProviderView>> {
        Ok(self.store.list_providers()?)
    }

    /// Apply a sparse provider update.
    pub fn update_provider(&self, id: &str, req: &UpdateProvider) -> Result<ProviderView> {
        Ok(self.store.update_provider(id, req)?)
    }

    /// Delete a provider, its secret, and fall the active flag back to the
    /// lowest remaining display order.
    pub fn delete_provider(&self, id: &str) -> Result<()> {
        let row = self.dispatcher.provider_row(id)?;
        self.store.delete_provider(id)?;
        if let Some(secret_ref) = &row.secret_ref {
            self.secrets.delete_secret(secret_ref)?;
        }
        Ok(())
    }

    /// Atomically make `id` the single active provider.
    pub fn set_active_provider(&self, id: &str) -> Result<ProviderView> {
        self.store.set_active_provider(id)?;
        Ok(self.store.get_provider(id)?)
    }

    /// Store a provider's API key and remember where it lives.
    pub fn set_api_key(&self, id: &str, key: &str) -> Result<()> {
        let row = self.dispatcher.provider_row(id)?;
        let secret_ref = row
            .secret_ref
            .unwrap_or_else(|| format!("prism/provider/{id}"));
        self.secrets.set_secret(&secret_ref, key.as_bytes())?;
        self.store.set_provider_secret_ref(id, Some(&secret_ref))?;
        info!(provider_id = id, "api key stored");
        Ok(())
    }

    /// Remove a provider's API key.
    pub fn clear_api_key(&self, id: &str) -> Result<()> {
        let row = self.dispatcher.provider_row(id)?;
        if let Some(secret_ref) = &row.secret_ref {
            self.secrets.delete_secret(secret_ref)?;
        }
        self.store.set_provider_secret_ref(id, None)?;
        Ok(())
    }

    /// Opaque key-presence flag. The raw key never leaves the secret store
    /// boundary except into an adapter.
    pub fn has_api_key(&self, id: &str) -> Result<bool> {
        Ok(self.store.get_provider(id)?.has_api_key)
    }

    /// Check a provider's endpoint and credentials, bounded at 15 seconds.
    pub async fn test_provider_connection(&self, id: &str) -> Result<()> {
        let row = self.dispatcher.provider_row(id)?;
        let adapter = self.dispatcher.adapter_for_row(&row)?;
        Ok(test_connection(adapter.as_ref()).await?)
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    /// Create a session with one column per provider.
    pub fn create_session(
        &self,
        req: &CreateSession,
    ) -> Result<prism_store::store::SessionWithColumns> {
        Ok(self.store.create_session(req)?)
    }

    /// Apply a sparse session update.
    pub fn update_session(
        &self,
        id: &str,
        req: &UpdateSession,
    ) -> Result<prism_store::row_types::SessionRow> {
        Ok(self.store.update_session(id, req)?)
    }

    /// Reconcile a session's provider set.
    pub fn set_session_providers(
        &self,
        session_id: &str,
        provider_ids: &[String],
    ) -> Result<prism_store::store::SessionWithColumns> {
        Ok(self.store.set_session_providers(session_id, provider_ids)?)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// One-shot single-provider completion: the full text or an error.
    /// Nothing is persisted.
    pub async fn query_once(&self, provider_id: &str, prompt: &str) -> Result<String> {
        let row = self.dispatcher.provider_row(provider_id)?;
        let adapter = self.dispatcher.adapter_for_row(&row)?;
        Ok(adapter.complete(&CompletionRequest::user(prompt)).await?)
    }

    /// Single-provider streaming completion. Nothing is persisted.
    pub async fn query_stream(&self, provider_id: &str, prompt: &str) -> Result<ChunkStream> {
        let row = self.dispatcher.provider_row(provider_id)?;
        let adapter = self.dispatcher.adapter_for_row(&row)?;
        Ok(adapter.stream(&CompletionRequest::user(prompt)).await?)
    }

    /// Fan a prompt out across a session's provider columns.
    pub fn dispatch(
        &self,
        session_id: &str,
        prompt: &str,
        provider_ids: &[String],
    ) -> Result<DispatchHandle> {
        self.dispatcher.dispatch(session_id, prompt, provider_ids)
    }

    // ── History and search ───────────────────────────────────────────────

    /// Full-text search over history, cursor-paginated.
    pub fn search_history(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<HistoryRow>> {
        Ok(self.store.search_history(query, limit, cursor)?)
    }

    /// Full-text search over message bodies.
    pub fn search_messages(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        Ok(self.store.search_messages(query, session_id, limit)?)
    }

    /// Export the full query history, every provider's full response
    /// included.
    pub fn export_history(&self, format: ExportFormat) -> Result<String> {
        let mut entries = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.store.page_history(500, cursor.as_ref())?;
            entries.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(export::export_history(&entries, format)?)
    }

    /// Export one session as Markdown or JSON.
    pub fn export_session(&self, session_id: &str, format: ExportFormat) -> Result<String> {
        Ok(export::export_session(&self.store, session_id, format)?)
    }

    /// Apply the history retention policy.
    pub fn prune_history(&self, policy: RetentionPolicy) -> Result<usize> {
        Ok(self.store.prune_history(policy)?)
    }

    /// Current schema version of the underlying database.
    pub fn schema_version(&self) -> Result<u32> {
        Ok(self.store.schema_version()?)
    }
}
