//! The transactional [`ChatStore`] facade.
//!
//! Everything outside this crate talks to the store through this type. It
//! owns the connection pool, runs migrations at open, and wraps multi-step
//! mutations in transactions. A single writer mutex serializes writes;
//! SQLite only allows one writer at a time anyway, and taking the lock up
//! front turns busy-timeout churn into simple queueing.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::cursor::{Cursor, Page};
use crate::errors::{Result, StoreError};
use crate::migrations;
use crate::repositories::{
    ColumnRepo, HistoryRepo, MessageRepo, ProviderRepo, SearchRepo, SessionRepo,
};
use crate::row_types::{ColumnRow, HistoryRow, MessageRow, ProviderRow, SessionRow};
use crate::turns::{Turn, reconstruct_turns};
use crate::types::{
    CreateProvider, CreateSession, MessageStatus, ProviderView, ResponseSnapshot,
    RetentionPolicy, SearchHit, UpdateProvider, UpdateSession,
};
use prism_core::role::Role;

/// A session with its columns, as returned by session reads.
#[derive(Clone, Debug)]
pub struct SessionWithColumns {
    /// The session row.
    pub session: SessionRow,
    /// Its columns in position order.
    pub columns: Vec<ColumnRow>,
}

/// The embedded chat store.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ChatStore {
    pool: ConnectionPool,
    write_lock: Mutex<()>,
}

impl ChatStore {
    /// Open a file-backed store and bring the schema up to date.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot be built or a migration fails. A migration
    /// failure leaves the database at its pre-migration version; opening is
    /// all-or-nothing per migration.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| StoreError::Validation("database path is not valid UTF-8".into()))?;
        let pool = connection::new_file(path, config)?;
        Self::finish_open(pool)
    }

    /// Open an in-memory store (tests and previews).
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::finish_open(pool)
    }

    fn finish_open(pool: ConnectionPool) -> Result<Self> {
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        let conn = store.conn()?;
        let applied = migrations::run_migrations(&conn)?;
        if applied > 0 {
            info!(applied, version = migrations::latest_version(), "schema migrated");
        } else {
            debug!(version = migrations::latest_version(), "schema up to date");
        }
        drop(conn);
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool.get().map_err(StoreError::Pool)
    }

    /// Run `f` inside a write transaction, holding the writer lock.
    fn write_tx<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Internal("writer lock poisoned".into()))?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Current schema version of the underlying database.
    pub fn schema_version(&self) -> Result<u32> {
        let conn = self.conn()?;
        migrations::current_version(&conn)
    }

    // ── Providers ────────────────────────────────────────────────────────

    /// Create a provider. The first provider created becomes active.
    pub fn create_provider(&self, req: &CreateProvider) -> Result<ProviderView> {
        self.write_tx(|conn| ProviderRepo::create(conn, req).map(ProviderView::from_row))
    }

    /// List providers in display order, with secrets reduced to presence.
    pub fn list_providers(&self) -> Result<Vec<ProviderView>> {
        let conn = self.conn()?;
        Ok(ProviderRepo::list(&conn)?
            .into_iter()
            .map(ProviderView::from_row)
            .collect())
    }

    /// Get one provider.
    pub fn get_provider(&self, id: &str) -> Result<ProviderView> {
        let conn = self.conn()?;
        ProviderRepo::get_required(&conn, id).map(ProviderView::from_row)
    }

    /// The active provider, if any.
    pub fn active_provider(&self) -> Result<Option<ProviderView>> {
        let conn = self.conn()?;
        Ok(ProviderRepo::active(&conn)?.map(ProviderView::from_row))
    }

    /// Full provider row, secret reference included. Crate-adjacent callers
    /// (the dispatcher) need the `secret_ref` to resolve API keys; it never
    /// crosses the view boundary.
    pub fn provider_row(&self, id: &str) -> Result<ProviderRow> {
        let conn = self.conn()?;
        ProviderRepo::get_required(&conn, id)
    }

    /// Apply a sparse provider update.
    pub fn update_provider(&self, id: &str, req: &UpdateProvider) -> Result<ProviderView> {
        self.write_tx(|conn| ProviderRepo::update(conn, id, req).map(ProviderView::from_row))
    }

    /// Make `id` the single active provider.
    pub fn set_active_provider(&self, id: &str) -> Result<()> {
        self.write_tx(|conn| {
            let _ = ProviderRepo::get_required(conn, id)?;
            ProviderRepo::clear_active(conn)?;
            ProviderRepo::mark_active(conn, id)
        })
    }

    /// Delete a provider. Columns referencing it are detached, not deleted.
    /// If the active provider is deleted, the first remaining provider by
    /// display order becomes active.
    pub fn delete_provider(&self, id: &str) -> Result<()> {
        self.write_tx(|conn| {
            let was_active = ProviderRepo::delete(conn, id)?;
            if was_active {
                if let Some(next) = ProviderRepo::activate_first_by_order(conn)? {
                    debug!(provider_id = %next, "active provider reassigned");
                }
            }
            Ok(())
        })
    }

    /// Record where a provider's API key lives, or clear it.
    pub fn set_provider_secret_ref(&self, id: &str, secret_ref: Option<&str>) -> Result<()> {
        self.write_tx(|conn| {
            let _ = ProviderRepo::get_required(conn, id)?;
            ProviderRepo::set_secret_ref(conn, id, secret_ref)
        })
    }

    // ── Sessions and columns ─────────────────────────────────────────────

    /// Create a session with one column per entry in `provider_ids`.
    pub fn create_session(&self, req: &CreateSession) -> Result<SessionWithColumns> {
        self.write_tx(|conn| {
            let session = SessionRepo::create(conn, &req.title, req.system_prompt.as_deref())?;
            let mut columns = Vec::with_capacity(req.provider_ids.len());
            for provider_id in &req.provider_ids {
                let _ = ProviderRepo::get_required(conn, provider_id)?;
                columns.push(ColumnRepo::create(conn, &session.id, provider_id)?);
            }
            Ok(SessionWithColumns { session, columns })
        })
    }

    /// Get a session and its columns.
    pub fn get_session(&self, id: &str) -> Result<SessionWithColumns> {
        let conn = self.conn()?;
        let session = SessionRepo::get_required(&conn, id)?;
        let columns = ColumnRepo::list_by_session(&conn, id)?;
        Ok(SessionWithColumns { session, columns })
    }

    /// List sessions, most recently active first.
    pub fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        let conn = self.conn()?;
        SessionRepo::list(&conn)
    }

    /// Apply a sparse session update.
    pub fn update_session(&self, id: &str, req: &UpdateSession) -> Result<SessionRow> {
        self.write_tx(|conn| SessionRepo::update(conn, id, req))
    }

    /// Reconcile a session's columns against a new provider list: kept
    /// providers keep their columns and messages, new providers get fresh
    /// columns, dropped providers lose column and messages.
    pub fn set_session_providers(
        &self,
        session_id: &str,
        provider_ids: &[String],
    ) -> Result<SessionWithColumns> {
        self.write_tx(|conn| {
            let session = SessionRepo::get_required(conn, session_id)?;
            for provider_id in provider_ids {
                let _ = ProviderRepo::get_required(conn, provider_id)?;
            }
            let columns = ColumnRepo::reconcile(conn, session_id, provider_ids)?;
            SessionRepo::touch(conn, session_id)?;
            Ok(SessionWithColumns { session, columns })
        })
    }

    /// Delete a session and everything under it.
    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.write_tx(|conn| SessionRepo::delete(conn, id))
    }

    /// Get a single column.
    pub fn get_column(&self, id: &str) -> Result<ColumnRow> {
        let conn = self.conn()?;
        ColumnRepo::get_required(&conn, id)
    }

    /// Find the column in a session bound to a provider, if any.
    pub fn find_column_for_provider(
        &self,
        session_id: &str,
        provider_id: &str,
    ) -> Result<Option<ColumnRow>> {
        let conn = self.conn()?;
        ColumnRepo::find_by_provider(&conn, session_id, provider_id)
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Append a user message to a column.
    pub fn append_user_message(&self, column_id: &str, body: &str) -> Result<MessageRow> {
        self.write_tx(|conn| {
            let column = ColumnRepo::get_required(conn, column_id)?;
            let row =
                MessageRepo::append(conn, column_id, Role::User, body, MessageStatus::Complete, None)?;
            SessionRepo::touch(conn, &column.session_id)?;
            Ok(row)
        })
    }

    /// Append an assistant message in its terminal status. `error` is
    /// required for error and partial rows and forbidden for complete ones.
    pub fn append_assistant_message(
        &self,
        column_id: &str,
        body: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> Result<MessageRow> {
        self.write_tx(|conn| {
            let column = ColumnRepo::get_required(conn, column_id)?;
            let row = MessageRepo::append(conn, column_id, Role::Assistant, body, status, error)?;
            SessionRepo::touch(conn, &column.session_id)?;
            Ok(row)
        })
    }

    /// A column's full message log in sequence order.
    pub fn column_messages(&self, column_id: &str) -> Result<Vec<MessageRow>> {
        let conn = self.conn()?;
        let _ = ColumnRepo::get_required(&conn, column_id)?;
        MessageRepo::list_by_column(&conn, column_id)
    }

    /// A column's conversation reconstructed into turns.
    pub fn column_turns(&self, column_id: &str) -> Result<Vec<Turn>> {
        let messages = self.column_messages(column_id)?;
        Ok(reconstruct_turns(&messages))
    }

    /// Page through a column's messages in `(created_at, id)` order.
    pub fn page_messages(
        &self,
        column_id: &str,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<MessageRow>> {
        let conn = self.conn()?;
        let _ = ColumnRepo::get_required(&conn, column_id)?;
        MessageRepo::page_by_column(&conn, column_id, limit, cursor)
    }

    // ── History ──────────────────────────────────────────────────────────

    /// Record one completed dispatch in the query history.
    pub fn record_history(
        &self,
        prompt: &str,
        provider_ids: &[String],
        responses: &[ResponseSnapshot],
        latency_ms: Option<i64>,
    ) -> Result<HistoryRow> {
        self.write_tx(|conn| {
            HistoryRepo::insert(conn, prompt, provider_ids, responses, latency_ms)
        })
    }

    /// Get one history entry.
    pub fn get_history(&self, id: &str) -> Result<HistoryRow> {
        let conn = self.conn()?;
        HistoryRepo::get_required(&conn, id)
    }

    /// Page through history in `(created_at, id)` order.
    pub fn page_history(&self, limit: u32, cursor: Option<&Cursor>) -> Result<Page<HistoryRow>> {
        let conn = self.conn()?;
        HistoryRepo::page(&conn, limit, cursor)
    }

    /// Delete one history entry.
    pub fn delete_history(&self, id: &str) -> Result<()> {
        self.write_tx(|conn| HistoryRepo::delete(conn, id))
    }

    /// Prune history entries outside the retention window.
    pub fn prune_history(&self, policy: RetentionPolicy) -> Result<usize> {
        self.write_tx(|conn| {
            let removed = HistoryRepo::prune(conn, policy)?;
            if removed > 0 {
                info!(removed, "history pruned");
            }
            Ok(removed)
        })
    }

    // ── Search ───────────────────────────────────────────────────────────

    /// Full-text search over message bodies, best match first.
    pub fn search_messages(
        &self,
        query: &str,
        session_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.conn()?;
        SearchRepo::messages(&conn, query, session_id, limit)
    }

    /// Full-text search over history in `(created_at, id)` order,
    /// cursor-paginated.
    pub fn search_history(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Page<HistoryRow>> {
        let conn = self.conn()?;
        SearchRepo::history(&conn, query, limit, cursor)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turns::TurnState;
    use crate::types::ProviderKind;

    fn store() -> ChatStore {
        ChatStore::open_in_memory().unwrap()
    }

    fn provider(store: &ChatStore, name: &str) -> ProviderView {
        store
            .create_provider(&CreateProvider {
                name: name.into(),
                kind: ProviderKind::OpenAi,
                base_url: None,
                model: None,
            })
            .unwrap()
    }

    #[test]
    fn open_runs_migrations() {
        let store = store();
        assert_eq!(
            store.schema_version().unwrap(),
            migrations::latest_version()
        );
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prism.db");
        let config = ConnectionConfig::default();
        {
            let store = ChatStore::open(&path, &config).unwrap();
            let _ = provider(&store, "A");
        }
        let reopened = ChatStore::open(&path, &config).unwrap();
        assert_eq!(reopened.list_providers().unwrap().len(), 1);
    }

    #[test]
    fn first_provider_becomes_active() {
        let store = store();
        let a = provider(&store, "A");
        let b = provider(&store, "B");
        assert!(a.is_active);
        assert!(!b.is_active);

        store.set_active_provider(&b.id).unwrap();
        let active = store.active_provider().unwrap().unwrap();
        assert_eq!(active.id, b.id);
    }

    #[test]
    fn deleting_active_provider_falls_back() {
        let store = store();
        let a = provider(&store, "A");
        let b = provider(&store, "B");
        store.delete_provider(&a.id).unwrap();
        let active = store.active_provider().unwrap().unwrap();
        assert_eq!(active.id, b.id);
    }

    #[test]
    fn deleting_provider_detaches_columns_and_keeps_messages() {
        let store = store();
        let p = provider(&store, "A");
        let sc = store
            .create_session(&CreateSession {
                title: "T".into(),
                system_prompt: None,
                provider_ids: vec![p.id.clone()],
            })
            .unwrap();
        let col = &sc.columns[0];
        let _ = store.append_user_message(&col.id, "hi").unwrap();

        store.delete_provider(&p.id).unwrap();
        let reread = store.get_column(&col.id).unwrap();
        assert!(reread.provider_id.is_none());
        assert_eq!(store.column_messages(&col.id).unwrap().len(), 1);
    }

    #[test]
    fn session_create_rejects_unknown_provider() {
        let store = store();
        let err = store
            .create_session(&CreateSession {
                title: "T".into(),
                system_prompt: None,
                provider_ids: vec!["prov_nope".into()],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ProviderNotFound(_)));
        // The whole transaction rolled back, including the session row.
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn turns_reflect_terminal_statuses() {
        let store = store();
        let p = provider(&store, "A");
        let sc = store
            .create_session(&CreateSession {
                title: "T".into(),
                system_prompt: None,
                provider_ids: vec![p.id.clone()],
            })
            .unwrap();
        let col = &sc.columns[0].id;

        let _ = store.append_user_message(col, "hi").unwrap();
        let _ = store
            .append_assistant_message(col, "hello", MessageStatus::Complete, None)
            .unwrap();
        let _ = store.append_user_message(col, "and?").unwrap();
        let _ = store
            .append_assistant_message(col, "", MessageStatus::Error, Some("rate limited"))
            .unwrap();

        let turns = store.column_turns(col).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].state, TurnState::Complete);
        assert_eq!(turns[1].state, TurnState::Errored);
    }

    #[test]
    fn set_session_providers_reconciles() {
        let store = store();
        let a = provider(&store, "A");
        let b = provider(&store, "B");
        let sc = store
            .create_session(&CreateSession {
                title: "T".into(),
                system_prompt: None,
                provider_ids: vec![a.id.clone()],
            })
            .unwrap();
        let kept_col = sc.columns[0].id.clone();
        let _ = store.append_user_message(&kept_col, "keep me").unwrap();

        let updated = store
            .set_session_providers(&sc.session.id, &[b.id.clone(), a.id.clone()])
            .unwrap();
        assert_eq!(updated.columns.len(), 2);
        assert_eq!(updated.columns[0].provider_id.as_deref(), Some(b.id.as_str()));
        assert_eq!(updated.columns[1].id, kept_col);
        assert_eq!(store.column_messages(&kept_col).unwrap().len(), 1);
    }

    #[test]
    fn history_roundtrip_and_search() {
        let store = store();
        let _ = store
            .record_history(
                "compare rust and go",
                &["prov_a".into()],
                &[ResponseSnapshot {
                    provider_id: "prov_a".into(),
                    text: "Rust has ownership.".into(),
                    error: None,
                }],
                Some(400),
            )
            .unwrap();

        let page = store.page_history(10, None).unwrap();
        assert_eq!(page.items.len(), 1);
        let hits = store.search_history("ownership", 10, None).unwrap();
        assert_eq!(hits.items.len(), 1);
    }
}
