//! # prism-store
//!
//! The schema-versioned embedded store behind the Prism launcher: providers,
//! chat sessions, per-provider message columns, query history, and FTS5
//! full-text search.
//!
//! Layering, bottom up:
//!
//! - [`connection`] — `r2d2` pool over `rusqlite` with WAL + foreign keys
//! - [`migrations`] — ordered, idempotent, transactional schema upgrades
//! - [`repositories`] — stateless per-entity SQL, every method takes a
//!   `&Connection`
//! - [`turns`] — pure read-time reconstruction of conversation turns
//! - [`cursor`] — opaque `(created_at, id)` pagination tokens
//! - [`store`] — the transactional [`store::ChatStore`] facade; the only
//!   type the rest of the system talks to
//!
//! Messages are append-only. Turns are never persisted — they are derived
//! from the raw message sequence on every read, so pairing-rule changes
//! never require a migration.

#![deny(unsafe_code)]

pub mod connection;
pub mod cursor;
pub mod errors;
pub mod export;
pub mod migrations;
pub mod repositories;
pub mod row_types;
pub mod store;
pub mod turns;
pub mod types;

pub use cursor::{Cursor, Page};
pub use errors::{Result, StoreError};
pub use store::ChatStore;
