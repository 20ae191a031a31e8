//! # prism-core
//!
//! Foundation types shared by the Prism persistence and dispatch crates:
//!
//! - **Branded IDs**: `ProviderId`, `SessionId`, `ColumnId`, `MessageId`,
//!   `HistoryId` as newtypes for type safety
//! - **Stream events**: [`events::StreamEvent`] — the normalized chunk
//!   protocol every provider adapter emits
//! - **Provider kinds**: [`kind::ProviderKind`] — the closed vendor set
//! - **Roles**: [`role::Role`] for message attribution
//! - **Text utilities**: UTF-8-safe truncation for log previews
//! - **Timestamps**: RFC 3339 millisecond-precision UTC helpers

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod kind;
pub mod role;
pub mod text;
pub mod time;
