//! # prism-dispatch
//!
//! The concurrent query dispatcher behind the Prism launcher, plus the
//! [`service::Service`] surface the UI layer calls.
//!
//! A dispatch fans one prompt out to several providers at once, one tokio
//! task per provider. Each task streams its vendor response, forwards
//! chunks, and persists exactly one terminal assistant message in its
//! session column; failures are isolated per provider. One history entry
//! records the whole dispatch once every task has finished.

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod service;

pub use dispatcher::{DispatchHandle, Dispatcher};
pub use errors::{DispatchError, Result};
pub use events::{DispatchEvent, DispatchEventKind, DispatchState};
pub use service::Service;
