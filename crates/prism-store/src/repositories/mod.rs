//! Stateless per-entity repositories.
//!
//! Every method takes a `&Connection`; transactions, locking, and pooling
//! are the [`crate::store::ChatStore`] facade's job. Nothing outside this
//! module issues SQL.

pub mod column;
pub mod history;
pub mod message;
pub mod provider;
pub mod search;
pub mod session;

pub use column::ColumnRepo;
pub use history::HistoryRepo;
pub use message::MessageRepo;
pub use provider::ProviderRepo;
pub use search::SearchRepo;
pub use session::SessionRepo;
