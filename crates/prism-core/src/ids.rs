//! Branded ID newtypes for type safety.
//!
//! Every entity has a distinct ID type implemented as a newtype wrapper
//! around `String`, preventing a column ID from being passed where a
//! session ID is expected.
//!
//! IDs are UUID v7 (time-ordered) with a short entity prefix, e.g.
//! `prov_0192d3…`. Time-ordering matters: `(created_at, id)` is the total
//! order used by pagination cursors, and v7 IDs break timestamp ties in
//! insertion order.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (prefixed UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(format!(concat!($prefix, "_{}"), Uuid::now_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a configured provider.
    ProviderId, "prov"
}

branded_id! {
    /// Unique identifier for a chat session.
    SessionId, "sess"
}

branded_id! {
    /// Unique identifier for a session column (one provider's thread).
    ColumnId, "col"
}

branded_id! {
    /// Unique identifier for a persisted message.
    MessageId, "msg"
}

branded_id! {
    /// Unique identifier for a history entry.
    HistoryId, "hist"
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_has_prefix_and_valid_uuid() {
        let id = ProviderId::new();
        let raw = id.as_str().strip_prefix("prov_").expect("prefix");
        let parsed = Uuid::parse_str(raw).expect("valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_time_ordered() {
        // UUID v7 sorts by creation time; prefixes are identical so the
        // full string order follows the UUID order.
        let first = HistoryId::new();
        let second = HistoryId::new();
        assert!(first < second);
    }

    #[test]
    fn roundtrip_through_string() {
        let id = SessionId::new();
        let s: String = id.clone().into();
        let back = SessionId::from(s);
        assert_eq!(id, back);
    }

    #[test]
    fn serde_is_transparent() {
        let id = ColumnId::from("col_fixed");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"col_fixed\"");
        let back: ColumnId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
