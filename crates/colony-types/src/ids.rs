//! Type-safe identifier wrappers.
//!
//! Rooms and workers are addressed by the numeric ids the resource
//! API hands out. Wrapping them prevents a worker id from being used where
//! a room id is expected. [`EventId`] is different: it is minted locally
//! by the activity feed and combines a monotonically increasing counter
//! with the issue timestamp.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around a numeric API id with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw id received from the resource API.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the raw numeric id.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = core::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a room (the top-level tenant).
    RoomId
}

define_id! {
    /// Unique identifier for a worker (an agent instance inside a room).
    WorkerId
}

/// Identifier of an ephemeral activity event.
///
/// `seq` comes from a per-feed counter that never repeats, so ids are unique
/// even when two events are issued within the same millisecond. Ordering is
/// by `seq` first, which is also insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    /// Position in the feed's issue sequence.
    pub seq: u64,
    /// Milliseconds since the Unix epoch at which the id was issued.
    pub issued_at_ms: i64,
}

impl EventId {
    /// Build an id from a sequence number and an issue timestamp.
    pub const fn new(seq: u64, issued_at_ms: i64) -> Self {
        Self { seq, issued_at_ms }
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.issued_at_ms, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_channel_fragments() {
        let id: Result<RoomId, _> = " 42".parse();
        assert_eq!(id.ok(), Some(RoomId::new(42)));
        assert!("abc".parse::<RoomId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&WorkerId::new(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
    }

    #[test]
    fn event_id_display_combines_timestamp_and_counter() {
        let id = EventId::new(3, 1_700_000_000_000);
        assert_eq!(id.to_string(), "1700000000000-3");
    }

    #[test]
    fn event_ids_order_by_sequence() {
        let earlier = EventId::new(1, 2_000);
        let later = EventId::new(2, 1_000);
        assert!(earlier < later);
    }
}
