//! Shared type definitions for the Colony console live data core.
//!
//! This crate is the single source of truth for the records that flow
//! between the resource API, the push transport, the sync core and the
//! dashboard. Types are exported to `TypeScript` via `ts-rs` so the
//! rendering layer consumes exactly what the observer serves.
//!
//! # Modules
//!
//! - [`ids`] -- Numeric id wrappers and the locally minted [`EventId`]
//! - [`enums`] -- Worker states, room status and activity kinds
//! - [`structs`] -- Snapshots, push messages and activity feed items

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ActivityKind, RoomStatus, WorkerState};
pub use ids::{EventId, RoomId, WorkerId};
pub use structs::{ActivityView, Message, Room, SwarmEvent, SwarmRipple, Worker};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the dashboard.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::RoomId::export_all();
        let _ = crate::ids::WorkerId::export_all();
        let _ = crate::ids::EventId::export_all();

        // Enums
        let _ = crate::enums::WorkerState::export_all();
        let _ = crate::enums::RoomStatus::export_all();
        let _ = crate::enums::ActivityKind::export_all();

        // Structs
        let _ = crate::structs::Room::export_all();
        let _ = crate::structs::Worker::export_all();
        let _ = crate::structs::Message::export_all();
        let _ = crate::structs::SwarmEvent::export_all();
        let _ = crate::structs::SwarmRipple::export_all();
        let _ = crate::structs::ActivityView::export_all();
    }
}
