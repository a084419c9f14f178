//! Shared domain types for the prodtrack backend.
//!
//! Two modules:
//! - `registry` — the checklist kinds, their ordered field lists, and the
//!   side-record kind each one owns. The single declaration that storage,
//!   synchronization, and routing all derive from.
//! - `models` — the entity structs and enums exchanged between the store
//!   and the HTTP API.

pub mod models;
pub mod registry;

pub use models::*;
pub use registry::{ChecklistKind, SideRecordKind};
