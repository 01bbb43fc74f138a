//! Persistence for ResolutionGuard.
//!
//! A single JSON document holds messages, profiles, interventions, and
//! workout logs. Access goes through a bounded [`StorePool`].

pub mod conversation;
pub mod document;
pub mod pool;

pub use conversation::{ConversationStore, DEMO_USER_ID};
pub use document::{DocumentBackend, InMemoryDocument, JsonFileDocument, StoreDocument};
pub use pool::{PoolGuard, PoolOptions, PoolStatus, StorePool};
