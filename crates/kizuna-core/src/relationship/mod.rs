//! Relationship state: pure decay arithmetic and the read-modify-write engine.

pub mod decay;
pub mod engine;

pub use engine::{RelationshipEngine, StatusChange, normalize_state};
