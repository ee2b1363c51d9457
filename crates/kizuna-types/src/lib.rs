//! Shared domain types for Kizuna.
//!
//! This crate contains the core domain types used across the Kizuna
//! companion backend: the canonical chat message IR, relationship state,
//! conversation/diary records, proactive messaging records, and their
//! associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod memory;
pub mod proactive;
pub mod settings;
pub mod state;
