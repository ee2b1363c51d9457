//! Business logic and repository trait definitions for Kizuna.
//!
//! This crate defines the "ports" (repository traits) that the
//! infrastructure layer implements, plus the orchestration core itself:
//! the tool-calling agent loop, the relationship state engine, the diary
//! and proactive services, and the lock-guarded schedulers. It depends
//! only on `kizuna-types` -- never on `kizuna-infra` or any database/IO
//! crate.

pub mod agent;
pub mod diary;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod proactive;
pub mod relationship;
pub mod repository;
pub mod sanitize;
pub mod scheduler;
pub mod search;
pub mod settings_cache;
pub mod timefmt;
