//! Infrastructure implementations for Kizuna.
//!
//! SQLite repositories (sqlx, WAL mode, split reader/writer pools), the
//! three upstream chat protocol adapters, the embeddings and web search
//! clients, and the notification sender. Everything here implements a
//! port defined in `kizuna-core`.

pub mod embeddings;
pub mod llm;
pub mod notify;
pub mod search;
pub mod sqlite;
