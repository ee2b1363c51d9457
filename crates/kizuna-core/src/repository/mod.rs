//! Repository trait definitions ("ports") implemented by kizuna-infra.
//!
//! All traits use native async fn in traits (RPITIT, Rust 2024 edition).

pub mod conversation;
pub mod diary;
pub mod fact;
pub mod proactive;
pub mod state;
