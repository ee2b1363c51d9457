pub mod chat;
pub mod conversation;
pub mod diary;
pub mod proactive;
pub mod state;
