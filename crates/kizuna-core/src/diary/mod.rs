//! Diary and profile generation.

pub mod generator;
pub mod profile;
pub mod service;

pub use generator::{DiaryGeneration, DiaryParams, generate_diary};
pub use profile::{ProfileGeneration, ProfileParams, generate_user_profile};
pub use service::{DiaryRunSummary, DiaryService, MAX_HIGHLIGHTS_PER_DAY};
