//! Persistent job database (SQLite via sqlx).
//!
//! One row per job; `source_url` carries a unique index so duplicate
//! submissions surface as [`crate::Error::DuplicateUrl`].

pub mod db;
mod jobs;
pub mod types;

pub use db::*;
pub use types::*;
