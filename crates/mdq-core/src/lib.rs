pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod intake;
pub mod job_db;
pub mod logging;
pub mod quality;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod supervisor;

pub use engine::Engine;
pub use error::{Error, Result};
