//! CLI command handlers. Each command is in its own file.

mod add;
mod cancel;
mod concurrency;
mod pause;
mod remove;
mod resume;
mod retry;
mod run;
mod status;

pub use add::{run_add, AddArgs};
pub use cancel::run_cancel;
pub use concurrency::run_concurrency;
pub use pause::run_pause;
pub use remove::run_remove;
pub use resume::run_resume;
pub use retry::run_retry;
pub use run::run_engine;
pub use status::run_status;
