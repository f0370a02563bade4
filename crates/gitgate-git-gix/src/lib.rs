mod backend;
mod process;
mod repo;
mod util;

pub use backend::GixBackend;
pub use process::{ProcessExecutor, classify_failure};
