pub mod cache;
pub mod command;
pub mod config;
pub mod gate;
pub mod gateway;
pub mod handle;
pub mod log;
pub mod model;
pub mod notify;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use command::RepoCommand;
pub use config::{RepositoryConfig, WatchConfig};
pub use gateway::RepositoryGateway;
pub use handle::RepositoryHandle;
pub use handle::executor::{MainQueue, TaskQueue};
pub use log::{CancelToken, CommitLog};
pub use model::{ChangeAreas, RepoEvent, RepoEventKind, RepoId};
pub use staging::{StagingModel, StagingSnapshot, StatusMap};
