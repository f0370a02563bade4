pub mod change;
pub mod diff;
pub mod domain;
pub mod error;
pub mod services;
