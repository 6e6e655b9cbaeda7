pub mod app_config;
pub mod database;
pub mod observability;
pub mod scheduler;

pub use app_config::*;
pub use database::*;
pub use observability::*;
pub use scheduler::*;
