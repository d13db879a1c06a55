pub mod activity_log;
pub mod actor;
pub mod aggregate;
pub mod cascade;
pub mod config;
pub mod error;
pub mod guard;
pub mod hierarchy;
pub mod listing;
pub mod melp;
pub mod ownership;
pub mod references;
pub mod search;
pub mod service;
pub mod status;
pub mod store;
pub mod tabs;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use actor::{Actor, Owner};
pub use aggregate::{Aggregate, AggregateKind};
pub use config::EngineConfig;
pub use error::WorkflowError;
pub use service::WorkflowService;
pub use status::StatusName;
