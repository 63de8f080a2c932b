pub mod config;
pub mod dispatcher;
pub mod observability;
pub mod queue;
pub mod remote;
pub mod service;
pub mod watcher;
