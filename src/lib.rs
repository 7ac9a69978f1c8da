pub mod anchor;
pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod workflow;
