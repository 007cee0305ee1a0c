pub mod assistant;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
