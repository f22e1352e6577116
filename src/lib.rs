pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod presence;
pub mod push;
pub mod server;
pub mod store;
pub mod time_utils;
