//! MeshLink CLI library
//!
//! Command-line front end for the connection manager: scanning, connecting,
//! monitoring a preferred device and sending text messages.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::{MeshApp, TransportSelection};
pub use cli::{Cli, Commands};
pub use config::AppConfig;
pub use error::{CliError, Result};
