//! Session persistence CLI library.
//!
//! Wires storage, validation and recovery into the `sk` commands and the
//! startup restoration flow.

mod cli;
pub mod commands;
mod config;
pub mod manager;
pub mod restore;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use manager::SessionManager;
