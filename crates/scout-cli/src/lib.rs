//! # scout-cli
//!
//! Command-line interface for Scout.
//!
//! ## Commands
//!
//! - `scout start`: Serve Telegram, run scheduled research, hot-reload config
//! - `scout chat`: Interactive chat in the terminal
//! - `scout research`: Run one research cycle and print the report path
//! - `scout status`: Check the inference endpoint and list recent reports
//! - `scout config`: Show the effective configuration

pub mod commands;

pub use commands::Cli;
