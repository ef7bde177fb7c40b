//! Command-line interface
//!
//! Argument parsing and command handlers for the `zonegate` binary.

pub mod args;
pub mod commands;
