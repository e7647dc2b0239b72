//! Command-line interface for the autoprof demo binary
//!
//! This module contains CLI argument parsing and configuration

pub mod args;

pub use args::Args;
