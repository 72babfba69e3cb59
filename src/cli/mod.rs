//! Command-line handlers

pub mod commands;

pub use commands::Context;
