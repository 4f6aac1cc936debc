//! pdfink Application Shell
//!
//! Headless command-line front end: loads a PDF into an editing session backed by the
//! HTTP client, applies one edit through the overlay and saves the backend's result.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Command, ObjectRef};
pub use commands::run;
