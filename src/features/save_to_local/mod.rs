//! Download a remote file in parts into a local path, resuming from a saved record when possible.
pub mod cli;
pub mod handler;
