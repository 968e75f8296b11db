//! # mpdl
//!
//! Multipart downloads: a file is fetched as independent byte ranges written in
//! place, and a finalization step walks the finished parts in order to record
//! checkpoints, settle the download's state and release its file lock.
pub mod features;
pub mod shared;
