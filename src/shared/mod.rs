pub mod errors;
pub mod fs;
pub mod locks;
pub mod network;
pub mod progress_tracker;
pub mod transfer;
