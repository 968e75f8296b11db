#[cfg(feature = "local")]
pub mod save_to_local;
