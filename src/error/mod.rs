//! The unified error handling system for the recorder.

pub use types::TelescopeError;

/// A unified `Result` type for the entire crate.
///
/// All functions that can fail should return this type.
pub type Result<T> = std::result::Result<T, TelescopeError>;

pub mod types;
