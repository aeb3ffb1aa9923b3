//! Error types for layout setup and backend execution

use thiserror::Error;

/// Errors that can occur while configuring or running a layout
#[derive(Error, Debug)]
pub enum LayoutError {
    /// An option is out of range; raised before any buffer is allocated
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The compute/draw backend could not be acquired
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The presentation surface failed while drawing
    #[error("surface error: {0}")]
    Surface(String),

    /// Positions could not be read back from the backend
    #[error("readback error: {0}")]
    Readback(String),
}

/// Result type for layout operations
pub type Result<T> = std::result::Result<T, LayoutError>;
