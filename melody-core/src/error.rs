//! Error types for the melody core.
//!
//! Only caller contract violations end up here. Silence, noise and
//! out-of-range pitches are ordinary "no pitch" results, not errors.

use thiserror::Error;

use crate::session::SessionState;

/// Errors raised by the melody core.
#[derive(Debug, Error, PartialEq)]
pub enum MelodyError {
    /// Sample rate must be a positive number of samples per second.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Analysis windows must contain at least one sample.
    #[error("Invalid window size: {0}")]
    InvalidWindowSize(usize),

    /// A tuning value in the configuration is out of its valid range.
    #[error("Invalid configuration value for `{field}`: {value}")]
    InvalidConfig { field: &'static str, value: f32 },

    /// The working note buffer must hold at least one note.
    #[error("Note buffer capacity must be at least 1")]
    ZeroCapacity,

    /// A capture session operation was called in the wrong state.
    #[error("Cannot {action} while session is {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
}

/// Result type for melody core operations.
pub type MelodyResult<T> = Result<T, MelodyError>;
