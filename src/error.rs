use std::io;

use thiserror::Error;

/// Provides `SimError` and maps other errors to
/// convert to a `SimError`
#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum SimError {
    /// An unknown action or sub-model name, a missing parameter or an out-of-range value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A configured value that is not a number followed by a unit of the expected kind.
    #[error("could not read `{text}` as {expected}")]
    UnitParse { text: String, expected: &'static str },

    /// An invalid numerical state that no clamp policy covers.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("simulation did not terminate within {0} steps")]
    StepLimitReached(usize),

    #[error("report error: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SimError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        SimError::Configuration(message.into())
    }

    /// Returns true for the errors that stem from an invalid configuration:
    /// unknown names, missing parameters and unit mismatches.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SimError::Configuration(_) | SimError::UnitParse { .. }
        )
    }
}

impl From<String> for SimError {
    fn from(error: String) -> Self {
        SimError::Configuration(error)
    }
}

impl From<&str> for SimError {
    fn from(error: &str) -> Self {
        SimError::Configuration(error.to_string())
    }
}
