//! Error types for the glyphmap core library.
//!
//! A resolver that fails to produce a number at evaluation time is not an
//! error: it yields `None` and the value is left out of the run.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the glyphmap core library.
#[derive(Debug, thiserror::Error)]
pub enum GlyphError {
    /// Invalid Range / Index / Percept / Normalizer / Binding definition.
    #[error("Construction error: {0}")]
    Construction(String),

    /// A node record violates the node schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Settings could not be resolved into an evaluable configuration.
    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "python")]
impl From<GlyphError> for PyErr {
    fn from(err: GlyphError) -> PyErr {
        match &err {
            GlyphError::Construction(_)
            | GlyphError::Schema(_)
            | GlyphError::Resolution(_)
            | GlyphError::Json(_) => PyValueError::new_err(err.to_string()),
            GlyphError::Pattern(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type GlyphResult<T> = Result<T, GlyphError>;
