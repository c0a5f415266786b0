//! Error types for graph and model construction

use thiserror::Error;

/// Errors raised while building inpainting graphs.
///
/// All of these are construction-time or single-forward-pass failures and
/// signal a caller configuration bug; none are retryable at this level.
#[derive(Debug, Error)]
pub enum InpaintError {
    /// Two tensors were combined with incompatible shapes.
    #[error("shape mismatch in {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        context: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    /// A parameter was re-bound with a shape that differs from the stored one.
    #[error("parameter `{name}` has shape {found:?}, expected {expected:?}")]
    ParameterShape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A reuse binding referenced a parameter that was never created.
    #[error("parameter `{name}` not found under reuse")]
    ParameterMissing { name: String },

    /// A create binding collided with an already-registered parameter.
    #[error("parameter `{name}` already exists")]
    ParameterExists { name: String },

    /// A configuration value selected a variant this crate does not provide.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Checkpoint file I/O failure.
    #[error("checkpoint I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint encoding/decoding failure.
    #[error("checkpoint encoding: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for graph construction
pub type Result<T> = std::result::Result<T, InpaintError>;

/// Shorthand for building a [`InpaintError::ShapeMismatch`].
pub(crate) fn shape_mismatch(
    context: &str,
    left: &[usize],
    right: &[usize],
) -> InpaintError {
    InpaintError::ShapeMismatch {
        context: context.to_string(),
        left: left.to_vec(),
        right: right.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = shape_mismatch("concat", &[1, 4, 4, 3], &[1, 8, 8, 3]);
        assert!(format!("{err}").contains("concat"));

        let err = InpaintError::ParameterMissing {
            name: "inpaint_net/conv1/kernel".to_string(),
        };
        assert!(format!("{err}").contains("inpaint_net/conv1/kernel"));

        let err = InpaintError::UnsupportedConfiguration("gan variant `wgan_gp`".to_string());
        assert!(format!("{err}").contains("wgan_gp"));
    }
}
