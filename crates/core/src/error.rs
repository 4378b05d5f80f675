/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the core crate.
///
/// Nothing on the per-frame extraction path produces one of these; input
/// anomalies are normalised in place. Errors surface from configuration,
/// parameter edits and layer resource acquisition.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or persisted state that could not be parsed.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Failure reported by the FFT backend.
    #[error("fft failed: {0}")]
    Fft(#[from] realfft::FftError),
    /// A configuration value is outside its usable range.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("no layer registered with id `{0}`")]
    UnknownLayer(String),
    #[error("layer `{layer}` has no control named `{key}`")]
    UnknownParam { layer: String, key: String },
    #[error("invalid value for `{layer}.{key}`: {reason}")]
    InvalidParam {
        layer: String,
        key: String,
        reason: String,
    },
    /// A layer could not acquire a rendering resource. The driver disables
    /// only the offending layer.
    #[error("layer `{layer}` could not acquire {resource}")]
    ResourceUnavailable { layer: String, resource: String },
    #[error("layer `{0}` has been disposed")]
    LayerDisposed(String),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_param_errors_with_layer_and_key() {
        let err = VizError::InvalidParam {
            layer: "bars".into(),
            key: "count".into(),
            reason: "expected a number".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for `bars.count`: expected a number"
        );
    }

    #[test]
    fn converts_plain_strings() {
        let err: VizError = "boom".into();
        assert!(matches!(err, VizError::Message(ref m) if m == "boom"));
    }
}
