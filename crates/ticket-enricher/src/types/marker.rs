//! Sentinel values written in place of generated text

use std::fmt;

/// Class of failure recorded when the inference retry budget runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The service could not be reached (connect error, timeout)
    Transport,
    /// The service answered, but with an error or an unusable body
    Unexpected,
}

/// Reserved values substituted for failed, cancelled or empty results.
///
/// Markers travel through the pipeline as plain text so that every row ends
/// up with a value in both generated columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Cancelled,
    EmptyText,
    ProcessingError,
    LengthMismatch,
    Exhausted { class: FailureClass, model: String },
}

const CANCELLED: &str = "CANCELLED";
const EMPTY_TEXT: &str = "EMPTY_TEXT";
const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
const LENGTH_MISMATCH: &str = "LENGTH_MISMATCH";
const TRANSPORT_PREFIX: &str = "ERROR_TRANSPORT[";
const UNEXPECTED_PREFIX: &str = "ERROR_UNEXPECTED[";

impl Marker {
    pub fn exhausted(class: FailureClass, model: impl Into<String>) -> Self {
        Marker::Exhausted {
            class,
            model: model.into(),
        }
    }

    /// Recognize a marker in generated output
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            CANCELLED => return Some(Marker::Cancelled),
            EMPTY_TEXT => return Some(Marker::EmptyText),
            PROCESSING_ERROR => return Some(Marker::ProcessingError),
            LENGTH_MISMATCH => return Some(Marker::LengthMismatch),
            _ => {}
        }

        let (class, rest) = if let Some(rest) = value.strip_prefix(TRANSPORT_PREFIX) {
            (FailureClass::Transport, rest)
        } else if let Some(rest) = value.strip_prefix(UNEXPECTED_PREFIX) {
            (FailureClass::Unexpected, rest)
        } else {
            return None;
        };

        rest.strip_suffix(']')
            .map(|model| Marker::exhausted(class, model))
    }

    /// Whether this marker stands for a failed generation
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Marker::ProcessingError | Marker::LengthMismatch | Marker::Exhausted { .. }
        )
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Cancelled => f.write_str(CANCELLED),
            Marker::EmptyText => f.write_str(EMPTY_TEXT),
            Marker::ProcessingError => f.write_str(PROCESSING_ERROR),
            Marker::LengthMismatch => f.write_str(LENGTH_MISMATCH),
            Marker::Exhausted { class, model } => {
                let prefix = match class {
                    FailureClass::Transport => TRANSPORT_PREFIX,
                    FailureClass::Unexpected => UNEXPECTED_PREFIX,
                };
                write!(f, "{}{}]", prefix, model)
            }
        }
    }
}

/// True when `value` is a marker that stands for a failed generation
pub fn is_error_value(value: &str) -> bool {
    Marker::parse(value).is_some_and(|m| m.is_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_marker_encodes_class_and_model() {
        let marker = Marker::exhausted(FailureClass::Transport, "gemma:2b");
        assert_eq!(marker.to_string(), "ERROR_TRANSPORT[gemma:2b]");
        assert_eq!(Marker::parse("ERROR_TRANSPORT[gemma:2b]"), Some(marker));

        let marker = Marker::exhausted(FailureClass::Unexpected, "phi3");
        assert_eq!(marker.to_string(), "ERROR_UNEXPECTED[phi3]");
    }

    #[test]
    fn test_error_classification() {
        assert!(is_error_value("PROCESSING_ERROR"));
        assert!(is_error_value("ERROR_UNEXPECTED[phi3]"));
        assert!(is_error_value("LENGTH_MISMATCH"));
        assert!(!is_error_value("EMPTY_TEXT"));
        assert!(!is_error_value("CANCELLED"));
        assert!(!is_error_value("Problema de Red"));
        assert!(!is_error_value("ERROR_TRANSPORT[unterminated"));
    }
}
