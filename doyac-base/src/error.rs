//! Error types with source location tracking.
//!
//! Configuration and protocol-loading errors carry a [`Span`] indicating
//! where in the source they occurred, per §7 of the design: these are
//! reported to standard error with exit code 1, never propagated as engine
//! errors.

use crate::span::Span;
use std::fmt;

/// An error annotated with its source location.
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub message: String,
    pub span: Span,
}

impl SpannedError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Construct an error with no associated source location.
    pub fn unspanned(message: impl Into<String>) -> Self {
        Self::new(message, Span::none())
    }
}

impl fmt::Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span == Span::none() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
        }
    }
}

impl std::error::Error for SpannedError {}

/// Alias for `std::result::Result<T, SpannedError>`.
pub type Result<T> = std::result::Result<T, SpannedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanned_error_display_includes_location() {
        let err = SpannedError::new("bad switch combination", Span::new(5, 10));
        let display = format!("{}", err);
        assert!(display.contains("bad switch combination"));
        assert!(display.contains("5..10"));
    }

    #[test]
    fn unspanned_error_omits_location() {
        let err = SpannedError::unspanned("no input file given");
        assert_eq!(format!("{}", err), "no input file given");
    }
}
