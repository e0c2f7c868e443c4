//! Error types for template formatting.

use thiserror::Error;

/// Errors raised while parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A replacement field names a value that is not in the field set
    #[error("unknown field '{name}' in template '{template}'\n  Suggestion: Use one of the extracted field names or query fields")]
    UnknownField {
        /// The template being rendered
        template: String,
        /// Field reference as written (including `.attr`)
        name: String,
    },

    /// `!x` conversion other than u, l, A, b, s
    #[error("unsupported conversion '!{conversion}'\n  Suggestion: Supported conversions are !u, !l, !A, !b and !s")]
    UnsupportedConversion {
        /// The conversion character
        conversion: char,
    },

    /// A function chain names something outside the whitelist
    #[error("unsupported function '{name}'\n  Suggestion: Only whitelisted functions may be called (replace, split, get, strip, upper, lower)")]
    UnsupportedFunction {
        /// Function identifier
        name: String,
    },

    /// A function chain is not `call(.call)*` with literal arguments, or a call failed
    #[error("invalid expression '{expression}': {reason}")]
    InvalidExpression {
        /// The offending expression
        expression: String,
        /// Why it was rejected
        reason: String,
    },

    /// A value cannot be rendered the way the template asks
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field reference
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The template itself is malformed
    #[error("invalid template '{template}': {reason}\n  Suggestion: Escape literal braces as {{{{ and }}}}")]
    Syntax {
        /// The template
        template: String,
        /// Why it was rejected
        reason: String,
    },
}

impl FormatError {
    /// Creates an `InvalidExpression` error.
    #[must_use]
    pub fn invalid_expression(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Syntax` error.
    #[must_use]
    pub fn syntax(template: &str, reason: impl Into<String>) -> Self {
        Self::Syntax {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_suggestion_shows_escaped_braces() {
        let err = FormatError::syntax("{a", "unclosed field");
        assert!(err.to_string().contains("{{ and }}"));
    }

    #[test]
    fn test_unsupported_function_names_whitelist() {
        let err = FormatError::UnsupportedFunction {
            name: "eval".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'eval'"));
        assert!(msg.contains("replace, split, get"));
    }
}
