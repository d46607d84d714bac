//! Sandboxed arithmetic evaluation for the `/kalkulator` command.

use std::fmt;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    /// Nothing left after sanitizing, or the syntax did not parse.
    InvalidExpression,
    /// The expression parsed but produced a non-finite value.
    InvalidResult,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::InvalidExpression => write!(f, "Error: Invalid expression"),
            EvalError::InvalidResult => write!(f, "Error: Invalid calculation result"),
        }
    }
}

impl std::error::Error for EvalError {}

/// Strip every character that is not a digit, an operator, a parenthesis, a
/// decimal point, or whitespace.
pub fn sanitize(expr: &str) -> String {
    expr.chars()
        .filter(|c| c.is_ascii_digit() || "+-*/().".contains(*c) || c.is_whitespace())
        .collect()
}

/// Evaluate an arithmetic expression.
///
/// Only the characters kept by [`sanitize`] ever reach the parser.
pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let sanitized = sanitize(expr);
    if sanitized.trim().is_empty() {
        return Err(EvalError::InvalidExpression);
    }
    let value = meval::eval_str(&sanitized).map_err(|_| EvalError::InvalidExpression)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::InvalidResult)
    }
}

/// Render a result without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        "0".to_string()
    } else if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_with_precedence() {
        assert_eq!(evaluate("2+2"), Ok(4.0));
        assert_eq!(evaluate("2 + 2 * 5"), Ok(12.0));
        assert_eq!(evaluate("(2 + 2) * 5"), Ok(20.0));
        assert_eq!(evaluate("7 / 2"), Ok(3.5));
    }

    #[test]
    fn division_by_zero_is_invalid_result() {
        assert_eq!(evaluate("2/0"), Err(EvalError::InvalidResult));
    }

    #[test]
    fn letters_are_stripped_before_parsing() {
        assert_eq!(sanitize("DROP TABLE"), " ");
        assert_eq!(evaluate("DROP TABLE"), Err(EvalError::InvalidExpression));
        assert_eq!(evaluate("sqrt(16)"), Ok(16.0));
        assert_eq!(sanitize("2^3; rm -rf"), "23  -");
    }

    #[test]
    fn malformed_syntax_is_invalid_expression() {
        assert_eq!(evaluate("2 +"), Err(EvalError::InvalidExpression));
        assert_eq!(evaluate("(1 + 2"), Err(EvalError::InvalidExpression));
        assert_eq!(evaluate(""), Err(EvalError::InvalidExpression));
    }

    #[test]
    fn error_strings() {
        assert_eq!(
            EvalError::InvalidExpression.to_string(),
            "Error: Invalid expression"
        );
        assert_eq!(
            EvalError::InvalidResult.to_string(),
            "Error: Invalid calculation result"
        );
    }

    #[test]
    fn formats_integral_values_without_fraction() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-4.0), "-4");
        assert_eq!(format_number(-0.0), "0");
    }
}
