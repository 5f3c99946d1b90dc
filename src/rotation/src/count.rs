//! Retention counts and the restricted arithmetic used to configure them.
//!
//! A count is either a non-negative integer or the literal `always`. Integers
//! may be written as small arithmetic expressions (`"24*7"`, `"5+2"`) built
//! from integer literals and `+ - * /` with the usual precedence. Nothing else
//! is accepted: no parentheses, no unary operators, no identifiers.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ALWAYS: &str = "always";

/// How many buckets of one frequency class a scheme retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionCount {
    /// Keep one representative from each of the `n` most recent buckets.
    Limited(usize),
    /// Keep every member of every bucket.
    Always,
}

impl RetentionCount {
    /// A class with a zero count is skipped entirely.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, RetentionCount::Limited(0))
    }

    /// The bucket limit, or `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        match self {
            RetentionCount::Limited(limit) => Some(*limit),
            RetentionCount::Always => None,
        }
    }

    /// Evaluate a configured count string.
    pub fn parse(expression: &str) -> Result<Self, CountExpressionError> {
        evaluate_count_expression(expression)
    }
}

impl Default for RetentionCount {
    fn default() -> Self {
        RetentionCount::Limited(0)
    }
}

impl fmt::Display for RetentionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionCount::Limited(limit) => write!(f, "{limit}"),
            RetentionCount::Always => f.write_str(ALWAYS),
        }
    }
}

impl FromStr for RetentionCount {
    type Err = CountExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        evaluate_count_expression(s)
    }
}

impl Serialize for RetentionCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RetentionCount::Limited(limit) => serializer.serialize_u64(*limit as u64),
            RetentionCount::Always => serializer.serialize_str(ALWAYS),
        }
    }
}

/// Errors produced while evaluating a count expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CountExpressionError {
    #[error("Count expression is empty")]
    Empty,

    #[error("Unexpected character '{character}' at position {position} in count expression '{expression}'")]
    UnexpectedCharacter {
        expression: String,
        character: char,
        position: usize,
    },

    #[error("Malformed count expression '{0}'")]
    Malformed(String),

    #[error("Division by zero in count expression '{0}'")]
    DivisionByZero(String),

    #[error("Count expression '{0}' overflows")]
    Overflow(String),

    #[error("Count expression '{expression}' evaluates to negative value {value}")]
    Negative { expression: String, value: i64 },
}

/// Evaluate a count string to a [`RetentionCount`].
///
/// Accepts `always` (case-insensitive) or an integer arithmetic expression.
pub fn evaluate_count_expression(expression: &str) -> Result<RetentionCount, CountExpressionError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(CountExpressionError::Empty);
    }
    if trimmed.eq_ignore_ascii_case(ALWAYS) {
        return Ok(RetentionCount::Always);
    }

    let tokens = tokenize(trimmed)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
        expression: trimmed,
    };
    let value = parser.sum()?;
    if parser.position != tokens.len() {
        return Err(CountExpressionError::Malformed(trimmed.to_string()));
    }
    if value < 0 {
        return Err(CountExpressionError::Negative {
            expression: trimmed.to_string(),
            value,
        });
    }

    usize::try_from(value)
        .map(RetentionCount::Limited)
        .map_err(|_| CountExpressionError::Overflow(trimmed.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Number(i64),
    Plus,
    Minus,
    Star,
    Slash,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, CountExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((position, character)) = chars.next() {
        match character {
            c if c.is_whitespace() => {}
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            c if c.is_ascii_digit() => {
                let mut value = i64::from(c.to_digit(10).unwrap_or(0));
                while let Some(&(_, next)) = chars.peek() {
                    let Some(digit) = next.to_digit(10) else {
                        break;
                    };
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(i64::from(digit)))
                        .ok_or_else(|| CountExpressionError::Overflow(expression.to_string()))?;
                    chars.next();
                }
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(CountExpressionError::UnexpectedCharacter {
                    expression: expression.to_string(),
                    character: other,
                    position,
                });
            }
        }
    }

    Ok(tokens)
}

/// Precedence-climbing over `sum := product (('+'|'-') product)*` and
/// `product := number (('*'|'/') number)*`.
struct Parser<'a> {
    tokens: &'a [Token],
    position: usize,
    expression: &'a str,
}

impl Parser<'_> {
    fn sum(&mut self) -> Result<i64, CountExpressionError> {
        let mut value = self.product()?;
        loop {
            let combined = match self.peek() {
                Some(Token::Plus) => {
                    self.position += 1;
                    value.checked_add(self.product()?)
                }
                Some(Token::Minus) => {
                    self.position += 1;
                    value.checked_sub(self.product()?)
                }
                _ => return Ok(value),
            };
            value = combined.ok_or_else(|| self.overflow())?;
        }
    }

    fn product(&mut self) -> Result<i64, CountExpressionError> {
        let mut value = self.number()?;
        loop {
            let combined = match self.peek() {
                Some(Token::Star) => {
                    self.position += 1;
                    value.checked_mul(self.number()?)
                }
                Some(Token::Slash) => {
                    self.position += 1;
                    let divisor = self.number()?;
                    if divisor == 0 {
                        return Err(CountExpressionError::DivisionByZero(
                            self.expression.to_string(),
                        ));
                    }
                    value.checked_div(divisor)
                }
                _ => return Ok(value),
            };
            value = combined.ok_or_else(|| self.overflow())?;
        }
    }

    fn number(&mut self) -> Result<i64, CountExpressionError> {
        match self.peek() {
            Some(Token::Number(value)) => {
                self.position += 1;
                Ok(value)
            }
            _ => Err(CountExpressionError::Malformed(self.expression.to_string())),
        }
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn overflow(&self) -> CountExpressionError {
        CountExpressionError::Overflow(self.expression.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integers() {
        assert_eq!(RetentionCount::parse("0").unwrap(), RetentionCount::Limited(0));
        assert_eq!(RetentionCount::parse("72").unwrap(), RetentionCount::Limited(72));
        assert_eq!(RetentionCount::parse("  12 ").unwrap(), RetentionCount::Limited(12));
    }

    #[test]
    fn test_always_is_case_insensitive() {
        assert_eq!(RetentionCount::parse("always").unwrap(), RetentionCount::Always);
        assert_eq!(RetentionCount::parse(" ALWAYS ").unwrap(), RetentionCount::Always);
    }

    #[test]
    fn test_arithmetic_expressions() {
        assert_eq!(RetentionCount::parse("5+2").unwrap(), RetentionCount::Limited(7));
        assert_eq!(RetentionCount::parse("4*2").unwrap(), RetentionCount::Limited(8));
        assert_eq!(RetentionCount::parse("24 * 7").unwrap(), RetentionCount::Limited(168));
        assert_eq!(RetentionCount::parse("10-2*3").unwrap(), RetentionCount::Limited(4));
        assert_eq!(RetentionCount::parse("7/2").unwrap(), RetentionCount::Limited(3));
        assert_eq!(RetentionCount::parse("1-5+10").unwrap(), RetentionCount::Limited(6));
    }

    #[test]
    fn test_rejects_non_arithmetic_input() {
        assert_eq!(RetentionCount::parse(""), Err(CountExpressionError::Empty));
        assert!(matches!(
            RetentionCount::parse("__import__('os')"),
            Err(CountExpressionError::UnexpectedCharacter { character: '_', .. })
        ));
        assert!(matches!(
            RetentionCount::parse("(1+2)"),
            Err(CountExpressionError::UnexpectedCharacter { character: '(', .. })
        ));
        assert!(matches!(
            RetentionCount::parse("2**3"),
            Err(CountExpressionError::Malformed(_))
        ));
        assert!(matches!(
            RetentionCount::parse("-1"),
            Err(CountExpressionError::Malformed(_))
        ));
        assert!(matches!(
            RetentionCount::parse("3 4"),
            Err(CountExpressionError::Malformed(_))
        ));
        assert!(matches!(
            RetentionCount::parse("sometimes"),
            Err(CountExpressionError::UnexpectedCharacter { .. })
        ));
    }

    #[test]
    fn test_negative_result_is_rejected() {
        assert_eq!(
            RetentionCount::parse("1-5"),
            Err(CountExpressionError::Negative {
                expression: "1-5".to_string(),
                value: -4
            })
        );
    }

    #[test]
    fn test_division_by_zero_and_overflow() {
        assert!(matches!(
            RetentionCount::parse("1/0"),
            Err(CountExpressionError::DivisionByZero(_))
        ));
        assert!(matches!(
            RetentionCount::parse("99999999999999999999"),
            Err(CountExpressionError::Overflow(_))
        ));
        assert!(matches!(
            RetentionCount::parse("9223372036854775807*2"),
            Err(CountExpressionError::Overflow(_))
        ));
    }

    #[test]
    fn test_enabled_and_limit() {
        assert!(!RetentionCount::Limited(0).is_enabled());
        assert!(RetentionCount::Limited(1).is_enabled());
        assert!(RetentionCount::Always.is_enabled());
        assert_eq!(RetentionCount::Limited(3).limit(), Some(3));
        assert_eq!(RetentionCount::Always.limit(), None);
        assert_eq!(RetentionCount::default(), RetentionCount::Limited(0));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for count in [RetentionCount::Limited(14), RetentionCount::Always] {
            assert_eq!(count.to_string().parse::<RetentionCount>().unwrap(), count);
        }
    }
}
