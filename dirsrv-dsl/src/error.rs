//! Parse errors for the DN and filter text grammars.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DslError {
    #[error("unexpected end of input while parsing {0}")]
    UnexpectedEof(&'static str),
    #[error("unexpected character '{found}' at byte {pos} while parsing {context}")]
    UnexpectedChar {
        found: char,
        pos: usize,
        context: &'static str,
    },
    #[error("invalid hex escape at byte {0}")]
    InvalidHexEscape(usize),
    #[error("invalid UTF-8 in decoded hex value at byte {0}")]
    InvalidUtf8(usize),
    #[error("empty attribute type at byte {0}")]
    EmptyAttributeType(usize),
    #[error("unbalanced parentheses in filter")]
    UnbalancedParens,
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),
    #[error("trailing input after a complete expression: '{0}'")]
    TrailingInput(String),
}

pub type DslResult<T> = Result<T, DslError>;
