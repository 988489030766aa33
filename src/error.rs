//! A custom sanrep error.
use std::fmt;
use std::result;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Structural violation found while parsing a sanitizer report
pub enum Error {
    /// A mandatory line is missing or does not match its pattern
    Parse(String),
    /// Input ended inside a section that needs a terminator
    Truncated(String),
    /// Frame indices of one stack are not 0, 1, 2, ...
    StackIndex {
        /// Index the next frame must carry.
        expected: usize,
        /// Index found in the report.
        found: usize,
    },
    /// Offset/length/size of an out-of-bounds access are inconsistent
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Parse(ref msg) => write!(f, "Parse: {msg}"),
            Error::Truncated(ref msg) => write!(f, "Truncated report: {msg}"),
            Error::StackIndex { expected, found } => {
                write!(f, "Stack frame #{found} found where #{expected} was expected")
            }
            Error::Invariant(ref msg) => write!(f, "Invariant: {msg}"),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
