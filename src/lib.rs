//! # sanrep
//! sanrep turns raw sanitizer diagnostics into structured reports: error kind,
//! CWE classification and the stack traces of the error, allocation, free and
//! frame-definition sites, plus a natural-language summary of the crash.
//!
//! Supported report sources:
//!
//! * AddressSanitizer
//! * UndefinedBehaviorSanitizer
//! * KernelAddressSanitizer
//! * Jazzer
//!
//! ThreadSanitizer and KernelConcurrencySanitizer tags are accepted, but their
//! logs never produce a report.
//!
//! ```
//! use sanrep::{parse, Sanitizer};
//!
//! assert!(parse("Done 1000 runs in 2 second(s)", Sanitizer::AddressSanitizer).is_none());
//! ```

pub mod asan;
pub mod config;
pub mod constants;
pub mod cwe;
pub mod error;
pub mod jazzer;
pub mod kasan;
pub mod normalize;
pub mod report;
pub mod sanitizer;
pub mod stacktrace;
pub mod summary;
pub mod ubsan;

pub use config::ParseConfig;
pub use cwe::Cwe;
pub use report::{parse, parse_with_config, try_parse, Report, SanitizerReport};
pub use sanitizer::Sanitizer;
pub use stacktrace::{SourceLocation, StackFrame, Stacktrace};
