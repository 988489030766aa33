//! Parser configuration.

/// Checkout location of the instrumented project.
pub const DEFAULT_SOURCE_ROOT: &str = "/root";

/// Settings shared by all body parsers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseConfig {
    /// Only frames with a source path under this directory are kept in
    /// AddressSanitizer and UndefinedBehaviorSanitizer stacks. The prefix is
    /// removed from the reported locations.
    pub source_root: String,
}

impl ParseConfig {
    pub fn new(source_root: impl Into<String>) -> Self {
        ParseConfig {
            source_root: source_root.into(),
        }
    }
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig::new(DEFAULT_SOURCE_ROOT)
    }
}
