//! Closed set of sanitizer kinds a report may come from.
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Sanitizer that produced a diagnostic text.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sanitizer {
    AddressSanitizer,
    UndefinedBehaviorSanitizer,
    ThreadSanitizer,
    KernelAddressSanitizer,
    KernelConcurrencySanitizer,
    JazzerSanitizer,
}

impl Sanitizer {
    /// All accepted tags, in declaration order.
    pub const ALL: [Sanitizer; 6] = [
        Sanitizer::AddressSanitizer,
        Sanitizer::UndefinedBehaviorSanitizer,
        Sanitizer::ThreadSanitizer,
        Sanitizer::KernelAddressSanitizer,
        Sanitizer::KernelConcurrencySanitizer,
        Sanitizer::JazzerSanitizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sanitizer::AddressSanitizer => "AddressSanitizer",
            Sanitizer::UndefinedBehaviorSanitizer => "UndefinedBehaviorSanitizer",
            Sanitizer::ThreadSanitizer => "ThreadSanitizer",
            Sanitizer::KernelAddressSanitizer => "KernelAddressSanitizer",
            Sanitizer::KernelConcurrencySanitizer => "KernelConcurrencySanitizer",
            Sanitizer::JazzerSanitizer => "JazzerSanitizer",
        }
    }
}

impl fmt::Display for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sanitizer {
    type Err = String;

    /// Accepts the full tag name or the usual short name (`asan`, `kasan`, ...),
    /// ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "addresssanitizer" | "asan" => Ok(Sanitizer::AddressSanitizer),
            "undefinedbehaviorsanitizer" | "ubsan" => Ok(Sanitizer::UndefinedBehaviorSanitizer),
            "threadsanitizer" | "tsan" => Ok(Sanitizer::ThreadSanitizer),
            "kerneladdresssanitizer" | "kasan" => Ok(Sanitizer::KernelAddressSanitizer),
            "kernelconcurrencysanitizer" | "kcsan" => Ok(Sanitizer::KernelConcurrencySanitizer),
            "jazzersanitizer" | "jazzer" => Ok(Sanitizer::JazzerSanitizer),
            _ => Err(format!("Unknown sanitizer: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitizer_names() {
        for sanitizer in Sanitizer::ALL {
            assert_eq!(sanitizer.to_string().parse::<Sanitizer>(), Ok(sanitizer));
        }
        assert_eq!("kasan".parse::<Sanitizer>(), Ok(Sanitizer::KernelAddressSanitizer));
        assert_eq!("Jazzer".parse::<Sanitizer>(), Ok(Sanitizer::JazzerSanitizer));
        assert!("BearSanitizer".parse::<Sanitizer>().is_err());
    }
}
