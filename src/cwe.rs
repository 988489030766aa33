//! Common weakness classification of sanitizer error kinds.
//!
//! A [`Cwe`] value is a set of weakness identifiers stored as independent bit
//! flags: one error kind may stand for several weaknesses at once (an
//! out-of-bounds access is both a read and a write candidate when the report
//! text cannot tell them apart).
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::sanitizer::Sanitizer;

/// Set of CWE identifiers. The empty set is the `UNKNOWN` sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Cwe(u32);

impl Cwe {
    pub const UNKNOWN: Cwe = Cwe(0);
    /// Out-of-bounds Write
    pub const CWE_787: Cwe = Cwe(1 << 0);
    /// Cross-site Scripting
    pub const CWE_79: Cwe = Cwe(1 << 1);
    /// SQL Injection
    pub const CWE_89: Cwe = Cwe(1 << 2);
    /// Use After Free
    pub const CWE_416: Cwe = Cwe(1 << 3);
    /// OS Command Injection
    pub const CWE_78: Cwe = Cwe(1 << 4);
    /// Improper Input Validation
    pub const CWE_20: Cwe = Cwe(1 << 5);
    /// Out-of-bounds Read
    pub const CWE_125: Cwe = Cwe(1 << 6);
    /// Path Traversal
    pub const CWE_22: Cwe = Cwe(1 << 7);
    /// Cross-Site Request Forgery
    pub const CWE_352: Cwe = Cwe(1 << 8);
    /// Unrestricted Upload of File with Dangerous Type
    pub const CWE_434: Cwe = Cwe(1 << 9);
    /// Missing Authorization
    pub const CWE_862: Cwe = Cwe(1 << 10);
    /// NULL Pointer Dereference
    pub const CWE_476: Cwe = Cwe(1 << 11);
    /// Improper Authentication
    pub const CWE_287: Cwe = Cwe(1 << 12);
    /// Integer Overflow or Wraparound
    pub const CWE_190: Cwe = Cwe(1 << 13);
    /// Deserialization of Untrusted Data
    pub const CWE_502: Cwe = Cwe(1 << 14);
    /// Command Injection
    pub const CWE_77: Cwe = Cwe(1 << 15);
    /// Improper Restriction of Operations within the Bounds of a Memory Buffer
    pub const CWE_119: Cwe = Cwe(1 << 16);
    /// Use of Hard-coded Credentials
    pub const CWE_798: Cwe = Cwe(1 << 17);
    /// Server-Side Request Forgery
    pub const CWE_918: Cwe = Cwe(1 << 18);
    /// Missing Authentication for Critical Function
    pub const CWE_306: Cwe = Cwe(1 << 19);
    /// Race Condition
    pub const CWE_362: Cwe = Cwe(1 << 20);
    /// Improper Privilege Management
    pub const CWE_269: Cwe = Cwe(1 << 21);
    /// Code Injection
    pub const CWE_94: Cwe = Cwe(1 << 22);
    /// Incorrect Authorization
    pub const CWE_863: Cwe = Cwe(1 << 23);
    /// Incorrect Default Permissions
    pub const CWE_276: Cwe = Cwe(1 << 24);
    /// Divide By Zero
    pub const CWE_369: Cwe = Cwe(1 << 25);

    // Memory safety groupings.
    pub const NULL_POINTER_DEREFERENCE: Cwe = Cwe::CWE_476;
    pub const OUT_OF_BOUNDS: Cwe = Cwe::CWE_787.union(Cwe::CWE_125).union(Cwe::CWE_119);
    pub const USE_AFTER_FREE: Cwe = Cwe::CWE_416;
    pub const INTEGER_OVERFLOW: Cwe = Cwe::CWE_190;
    pub const DIVISION_BY_ZERO: Cwe = Cwe::CWE_369;
    pub const RACE_CONDITION: Cwe = Cwe::CWE_362;

    // Jazzer groupings.
    pub const LDAP_INJECTION: Cwe = Cwe::CWE_20;
    pub const REMOTE_JNDI_LOOKUP: Cwe = Cwe::CWE_20;
    pub const OS_COMMAND_INJECTION: Cwe = Cwe::CWE_78.union(Cwe::CWE_20);
    pub const LOAD_ARBITRARY_LIBRARY: Cwe = Cwe::CWE_94.union(Cwe::CWE_20);
    pub const REGULAR_EXPRESSION_INJECTION: Cwe = Cwe::UNKNOWN;
    pub const SCRIPT_ENGINE_INJECTION: Cwe = Cwe::CWE_94.union(Cwe::CWE_20);
    pub const SERVER_SIDE_REQUEST_FORGERY: Cwe = Cwe::CWE_918.union(Cwe::CWE_20);
    pub const SQL_INJECTION: Cwe = Cwe::CWE_89.union(Cwe::CWE_20);
    pub const XPATH_INJECTION: Cwe = Cwe::CWE_89.union(Cwe::CWE_20);

    /// Single flags with their CWE numbers, in bit order.
    const IDS: [(Cwe, u32); 26] = [
        (Cwe::CWE_787, 787),
        (Cwe::CWE_79, 79),
        (Cwe::CWE_89, 89),
        (Cwe::CWE_416, 416),
        (Cwe::CWE_78, 78),
        (Cwe::CWE_20, 20),
        (Cwe::CWE_125, 125),
        (Cwe::CWE_22, 22),
        (Cwe::CWE_352, 352),
        (Cwe::CWE_434, 434),
        (Cwe::CWE_862, 862),
        (Cwe::CWE_476, 476),
        (Cwe::CWE_287, 287),
        (Cwe::CWE_190, 190),
        (Cwe::CWE_502, 502),
        (Cwe::CWE_77, 77),
        (Cwe::CWE_119, 119),
        (Cwe::CWE_798, 798),
        (Cwe::CWE_918, 918),
        (Cwe::CWE_306, 306),
        (Cwe::CWE_362, 362),
        (Cwe::CWE_269, 269),
        (Cwe::CWE_94, 94),
        (Cwe::CWE_863, 863),
        (Cwe::CWE_276, 276),
        (Cwe::CWE_369, 369),
    ];

    pub const fn union(self, other: Cwe) -> Cwe {
        Cwe(self.0 | other.0)
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == 0
    }

    /// True if every flag of `other` is set in `self`.
    pub const fn contains(self, other: Cwe) -> bool {
        self.0 & other.0 == other.0
    }

    /// CWE numbers present in the set, in bit order.
    pub fn ids(self) -> Vec<u32> {
        Cwe::IDS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, id)| *id)
            .collect()
    }

    /// Short English name of a well-known grouping.
    pub fn description(self) -> &'static str {
        match self {
            Cwe::NULL_POINTER_DEREFERENCE => "NULL Pointer Dereference",
            Cwe::OUT_OF_BOUNDS => "Out of bounds",
            Cwe::USE_AFTER_FREE => "Use After Free",
            Cwe::INTEGER_OVERFLOW => "Integer Overflow",
            Cwe::RACE_CONDITION => "Race Condition",
            _ => "Unknown CWE",
        }
    }
}

impl BitOr for Cwe {
    type Output = Cwe;

    fn bitor(self, rhs: Cwe) -> Cwe {
        self.union(rhs)
    }
}

impl BitOrAssign for Cwe {
    fn bitor_assign(&mut self, rhs: Cwe) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Cwe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_unknown() {
            return write!(f, "UNKNOWN");
        }
        let ids = self
            .ids()
            .iter()
            .map(|id| format!("CWE-{id}"))
            .collect::<Vec<String>>();
        write!(f, "{}", ids.join(" | "))
    }
}

impl Serialize for Cwe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ids = self.ids();
        let mut seq = serializer.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&format!("CWE-{id}"))?;
        }
        seq.end()
    }
}

/// Faulting addresses below this limit are null pointer dereferences.
pub const NULL_PAGE_LIMIT: u64 = 0x1000;

/// AddressSanitizer error kinds. `invalid-memory-access` is listed with the
/// classification used when the faulting address is unknown; see
/// [`classify_address`].
pub const ASAN_CLASSES: &[(&str, Cwe)] = &[
    ("heap-buffer-overflow", Cwe::OUT_OF_BOUNDS),
    ("stack-buffer-overflow", Cwe::OUT_OF_BOUNDS),
    ("stack-buffer-underflow", Cwe::OUT_OF_BOUNDS),
    ("global-buffer-overflow", Cwe::OUT_OF_BOUNDS),
    ("stack-overflow", Cwe::OUT_OF_BOUNDS),
    ("negative-size-param", Cwe::OUT_OF_BOUNDS),
    ("memcpy-param-overlap", Cwe::OUT_OF_BOUNDS),
    ("heap-use-after-free", Cwe::USE_AFTER_FREE),
    ("stack-use-after-return", Cwe::USE_AFTER_FREE),
    ("double-free", Cwe::USE_AFTER_FREE),
    ("invalid-free", Cwe::USE_AFTER_FREE),
    ("invalid-memory-access", Cwe::OUT_OF_BOUNDS),
    ("float-point-exception", Cwe::DIVISION_BY_ZERO),
];

/// KernelAddressSanitizer error kinds.
pub const KASAN_CLASSES: &[(&str, Cwe)] = &[
    ("out-of-bounds", Cwe::OUT_OF_BOUNDS),
    ("slab-out-of-bounds", Cwe::OUT_OF_BOUNDS),
    ("vmalloc-out-of-bounds", Cwe::OUT_OF_BOUNDS),
    ("stack-out-of-bounds", Cwe::OUT_OF_BOUNDS),
    ("global-out-of-bounds", Cwe::OUT_OF_BOUNDS),
    ("use-after-free", Cwe::USE_AFTER_FREE),
    ("slab-use-after-free", Cwe::USE_AFTER_FREE),
    ("double-free", Cwe::USE_AFTER_FREE),
    ("invalid-free", Cwe::USE_AFTER_FREE),
    ("null-ptr-deref", Cwe::NULL_POINTER_DEREFERENCE),
    ("wild-memory-access", Cwe::NULL_POINTER_DEREFERENCE),
    ("user-memory-access", Cwe::NULL_POINTER_DEREFERENCE),
];

/// Security issue reported by a Jazzer bug detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JazzerIssue {
    /// Suffix of the `FuzzerSecurityIssue<Severity>` exception class.
    pub severity: &'static str,
    /// Leading text of the issue description.
    pub title: &'static str,
    /// Error kind label.
    pub name: &'static str,
    pub cwe: Cwe,
}

pub const JAZZER_ISSUES: &[JazzerIssue] = &[
    JazzerIssue {
        severity: "Critical",
        title: "LDAP Injection",
        name: "ldap-injection",
        cwe: Cwe::LDAP_INJECTION,
    },
    JazzerIssue {
        severity: "Critical",
        title: "Remote JNDI Lookup",
        name: "remote-jndi-lookup",
        cwe: Cwe::REMOTE_JNDI_LOOKUP,
    },
    JazzerIssue {
        severity: "Critical",
        title: "OS Command Injection",
        name: "os-command-injection",
        cwe: Cwe::OS_COMMAND_INJECTION,
    },
    JazzerIssue {
        severity: "High",
        title: "load arbitrary library",
        name: "load-arbitrary-library",
        cwe: Cwe::LOAD_ARBITRARY_LIBRARY,
    },
    JazzerIssue {
        severity: "Low",
        title: "Regular Expression Injection",
        name: "regular-expression-injection",
        cwe: Cwe::REGULAR_EXPRESSION_INJECTION,
    },
    JazzerIssue {
        severity: "Critical",
        title: "Script Engine Injection",
        name: "script-engine-injection",
        cwe: Cwe::SCRIPT_ENGINE_INJECTION,
    },
    JazzerIssue {
        severity: "Medium",
        title: "Server Side Request Forgery",
        name: "server-side-request-forgery",
        cwe: Cwe::SERVER_SIDE_REQUEST_FORGERY,
    },
    JazzerIssue {
        severity: "High",
        title: "SQL Injection",
        name: "sql-injection",
        cwe: Cwe::SQL_INJECTION,
    },
    JazzerIssue {
        severity: "High",
        title: "XPath Injection",
        name: "xpath-injection",
        cwe: Cwe::XPATH_INJECTION,
    },
];

/// Find the Jazzer issue for a `FuzzerSecurityIssue<severity>: <issue>` header.
pub fn jazzer_issue(severity: &str, issue: &str) -> Option<&'static JazzerIssue> {
    JAZZER_ISSUES
        .iter()
        .find(|entry| entry.severity == severity && issue.starts_with(entry.title))
}

/// Classify an error kind label of the given sanitizer.
///
/// Labels missing from the tables classify as `UNKNOWN`.
pub fn classify(sanitizer: Sanitizer, label: &str) -> Cwe {
    let table = match sanitizer {
        Sanitizer::AddressSanitizer => ASAN_CLASSES,
        Sanitizer::KernelAddressSanitizer => KASAN_CLASSES,
        // Reports are not told apart by kind.
        Sanitizer::UndefinedBehaviorSanitizer => return Cwe::INTEGER_OVERFLOW,
        Sanitizer::JazzerSanitizer => {
            return JAZZER_ISSUES
                .iter()
                .find(|entry| entry.name == label)
                .map(|entry| entry.cwe)
                .unwrap_or_default()
        }
        Sanitizer::ThreadSanitizer | Sanitizer::KernelConcurrencySanitizer => return Cwe::UNKNOWN,
    };
    table
        .iter()
        .find(|(name, _)| *name == label)
        .map(|(_, cwe)| *cwe)
        .unwrap_or_default()
}

/// Classify an invalid memory access by its faulting address.
pub fn classify_address(address: u64) -> Cwe {
    if address < NULL_PAGE_LIMIT {
        Cwe::NULL_POINTER_DEREFERENCE
    } else {
        Cwe::OUT_OF_BOUNDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwe_flags() {
        let oob = Cwe::OUT_OF_BOUNDS;
        assert!(oob.contains(Cwe::CWE_787));
        assert!(oob.contains(Cwe::CWE_125));
        assert!(oob.contains(Cwe::CWE_119));
        assert!(!oob.contains(Cwe::CWE_416));
        assert_eq!(oob.ids(), vec![787, 125, 119]);
        assert_eq!(oob.to_string(), "CWE-787 | CWE-125 | CWE-119");
        assert_eq!(oob.description(), "Out of bounds");

        let mut cwe = Cwe::CWE_78;
        cwe |= Cwe::CWE_20;
        assert_eq!(cwe, Cwe::OS_COMMAND_INJECTION);
        assert_eq!(Cwe::CWE_89 | Cwe::CWE_20, Cwe::SQL_INJECTION);

        assert!(Cwe::UNKNOWN.is_unknown());
        assert_eq!(Cwe::UNKNOWN.to_string(), "UNKNOWN");
        assert_eq!(Cwe::UNKNOWN.description(), "Unknown CWE");
        assert_eq!(Cwe::CWE_369.ids(), vec![369]);
    }

    #[test]
    fn test_cwe_serialize() {
        let json = serde_json::to_string(&Cwe::OS_COMMAND_INJECTION).unwrap();
        assert_eq!(json, r#"["CWE-78","CWE-20"]"#);
        assert_eq!(serde_json::to_string(&Cwe::UNKNOWN).unwrap(), "[]");
    }

    #[test]
    fn test_classify() {
        let asan = Sanitizer::AddressSanitizer;
        assert_eq!(classify(asan, "heap-buffer-overflow"), Cwe::OUT_OF_BOUNDS);
        assert_eq!(classify(asan, "stack-buffer-underflow"), Cwe::OUT_OF_BOUNDS);
        assert_eq!(classify(asan, "heap-use-after-free"), Cwe::USE_AFTER_FREE);
        assert_eq!(classify(asan, "invalid-free"), Cwe::USE_AFTER_FREE);
        assert_eq!(classify(asan, "float-point-exception"), Cwe::DIVISION_BY_ZERO);
        assert_eq!(classify(asan, "container-overflow"), Cwe::UNKNOWN);

        let kasan = Sanitizer::KernelAddressSanitizer;
        assert_eq!(classify(kasan, "slab-out-of-bounds"), Cwe::OUT_OF_BOUNDS);
        assert_eq!(classify(kasan, "slab-use-after-free"), Cwe::USE_AFTER_FREE);
        assert_eq!(classify(kasan, "wild-memory-access"), Cwe::NULL_POINTER_DEREFERENCE);
        assert_eq!(classify(kasan, "heap-buffer-overflow"), Cwe::UNKNOWN);

        let ubsan = Sanitizer::UndefinedBehaviorSanitizer;
        assert_eq!(classify(ubsan, "anything"), Cwe::INTEGER_OVERFLOW);

        let jazzer = Sanitizer::JazzerSanitizer;
        assert_eq!(classify(jazzer, "xpath-injection"), Cwe::XPATH_INJECTION);
        assert_eq!(classify(jazzer, "unknown"), Cwe::UNKNOWN);

        assert_eq!(classify(Sanitizer::ThreadSanitizer, "data-race"), Cwe::UNKNOWN);
    }

    #[test]
    fn test_classify_address() {
        assert_eq!(classify_address(0), Cwe::NULL_POINTER_DEREFERENCE);
        assert_eq!(classify_address(0xfff), Cwe::NULL_POINTER_DEREFERENCE);
        assert_eq!(classify_address(0x1000), Cwe::OUT_OF_BOUNDS);
        assert_eq!(classify_address(0x602000000015), Cwe::OUT_OF_BOUNDS);
    }

    #[test]
    fn test_jazzer_issue() {
        let issue = jazzer_issue("Critical", "OS Command Injection\nmore").unwrap();
        assert_eq!(issue.name, "os-command-injection");
        assert!(jazzer_issue("High", "OS Command Injection").is_none());
        assert!(jazzer_issue("Critical", "Something else").is_none());
    }
}
