//! Jazzer module implements `FrameGrammar` and the report parser for Jazzer
//! security issue findings.
use regex::Regex;
use serde::Serialize;

use crate::cwe::{self, Cwe};
use crate::error::*;
use crate::normalize::{normalize, Normalized};
use crate::sanitizer::Sanitizer;
use crate::stacktrace::*;

lazy_static::lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^== Java Exception: (.*)$").unwrap();
    static ref ISSUE: Regex = Regex::new(
        r"^com\.code_intelligence\.jazzer\.api\.FuzzerSecurityIssue(?P<severity>\w+): (?P<issue>.*)$"
    ).unwrap();
    static ref FRAME: Regex =
        Regex::new(r"^at (?P<call>[^\s(]+)\((?P<source>[^)]*)\)$").unwrap();
}

/// Error kind of exceptions that are not known security issues.
pub const UNKNOWN_ISSUE: &str = "unknown";

/// Frame grammar of Java stack traces: `at [module/]pkg.Class.method(File.java:LINE)`.
///
/// Frames without a line number (`Native Method`, `Unknown Source`) are
/// dropped. The location is the source path derived from the package.
pub struct JazzerStacktrace;

impl FrameGrammar for JazzerStacktrace {
    fn frame_line(&self, line: &str) -> Result<Option<FrameLine>> {
        let line = line.trim();
        if !line.starts_with("at ") {
            return Ok(None);
        }
        let Some(caps) = FRAME.captures(line) else {
            return Err(Error::Parse(format!(
                "Couldn't parse stack trace entry: {line}"
            )));
        };
        // Drop module: java.base/java.lang.Thread.run
        let call = caps["call"]
            .rsplit_once('/')
            .map_or(&caps["call"], |(_, call)| call);

        let frame = caps["source"].rsplit_once(':').and_then(|(file, num)| {
            let line = num.parse::<u64>().ok()?;
            let parts: Vec<&str> = call.split('.').collect();
            let package = parts[..parts.len().saturating_sub(2)].join("/");
            let file = if package.is_empty() {
                file.to_string()
            } else {
                format!("{package}/{file}")
            };
            Some(StackFrame::new(
                call,
                SourceLocation {
                    file,
                    line: Some(line),
                    column: None,
                },
            ))
        });
        Ok(Some(FrameLine { index: None, frame }))
    }

    fn is_frame_start(&self, line: &str) -> bool {
        line.trim_start().starts_with("at ")
    }

    // Reports are cut at their end boundary before the stack is read.
    fn end_of_input_ends_stack(&self) -> bool {
        true
    }
}

/// Parsed Jazzer finding.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct JazzerReport {
    #[serde(rename(serialize = "Content"))]
    pub content: String,
    /// Issue slug, e.g. `os-command-injection`.
    #[serde(rename(serialize = "Name"))]
    pub name: String,
    #[serde(rename(serialize = "Cwe"))]
    pub cwe: Cwe,
    /// Exception class and message from the header line.
    #[serde(rename(serialize = "Exception"))]
    pub exception: String,
    /// Issue description of a `FuzzerSecurityIssue` exception.
    #[serde(rename(serialize = "Issue"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(rename(serialize = "Stacktrace"))]
    pub stacktrace: Stacktrace,
}

impl JazzerReport {
    /// Parse the first `== Java Exception:` block in fuzzer output.
    ///
    /// # Return value
    ///
    /// `Ok(None)` if there is no report, an error if the report is malformed.
    pub fn parse(content: &str) -> Result<Option<JazzerReport>> {
        let Some(Normalized {
            content,
            lines,
            terminated,
        }) = normalize(content, Sanitizer::JazzerSanitizer)
        else {
            return Ok(None);
        };
        let mut lines = Lines::new(&lines);
        let Some(header) = lines.next() else {
            return Ok(None);
        };
        let Some(caps) = HEADER.captures(header) else {
            return Err(Error::Parse(format!("Couldn't parse exception: {header}")));
        };
        let exception = caps[1].to_string();

        let (issue, name) = match ISSUE.captures(&exception) {
            Some(caps) => (
                Some(caps["issue"].to_string()),
                cwe::jazzer_issue(&caps["severity"], &caps["issue"]).map(|entry| entry.name),
            ),
            None => (None, None),
        };
        let name = name.unwrap_or(UNKNOWN_ISSUE).to_string();

        // Issue description lines.
        while let Some(line) = lines.peek() {
            if line.trim().is_empty() || JazzerStacktrace.is_frame_start(line) {
                break;
            }
            lines.next();
        }
        let stacktrace = lines.stack(&JazzerStacktrace)?;
        if stacktrace.is_empty() {
            return Err(Error::Parse(format!(
                "Couldn't find stack trace of {exception}"
            )));
        }
        if !terminated {
            return Err(Error::Truncated(format!(
                "Stack trace of {exception} runs to the end of input"
            )));
        }

        Ok(Some(JazzerReport {
            content,
            cwe: cwe::classify(Sanitizer::JazzerSanitizer, &name),
            name,
            exception,
            issue,
            stacktrace,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMAND_INJECTION: &str = "INFO: Loaded 1 hooks from com.code_intelligence.jazzer.sanitizers.OsCommandInjection
#4096	pulse  cov: 160 ft: 286 corp: 27/670b exec/s: 2048 rss: 512Mb

== Java Exception: com.code_intelligence.jazzer.api.FuzzerSecurityIssueCritical: OS Command Injection
Executing OS commands with attacker-controlled data can lead to remote code execution.
\tat com.code_intelligence.jazzer.sanitizers.OsCommandInjection.processImplStartHook(OsCommandInjection.kt:48)
\tat java.base/java.lang.ProcessImpl.start(ProcessImpl.java:98)
\tat com.example.Shell.run(Shell.java:21)
DEDUP_TOKEN: 4a4b0ea93b0b1d3e
== libFuzzer crashing input ==
";

    #[test]
    fn test_jazzer_stacktrace() {
        let frame = JazzerStacktrace
            .frame_line("\tat java.base/java.lang.Thread.run(Thread.java:833)")
            .unwrap()
            .unwrap()
            .frame
            .unwrap();
        assert_eq!(frame.function, "java.lang.Thread.run");
        assert_eq!(frame.location.to_string(), "java/lang/Thread.java:833");

        let frame = JazzerStacktrace
            .frame_line("at hudson.cli.CliProtocol$Handler.run(CliProtocol.java:64)")
            .unwrap()
            .unwrap()
            .frame
            .unwrap();
        assert_eq!(frame.location.to_string(), "hudson/cli/CliProtocol.java:64");

        let native = JazzerStacktrace
            .frame_line("at java.base/jdk.internal.reflect.NativeMethodAccessorImpl.invoke0(Native Method)")
            .unwrap()
            .unwrap();
        assert!(native.frame.is_none());

        assert!(JazzerStacktrace.frame_line("at broken frame").is_err());
        assert!(JazzerStacktrace
            .frame_line("DEDUP_TOKEN: 4a4b0ea93b0b1d3e")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_os_command_injection() {
        let report = JazzerReport::parse(COMMAND_INJECTION).unwrap().unwrap();
        assert_eq!(report.name, "os-command-injection");
        assert_eq!(report.cwe, Cwe::OS_COMMAND_INJECTION);
        assert_eq!(report.issue.as_deref(), Some("OS Command Injection"));
        assert_eq!(report.stacktrace.len(), 3);
        assert_eq!(report.stacktrace[2].function, "com.example.Shell.run");
        assert_eq!(
            report.stacktrace[2].location.to_string(),
            "com/example/Shell.java:21"
        );
        assert!(!report.content.contains("DEDUP_TOKEN"));
    }

    #[test]
    fn test_unknown_exception() {
        let text = "== Java Exception: java.lang.NullPointerException: Cannot invoke \"String.length()\"
\tat com.example.Parser.parse(Parser.java:12)
\tat com.example.ParserFuzzer.fuzzerTestOneInput(ParserFuzzer.java:9)
DEDUP_TOKEN: 9f1c";
        let report = JazzerReport::parse(text).unwrap().unwrap();
        assert_eq!(report.name, UNKNOWN_ISSUE);
        assert!(report.cwe.is_unknown());
        assert!(report.issue.is_none());
        assert_eq!(report.stacktrace.len(), 2);

        let text = COMMAND_INJECTION.replace(
            "FuzzerSecurityIssueCritical: OS Command Injection",
            "FuzzerSecurityIssueHigh: Remote Code Execution",
        );
        let report = JazzerReport::parse(&text).unwrap().unwrap();
        assert_eq!(report.name, UNKNOWN_ISSUE);
        assert_eq!(report.issue.as_deref(), Some("Remote Code Execution"));
    }

    #[test]
    fn test_malformed() {
        let text = COMMAND_INJECTION.replace("(Shell.java:21)", " Shell.java:21");
        assert!(JazzerReport::parse(&text).is_err());

        let text = "== Java Exception: java.lang.IllegalStateException\n\nno frames";
        assert!(JazzerReport::parse(text).is_err());

        // Stack cut after the second frame.
        let text = COMMAND_INJECTION
            .lines()
            .take(7)
            .collect::<Vec<_>>()
            .join("\n");
        assert!(matches!(JazzerReport::parse(&text), Err(Error::Truncated(_))));
        let closed = format!("{text}\n\n");
        assert_eq!(JazzerReport::parse(&closed).unwrap().unwrap().stacktrace.len(), 2);

        assert_eq!(JazzerReport::parse("INFO: Seed: 42"), Ok(None));
    }

    #[test]
    fn test_security_issues() {
        let issues = [
            ("Critical", "LDAP Injection", "ldap-injection", Cwe::CWE_20),
            ("Critical", "Remote JNDI Lookup", "remote-jndi-lookup", Cwe::CWE_20),
            (
                "High",
                "load arbitrary library",
                "load-arbitrary-library",
                Cwe::CWE_94 | Cwe::CWE_20,
            ),
            (
                "Low",
                "Regular Expression Injection",
                "regular-expression-injection",
                Cwe::UNKNOWN,
            ),
            (
                "Critical",
                "Script Engine Injection",
                "script-engine-injection",
                Cwe::CWE_94 | Cwe::CWE_20,
            ),
            (
                "Medium",
                "Server Side Request Forgery",
                "server-side-request-forgery",
                Cwe::CWE_918 | Cwe::CWE_20,
            ),
            ("High", "SQL Injection", "sql-injection", Cwe::CWE_89 | Cwe::CWE_20),
            ("High", "XPath Injection", "xpath-injection", Cwe::CWE_89 | Cwe::CWE_20),
        ];
        for (severity, title, name, cwe) in issues {
            let text = format!(
                "== Java Exception: com.code_intelligence.jazzer.api.FuzzerSecurityIssue{severity}: {title}
Untrusted input reached a sensitive call.
\tat com.example.Target.handle(Target.java:31)
\tat com.example.TargetFuzzer.fuzzerTestOneInput(TargetFuzzer.java:12)
DEDUP_TOKEN: 0123456789abcdef
== libFuzzer crashing input =="
            );
            let report = JazzerReport::parse(&text).unwrap().unwrap();
            assert_eq!(report.name, name);
            assert_eq!(report.cwe, cwe, "{name}");
            assert_eq!(report.issue.as_deref(), Some(title));
            assert_eq!(report.stacktrace.len(), 2);
            assert_eq!(report.stacktrace[0].location.to_string(), "com/example/Target.java:31");
        }

        // Severity is part of the header.
        let text = COMMAND_INJECTION.replace("IssueCritical: OS", "IssueLow: OS");
        assert_eq!(JazzerReport::parse(&text).unwrap().unwrap().name, UNKNOWN_ISSUE);
    }
}
