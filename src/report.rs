//! Report contains the `Report` variant over sanitizer kinds, the common
//! `SanitizerReport` interface and the dispatcher.
use log::debug;
use serde::Serialize;
use std::slice;

use crate::asan::AsanReport;
use crate::config::ParseConfig;
use crate::cwe::Cwe;
use crate::error::*;
use crate::jazzer::JazzerReport;
use crate::kasan::KasanReport;
use crate::sanitizer::Sanitizer;
use crate::stacktrace::{StackFrame, Stacktrace};
use crate::summary;
use crate::ubsan::UbsanReport;

/// Interface shared by the reports of every sanitizer.
pub trait SanitizerReport {
    /// Sanitizer that produced the report.
    fn sanitizer(&self) -> Sanitizer;

    /// Report text cut out of the run log.
    fn content(&self) -> &str;

    /// Weaknesses of the error kind.
    fn cwe(&self) -> Cwe;

    /// Error kind label.
    fn name(&self) -> &str;

    /// Error site stack, never empty.
    fn stacktrace(&self) -> &[StackFrame];

    /// Every stack section of the report: error site first, then allocation,
    /// free and frame-definition sites when present.
    fn all_stacktraces(&self) -> Vec<&[StackFrame]>;

    /// Natural-language narrative of the report.
    fn summary(&self) -> String;
}

/// Collect the error stack and the optional sections, in order.
fn sections<'a>(error: &'a Stacktrace, extra: &[Option<&'a [StackFrame]>]) -> Vec<&'a [StackFrame]> {
    let mut all = vec![error.as_slice()];
    all.extend(extra.iter().flatten());
    all
}

impl SanitizerReport for AsanReport {
    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::AddressSanitizer
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn cwe(&self) -> Cwe {
        self.cwe
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stacktrace(&self) -> &[StackFrame] {
        &self.stacktrace
    }

    fn all_stacktraces(&self) -> Vec<&[StackFrame]> {
        sections(
            &self.stacktrace,
            &[
                self.alloc_stack.as_deref(),
                self.free_stack.as_deref(),
                self.frame.as_ref().map(slice::from_ref),
            ],
        )
    }

    fn summary(&self) -> String {
        summary::asan(self)
    }
}

impl SanitizerReport for UbsanReport {
    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::UndefinedBehaviorSanitizer
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn cwe(&self) -> Cwe {
        self.cwe
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stacktrace(&self) -> &[StackFrame] {
        &self.stacktrace
    }

    fn all_stacktraces(&self) -> Vec<&[StackFrame]> {
        sections(&self.stacktrace, &[])
    }

    fn summary(&self) -> String {
        summary::ubsan(self)
    }
}

impl SanitizerReport for KasanReport {
    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::KernelAddressSanitizer
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn cwe(&self) -> Cwe {
        self.cwe
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stacktrace(&self) -> &[StackFrame] {
        &self.stacktrace
    }

    fn all_stacktraces(&self) -> Vec<&[StackFrame]> {
        sections(
            &self.stacktrace,
            &[self.alloc_stack.as_deref(), self.free_stack.as_deref()],
        )
    }

    fn summary(&self) -> String {
        summary::kasan(self)
    }
}

impl SanitizerReport for JazzerReport {
    fn sanitizer(&self) -> Sanitizer {
        Sanitizer::JazzerSanitizer
    }

    fn content(&self) -> &str {
        &self.content
    }

    fn cwe(&self) -> Cwe {
        self.cwe
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stacktrace(&self) -> &[StackFrame] {
        &self.stacktrace
    }

    fn all_stacktraces(&self) -> Vec<&[StackFrame]> {
        sections(&self.stacktrace, &[])
    }

    fn summary(&self) -> String {
        summary::jazzer(self)
    }
}

/// Parsed report of one of the supported sanitizers.
///
/// Serialized with a `Sanitizer` field naming the report kind.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "Sanitizer")]
pub enum Report {
    #[serde(rename = "AddressSanitizer")]
    Address(AsanReport),
    #[serde(rename = "UndefinedBehaviorSanitizer")]
    UndefinedBehavior(UbsanReport),
    #[serde(rename = "KernelAddressSanitizer")]
    KernelAddress(KasanReport),
    #[serde(rename = "JazzerSanitizer")]
    Jazzer(JazzerReport),
}

impl Report {
    fn inner(&self) -> &dyn SanitizerReport {
        match self {
            Report::Address(report) => report,
            Report::UndefinedBehavior(report) => report,
            Report::KernelAddress(report) => report,
            Report::Jazzer(report) => report,
        }
    }
}

impl SanitizerReport for Report {
    fn sanitizer(&self) -> Sanitizer {
        self.inner().sanitizer()
    }

    fn content(&self) -> &str {
        self.inner().content()
    }

    fn cwe(&self) -> Cwe {
        self.inner().cwe()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn stacktrace(&self) -> &[StackFrame] {
        self.inner().stacktrace()
    }

    fn all_stacktraces(&self) -> Vec<&[StackFrame]> {
        self.inner().all_stacktraces()
    }

    fn summary(&self) -> String {
        summary::render(self)
    }
}

/// Parse a run log as a report of the given sanitizer.
///
/// # Arguments
///
/// * `content` - full output of one instrumented run
///
/// * `sanitizer` - sanitizer the program was built with
///
/// * `config` - parser settings
///
/// # Return value
///
/// `Ok(None)` if the log holds no report (or the sanitizer has no report
/// grammar), an error if the report is malformed.
pub fn try_parse(
    content: &str,
    sanitizer: Sanitizer,
    config: &ParseConfig,
) -> Result<Option<Report>> {
    Ok(match sanitizer {
        Sanitizer::AddressSanitizer => AsanReport::parse(content, config)?.map(Report::Address),
        Sanitizer::UndefinedBehaviorSanitizer => {
            UbsanReport::parse(content, config)?.map(Report::UndefinedBehavior)
        }
        Sanitizer::KernelAddressSanitizer => KasanReport::parse(content)?.map(Report::KernelAddress),
        Sanitizer::JazzerSanitizer => JazzerReport::parse(content)?.map(Report::Jazzer),
        Sanitizer::ThreadSanitizer | Sanitizer::KernelConcurrencySanitizer => None,
    })
}

/// Parse a run log with the given settings. Malformed reports give `None`.
pub fn parse_with_config(
    content: &str,
    sanitizer: Sanitizer,
    config: &ParseConfig,
) -> Option<Report> {
    match try_parse(content, sanitizer, config) {
        Ok(report) => report,
        Err(err) => {
            debug!("Skipping malformed {sanitizer} report: {err}");
            None
        }
    }
}

/// Parse a run log with default settings. Malformed reports give `None`.
pub fn parse(content: &str, sanitizer: Sanitizer) -> Option<Report> {
    parse_with_config(content, sanitizer, &ParseConfig::default())
}
