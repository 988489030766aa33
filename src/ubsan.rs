//! UndefinedBehaviorSanitizer module parses runtime error reports. Stack frames
//! share the AddressSanitizer grammar.
use regex::Regex;
use serde::Serialize;

use crate::asan::AsanStacktrace;
use crate::config::ParseConfig;
use crate::cwe::{self, Cwe};
use crate::error::*;
use crate::normalize::{normalize, Normalized};
use crate::sanitizer::Sanitizer;
use crate::stacktrace::*;

lazy_static::lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^(.+?): runtime error: (.+)$").unwrap();
    static ref SUMMARY: Regex = Regex::new(r"SUMMARY: UndefinedBehaviorSanitizer: (\S+)").unwrap();
}

/// Label used when the report has no summary line.
pub const DEFAULT_LABEL: &str = "undefined-behavior";

/// Function name of the frame built from the error location when the report
/// has no stack trace.
pub const UNKNOWN_FUNCTION: &str = "<unknown>";

/// Parsed UndefinedBehaviorSanitizer runtime error.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UbsanReport {
    #[serde(rename(serialize = "Content"))]
    pub content: String,
    /// Short label from the summary line.
    #[serde(rename(serialize = "Name"))]
    pub name: String,
    #[serde(rename(serialize = "Cwe"))]
    pub cwe: Cwe,
    /// Runtime error message.
    #[serde(rename(serialize = "Description"))]
    pub description: String,
    /// Error site printed in the header.
    #[serde(rename(serialize = "Location"))]
    pub location: SourceLocation,
    #[serde(rename(serialize = "Stacktrace"))]
    pub stacktrace: Stacktrace,
}

impl UbsanReport {
    /// Parse the first runtime error in `content`.
    ///
    /// # Return value
    ///
    /// `Ok(None)` if there is no report, an error if the report is malformed.
    pub fn parse(content: &str, config: &ParseConfig) -> Result<Option<UbsanReport>> {
        let Some(Normalized { content, lines, .. }) =
            normalize(content, Sanitizer::UndefinedBehaviorSanitizer)
        else {
            return Ok(None);
        };
        let name = lines
            .iter()
            .find_map(|line| SUMMARY.captures(line))
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());

        let mut cursor = Lines::new(&lines);
        let Some(header) = cursor.next() else {
            return Ok(None);
        };
        let Some(caps) = HEADER.captures(header) else {
            return Err(Error::Parse(format!(
                "Couldn't parse error description: {header}"
            )));
        };
        let description = caps[2].to_string();
        let Some(location) = SourceLocation::parse(&caps[1]) else {
            return Err(Error::Parse(format!(
                "Couldn't parse error location: {}",
                &caps[1]
            )));
        };
        let error_site = strip_source_root(&location.file, &config.source_root);
        let location = match error_site {
            Some(ref file) => SourceLocation {
                file: file.clone(),
                ..location
            },
            None => location,
        };

        // Notes between the header and the first frame are skipped.
        let grammar = AsanStacktrace::new(&config.source_root);
        let mut stacktrace = if cursor.seek_frame(&grammar).is_ok() {
            cursor.stack(&grammar)?
        } else {
            Stacktrace::new()
        };

        if stacktrace.is_empty() {
            if error_site.is_none() {
                return Err(Error::Parse(format!(
                    "No frames under {} in runtime error report",
                    config.source_root
                )));
            }
            stacktrace.push(StackFrame::new(UNKNOWN_FUNCTION, location.clone()));
        }

        Ok(Some(UbsanReport {
            content,
            cwe: cwe::classify(Sanitizer::UndefinedBehaviorSanitizer, &name),
            name,
            description,
            location,
            stacktrace,
        }))
    }
}
