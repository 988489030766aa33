//! Kasan module implements `FrameGrammar` and the report parser for
//! KernelAddressSanitizer reports.
use regex::Regex;
use serde::Serialize;

use crate::cwe::{self, Cwe};
use crate::error::*;
use crate::normalize::{normalize, Normalized};
use crate::sanitizer::Sanitizer;
use crate::stacktrace::*;

lazy_static::lazy_static! {
    static ref HEADER: Regex = Regex::new(r"(?:BUG: )?KASAN: ([\-_a-zA-Z]+)").unwrap();
    static ref ACCESS: Regex =
        Regex::new(r"^(Write|Read) of size (\d+) at addr ([\w\d]+) by task (.+)").unwrap();
    static ref FRAME: Regex = Regex::new(
        r"^(\??\s*[\w.]+)(?:\+0x[\da-fA-F]+/0x[\da-fA-F]+)?\s+([^:\s]+:\d+(?::\d+)?)(?: \[inline\])?\s*$"
    ).unwrap();
    static ref ALLOCATED: Regex = Regex::new(r"^Allocated by task (.+)").unwrap();
    static ref FREED: Regex = Regex::new(r"^Freed by task (.+)").unwrap();
}

/// Frame grammar of kernel call traces: `FUNC[+0xOFF/0xSIZE] PATH:LINE[:COL] [inline]`.
pub struct KasanStacktrace;

impl FrameGrammar for KasanStacktrace {
    fn frame_line(&self, line: &str) -> Result<Option<FrameLine>> {
        let Some(caps) = FRAME.captures(line.trim()) else {
            return Ok(None);
        };
        let function = caps[1].trim_start_matches('?').trim_start();
        let Some(location) = SourceLocation::parse(&caps[2]) else {
            return Ok(None);
        };
        Ok(Some(FrameLine {
            index: None,
            frame: Some(StackFrame::new(function, location)),
        }))
    }
}

/// Section layout of a kernel report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    /// Access line, error stack, allocation and free sites.
    Heap,
    /// Error stack, allocation and free sites.
    Free,
    /// Optional access line, error stack.
    Pointer,
    /// Error stack.
    Other,
}

impl Shape {
    fn of(name: &str) -> Shape {
        match name {
            "out-of-bounds"
            | "slab-out-of-bounds"
            | "vmalloc-out-of-bounds"
            | "global-out-of-bounds"
            | "use-after-free"
            | "slab-use-after-free" => Shape::Heap,
            "double-free" | "invalid-free" => Shape::Free,
            "null-ptr-deref" | "wild-memory-access" | "user-memory-access"
            | "stack-out-of-bounds" => Shape::Pointer,
            _ => Shape::Other,
        }
    }
}

/// Parsed KernelAddressSanitizer report.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct KasanReport {
    #[serde(rename(serialize = "Content"))]
    pub content: String,
    /// Bug type, e.g. `slab-out-of-bounds`.
    #[serde(rename(serialize = "Name"))]
    pub name: String,
    #[serde(rename(serialize = "Cwe"))]
    pub cwe: Cwe,
    #[serde(rename(serialize = "Stacktrace"))]
    pub stacktrace: Stacktrace,
    #[serde(rename(serialize = "AllocStack"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alloc_stack: Option<Stacktrace>,
    #[serde(rename(serialize = "FreeStack"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_stack: Option<Stacktrace>,
    /// Accessed address.
    #[serde(rename(serialize = "Address"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Access size.
    #[serde(rename(serialize = "Length"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

impl KasanReport {
    /// Parse the first KASAN report in a kernel log.
    ///
    /// # Return value
    ///
    /// `Ok(None)` if there is no report, an error if the report is malformed.
    pub fn parse(content: &str) -> Result<Option<KasanReport>> {
        let Some(Normalized { content, lines, .. }) =
            normalize(content, Sanitizer::KernelAddressSanitizer)
        else {
            return Ok(None);
        };
        let mut lines = Lines::new(&lines);
        let Some(header) = lines.next() else {
            return Ok(None);
        };
        let Some(caps) = HEADER.captures(header) else {
            return Err(Error::Parse(format!("Couldn't parse KASAN header: {header}")));
        };
        let name = caps[1].to_string();
        let mut report = KasanReport {
            content,
            cwe: cwe::classify(Sanitizer::KernelAddressSanitizer, &name),
            name,
            ..Default::default()
        };

        let shape = Shape::of(&report.name);
        if shape == Shape::Heap {
            let Some(access) = lines.seek(&ACCESS) else {
                return Err(Error::Parse(format!(
                    "Couldn't find access line in {} report",
                    report.name
                )));
            };
            report.record_access(&access)?;
        }
        // The access line of the other shapes is optional and precedes the stack.
        while let Some(line) = lines.peek() {
            if KasanStacktrace.is_frame_start(line) {
                break;
            }
            if let Some(access) = ACCESS.captures(line) {
                report.record_access(&access)?;
            }
            lines.next();
        }
        lines.seek_frame(&KasanStacktrace)?;
        report.stacktrace = lines.stack(&KasanStacktrace)?;

        if matches!(shape, Shape::Heap | Shape::Free) {
            while let Some(line) = lines.next() {
                if ALLOCATED.is_match(line) {
                    report.alloc_stack = Some(lines.stack(&KasanStacktrace)?);
                } else if FREED.is_match(line) {
                    report.free_stack = Some(lines.stack(&KasanStacktrace)?);
                    break;
                }
            }
        }

        if report.stacktrace.is_empty() {
            return Err(Error::Parse(format!(
                "Empty stack trace in {} report",
                report.name
            )));
        }
        Ok(Some(report))
    }

    fn record_access(&mut self, access: &regex::Captures) -> Result<()> {
        let length = access[2]
            .parse::<u64>()
            .map_err(|_| Error::Parse(format!("Couldn't parse access size: {}", &access[2])))?;
        self.length = Some(length);
        self.address = Some(access[3].to_string());
        Ok(())
    }
}
