//! Asan module implements `FrameGrammar` and the report parser for
//! AddressSanitizer reports.
use regex::Regex;
use serde::Serialize;

use crate::config::ParseConfig;
use crate::cwe::{self, Cwe, NULL_PAGE_LIMIT};
use crate::error::*;
use crate::normalize::{normalize, Normalized};
use crate::sanitizer::Sanitizer;
use crate::stacktrace::*;

lazy_static::lazy_static! {
    static ref DOUBLE_FREE: Regex =
        Regex::new(r"==\d+==ERROR: AddressSanitizer: attempting double-free on (.+)").unwrap();
    static ref INVALID_FREE: Regex = Regex::new(
        r"==\d+==ERROR: AddressSanitizer: attempting free on address which was not malloc\(\)-ed: (0x[\da-fA-F]+) in thread (T\d+)"
    ).unwrap();
    static ref SEGV: Regex = Regex::new(
        r"==\d+==ERROR: AddressSanitizer: SEGV on unknown address(?: (0x[\da-fA-F]+))?"
    ).unwrap();
    static ref FPE: Regex =
        Regex::new(r"==\d+==ERROR: AddressSanitizer: FPE on unknown address").unwrap();
    static ref COMMON: Regex =
        Regex::new(r"==\d+==ERROR: AddressSanitizer: ([\-_a-zA-Z]+)").unwrap();
    static ref ACCESS: Regex =
        Regex::new(r"^(WRITE|READ) of size (\d+) at (0x[\da-fA-F]+) thread (.+)").unwrap();
    static ref SEGV_ACCESS: Regex =
        Regex::new(r"==\d+==The signal is caused by a (READ|WRITE) memory access\.").unwrap();
    static ref REGION: Regex = Regex::new(
        r"^(0x[\da-fA-F]+) is located (\d+) bytes (to the right of|to the left of|inside of|before|after) (\d+)-byte region \[(0x[\da-fA-F]+),(0x[\da-fA-F]+)\)"
    ).unwrap();
    static ref STACK_OBJECT: Regex = Regex::new(
        r"Address (0x[\da-fA-F]+) is located in stack of thread (T\d+).* at offset (\d+) in frame"
    ).unwrap();
    static ref ALLOCATED: Regex = Regex::new(r"^.*allocated by thread (.+) here:").unwrap();
    static ref FREED: Regex = Regex::new(r"^.*freed by thread (.+) here:").unwrap();
    static ref FRAME_INDEX: Regex = Regex::new(r"^#(\d+)(?:\s|$)").unwrap();
    static ref FRAME: Regex =
        Regex::new(r"^#\d+\s+0x[0-9a-fA-F]+\s+in\s+(.+?)\s+(/\S.*)$").unwrap();
}

/// Frame grammar of sanitizer stacks: `#N 0xADDR in FUNC PATH:LINE[:COL]`.
///
/// Frames are kept only when `PATH` lies under the source root. Other frames
/// (runtime interceptors, system libraries, module offsets) are still counted.
pub struct AsanStacktrace<'a> {
    source_root: &'a str,
}

impl<'a> AsanStacktrace<'a> {
    pub fn new(source_root: &'a str) -> Self {
        AsanStacktrace { source_root }
    }
}

impl FrameGrammar for AsanStacktrace<'_> {
    fn frame_line(&self, line: &str) -> Result<Option<FrameLine>> {
        let line = line.trim();
        if !line.starts_with('#') {
            return Ok(None);
        }
        let Some(caps) = FRAME_INDEX.captures(line) else {
            return Err(Error::Parse(format!(
                "Couldn't parse frame index in stack trace entry: {line}"
            )));
        };
        let index = caps[1]
            .parse::<usize>()
            .map_err(|_| Error::Parse(format!("Couldn't parse frame index: {}", &caps[1])))?;

        let frame = FRAME.captures(line).and_then(|caps| {
            let location = SourceLocation::parse(&caps[2])?;
            let file = strip_source_root(&location.file, self.source_root)?;
            Some(StackFrame::new(&caps[1], SourceLocation { file, ..location }))
        });
        Ok(Some(FrameLine {
            index: Some(index),
            frame,
        }))
    }
}

/// Parsed AddressSanitizer report.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AsanReport {
    /// Report text.
    #[serde(rename(serialize = "Content"))]
    pub content: String,
    /// Error kind, e.g. `heap-buffer-overflow`.
    #[serde(rename(serialize = "Name"))]
    pub name: String,
    #[serde(rename(serialize = "Cwe"))]
    pub cwe: Cwe,
    /// Error site stack.
    #[serde(rename(serialize = "Stacktrace"))]
    pub stacktrace: Stacktrace,
    #[serde(rename(serialize = "AllocStack"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alloc_stack: Option<Stacktrace>,
    #[serde(rename(serialize = "FreeStack"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_stack: Option<Stacktrace>,
    /// Function whose stack frame holds the accessed object.
    #[serde(rename(serialize = "Frame"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<StackFrame>,
    /// Faulting address of an invalid memory access.
    #[serde(rename(serialize = "Address"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Size of the accessed heap object.
    #[serde(rename(serialize = "Size"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Access size.
    #[serde(rename(serialize = "Length"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Access address relative to the object start.
    #[serde(rename(serialize = "Offset"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

/// Header classification: error kind, weakness and faulting address.
fn parse_header(header: &str) -> (String, Cwe, Option<String>) {
    let classified = |name: &str| {
        (
            name.to_string(),
            cwe::classify(Sanitizer::AddressSanitizer, name),
            None,
        )
    };
    if DOUBLE_FREE.is_match(header) {
        return classified("double-free");
    }
    if INVALID_FREE.is_match(header) {
        return classified("invalid-free");
    }
    if let Some(caps) = SEGV.captures(header) {
        let address = caps.get(1).map(|m| m.as_str().to_string());
        let value = address
            .as_deref()
            .and_then(parse_hex)
            .unwrap_or(NULL_PAGE_LIMIT);
        return (
            "invalid-memory-access".to_string(),
            cwe::classify_address(value),
            address,
        );
    }
    if FPE.is_match(header) {
        return classified("float-point-exception");
    }
    match COMMON.captures(header) {
        Some(caps) => classified(&caps[1]),
        None => ("unknown".to_string(), Cwe::UNKNOWN, None),
    }
}

fn parse_hex(num: &str) -> Option<u64> {
    u64::from_str_radix(num.trim_start_matches("0x"), 16).ok()
}

fn parse_number(num: &str) -> Result<u64> {
    num.parse::<u64>()
        .map_err(|_| Error::Parse(format!("Couldn't parse number: {num}")))
}

fn parse_address(num: &str) -> Result<u64> {
    parse_hex(num).ok_or_else(|| Error::Parse(format!("Couldn't parse address: {num}")))
}

impl AsanReport {
    /// Parse the first AddressSanitizer report in `content`.
    ///
    /// # Return value
    ///
    /// `Ok(None)` if there is no report, an error if the report is malformed.
    pub fn parse(content: &str, config: &ParseConfig) -> Result<Option<AsanReport>> {
        let Some(Normalized { content, lines, .. }) = normalize(content, Sanitizer::AddressSanitizer)
        else {
            return Ok(None);
        };
        let grammar = AsanStacktrace::new(&config.source_root);
        let mut lines = Lines::new(&lines);
        let Some(header) = lines.next() else {
            return Ok(None);
        };

        let (name, cwe, address) = parse_header(header);
        let mut report = AsanReport {
            content,
            name,
            cwe,
            address,
            ..Default::default()
        };

        let name = report.name.clone();
        match name.as_str() {
            "heap-buffer-overflow" => report.heap_spatial(&mut lines, &grammar, true)?,
            "memcpy-param-overlap" => report.heap_spatial(&mut lines, &grammar, false)?,
            "negative-size-param" => report.stacktrace = lines.stack(&grammar)?,
            "heap-use-after-free" => report.heap_temporal(&mut lines, &grammar, true)?,
            "double-free" => report.heap_temporal(&mut lines, &grammar, false)?,
            "invalid-free" => report.invalid_free(&mut lines, &grammar)?,
            "stack-buffer-overflow" | "stack-buffer-underflow" | "stack-use-after-return" => {
                report.stack_spatial(&mut lines, &grammar)?
            }
            "global-buffer-overflow" => {
                lines.expect(&ACCESS, "access")?;
                report.stacktrace = lines.stack(&grammar)?;
            }
            "invalid-memory-access" => {
                lines.expect(&SEGV_ACCESS, "signal")?;
                report.stacktrace = lines.stack(&grammar)?;
            }
            _ => {
                lines.seek_frame(&grammar)?;
                report.stacktrace = lines.stack(&grammar)?;
            }
        }

        if report.stacktrace.is_empty() {
            return Err(Error::Parse(format!(
                "No frames under {} in {} stack trace",
                config.source_root, report.name
            )));
        }
        Ok(Some(report))
    }

    /// Access line (optional), error stack, and the allocation site when the
    /// heap region is described.
    fn heap_spatial(
        &mut self,
        lines: &mut Lines,
        grammar: &AsanStacktrace,
        access: bool,
    ) -> Result<()> {
        let access = if access {
            Some(lines.expect(&ACCESS, "access")?)
        } else {
            None
        };
        self.stacktrace = lines.stack(grammar)?;

        let Some(region) = lines.next_if_match(&REGION) else {
            return Ok(());
        };
        if lines.next_if_match(&FREED).is_some() {
            self.free_stack = Some(lines.stack(grammar)?);
        }
        lines.expect(&ALLOCATED, "allocation")?;
        self.alloc_stack = Some(lines.stack(grammar)?);

        if let Some(access) = access {
            let size = parse_number(&region[4])?;
            let length = parse_number(&access[2])?;
            let offset = i128::from(parse_address(&access[3])?)
                - i128::from(parse_address(&region[5])?);
            if !(offset < 0 || offset + i128::from(length) >= i128::from(size)) {
                return Err(Error::Invariant(format!(
                    "access of {length} bytes at offset {offset} is inside of {size}-byte region"
                )));
            }
            let offset = i64::try_from(offset)
                .map_err(|_| Error::Invariant(format!("offset {offset} is out of range")))?;
            self.size = Some(size);
            self.length = Some(length);
            self.offset = Some(offset);
        }
        Ok(())
    }

    /// Error stack, then mandatory free and allocation sites.
    fn heap_temporal(
        &mut self,
        lines: &mut Lines,
        grammar: &AsanStacktrace,
        access: bool,
    ) -> Result<()> {
        if access {
            lines.expect(&ACCESS, "access")?;
        }
        self.stacktrace = lines.stack(grammar)?;
        lines.expect(&REGION, "region")?;
        lines.expect(&FREED, "free")?;
        self.free_stack = Some(lines.stack(grammar)?);
        lines.expect(&ALLOCATED, "allocation")?;
        self.alloc_stack = Some(lines.stack(grammar)?);
        Ok(())
    }

    fn invalid_free(&mut self, lines: &mut Lines, grammar: &AsanStacktrace) -> Result<()> {
        self.stacktrace = lines.stack(grammar)?;
        lines.expect(&REGION, "region")?;
        lines.next_if_match(&ALLOCATED);
        self.alloc_stack = Some(lines.stack(grammar)?);
        Ok(())
    }

    fn stack_spatial(&mut self, lines: &mut Lines, grammar: &AsanStacktrace) -> Result<()> {
        lines.expect(&ACCESS, "access")?;
        self.stacktrace = lines.stack(grammar)?;
        lines.expect(&STACK_OBJECT, "stack object")?;
        let Some(frame) = lines.stack(grammar)?.into_iter().next() else {
            return Err(Error::Parse(
                "Couldn't find the frame of the stack object".to_string(),
            ));
        };
        self.frame = Some(frame);
        Ok(())
    }
}
