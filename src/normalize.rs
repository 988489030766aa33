//! Cuts one report out of a raw run log and drops noise lines.
use regex::Regex;

use crate::constants::KASAN_NOISE_KEYWORDS;
use crate::sanitizer::Sanitizer;

lazy_static::lazy_static! {
    static ref ASAN_ANCHOR: Regex = Regex::new(r"==\d+==ERROR: AddressSanitizer: ").unwrap();
    static ref ASAN_END: Regex = Regex::new(r"SUMMARY: AddressSanitizer[^\n]*").unwrap();
    static ref ASAN_HINT: Regex = Regex::new(r"==\d+==Hint: ").unwrap();
    static ref UBSAN_ANCHOR: Regex = Regex::new(r"(?m)^.+: runtime error: ").unwrap();
    static ref UBSAN_END: Regex =
        Regex::new(r"SUMMARY: UndefinedBehaviorSanitizer: [^\n]*").unwrap();
    static ref KASAN_ANCHOR: Regex = Regex::new(r"(BUG: )?KASAN: [\-_a-zA-Z]+").unwrap();
    static ref KASAN_TIMESTAMP: Regex = Regex::new(r"^\[\s*.*?\](\[\s*.*?\])?\s*").unwrap();
    static ref JAZZER_ANCHOR: Regex = Regex::new(r"== Java Exception: ").unwrap();
    static ref JAZZER_END: Regex =
        Regex::new(r"(?m)^(DEDUP_TOKEN: |== libFuzzer crashing input ==)").unwrap();
}

/// One report cut out of a run log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Normalized {
    /// Report text from the start anchor to the end boundary.
    pub content: String,
    /// Trimmed report lines with noise removed, in original order. The first
    /// line is the header.
    pub lines: Vec<String>,
    /// The end boundary was found. Otherwise the report runs to the end of
    /// the input and may be cut short.
    pub terminated: bool,
}

/// Extract the first report of the given sanitizer from `raw`.
///
/// # Return value
///
/// `None` when `raw` has no start anchor for `sanitizer`, or when the sanitizer
/// has no report grammar.
pub fn normalize(raw: &str, sanitizer: Sanitizer) -> Option<Normalized> {
    match sanitizer {
        Sanitizer::AddressSanitizer => normalize_asan(raw),
        Sanitizer::UndefinedBehaviorSanitizer => normalize_ubsan(raw),
        Sanitizer::KernelAddressSanitizer => normalize_kasan(raw),
        Sanitizer::JazzerSanitizer => normalize_jazzer(raw),
        Sanitizer::ThreadSanitizer | Sanitizer::KernelConcurrencySanitizer => None,
    }
}

/// Slice from `anchor` up to the end of the first `end` match after it, and
/// whether `end` was found.
fn cut<'a>(raw: &'a str, anchor: &Regex, end: &Regex) -> Option<(&'a str, bool)> {
    let start = anchor.find(raw)?.start();
    let rest = &raw[start..];
    Some(match end.find(rest) {
        Some(m) => (&rest[..m.end()], true),
        None => (rest, false),
    })
}

fn normalize_asan(raw: &str) -> Option<Normalized> {
    let (content, terminated) = cut(raw, &ASAN_ANCHOR, &ASAN_END)?;
    let lines = content
        .lines()
        .filter(|line| !ASAN_HINT.is_match(line))
        .map(|line| line.trim().to_string())
        .collect();
    Some(Normalized {
        content: content.to_string(),
        lines,
        terminated,
    })
}

fn normalize_ubsan(raw: &str) -> Option<Normalized> {
    let (content, terminated) = cut(raw, &UBSAN_ANCHOR, &UBSAN_END)?;
    let lines = content.lines().map(|line| line.trim().to_string()).collect();
    Some(Normalized {
        content: content.to_string(),
        lines,
        terminated,
    })
}

fn is_separator(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c == '=')
}

fn normalize_kasan(raw: &str) -> Option<Normalized> {
    let start = KASAN_ANCHOR.find(raw)?.start();
    let rest = &raw[start..];

    let mut end = rest.len();
    let mut terminated = false;
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw_line in rest.split_inclusive('\n') {
        offset += raw_line.len();
        let line = KASAN_TIMESTAMP.replace(raw_line.trim(), "");
        let line = line.trim();
        if line.is_empty() || KASAN_NOISE_KEYWORDS.iter().any(|k| line.contains(k)) {
            continue;
        }
        lines.push(line.to_string());
        if is_separator(line) {
            end = offset;
            terminated = true;
            break;
        }
    }

    Some(Normalized {
        content: rest[..end].trim_end().to_string(),
        lines,
        terminated,
    })
}

fn is_java_frame(line: &str) -> bool {
    line.trim_start().starts_with("at ")
}

fn normalize_jazzer(raw: &str) -> Option<Normalized> {
    let start = JAZZER_ANCHOR.find(raw)?.start();
    let rest = &raw[start..];
    let (content, terminated) = match JAZZER_END.find(rest) {
        Some(m) => (&rest[..m.start()], true),
        // Any line after the stack, blank or not, closes it as well.
        None => (
            rest,
            rest.lines()
                .skip_while(|line| !is_java_frame(line))
                .any(|line| !is_java_frame(line)),
        ),
    };
    let content = content.trim_end();
    let lines = content.lines().map(|line| line.trim().to_string()).collect();
    Some(Normalized {
        content: content.to_string(),
        lines,
        terminated,
    })
}
