//! Provides stack frame types, the `FrameGrammar` trait implemented by every
//! sanitizer and the line cursor the body parsers consume reports with.
use lexiclean::Lexiclean;
use regex::{Captures, Regex};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;

use crate::error::*;

lazy_static::lazy_static! {
    static ref SOURCE: Regex =
        Regex::new(r"^(?P<file>.+?)(?::(?P<line>\d+))?(?::(?P<column>\d+))?$").unwrap();
}

/// Source location of one frame: `file[:line[:column]]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Normalized source path.
    pub file: String,
    pub line: Option<u64>,
    pub column: Option<u64>,
}

impl SourceLocation {
    /// Split `file[:line[:column]]` into its parts. The path is lexically
    /// normalized, separators are always `/`.
    pub fn parse(source: &str) -> Option<SourceLocation> {
        let caps = SOURCE.captures(source.trim())?;
        let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u64>().ok());
        Some(SourceLocation {
            file: clean_path(caps.name("file")?.as_str()),
            line: number("line"),
            column: number("column"),
        })
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{}:{}:{}", self.file, line, column),
            (Some(line), None) => write!(f, "{}:{}", self.file, line),
            _ => write!(f, "{}", self.file),
        }
    }
}

impl Serialize for SourceLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One call-site record of a stack.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackFrame {
    #[serde(rename(serialize = "Function"))]
    pub function: String,
    #[serde(rename(serialize = "Location"))]
    pub location: SourceLocation,
}

impl StackFrame {
    pub fn new(function: impl Into<String>, location: SourceLocation) -> Self {
        StackFrame {
            function: function.into(),
            location,
        }
    }
}

/// Frames of one stack section, innermost first.
pub type Stacktrace = Vec<StackFrame>;

/// Lexically normalize a path (`a/./b/../c` -> `a/c`) with `/` separators.
pub fn clean_path(path: &str) -> String {
    Path::new(path)
        .lexiclean()
        .to_string_lossy()
        .replace('\\', "/")
}

/// Remove the source root from an absolute source path.
///
/// # Arguments
///
/// * `path` - source path as printed by the sanitizer
///
/// * `root` - directory the instrumented project lives in
///
/// # Return value
///
/// Normalized path relative to `root` with a leading `/`, or `None` if `path` is
/// outside of `root`.
pub fn strip_source_root(path: &str, root: &str) -> Option<String> {
    let relative = Path::new(path).strip_prefix(root).ok()?;
    Some(clean_path(&format!("/{}", relative.to_string_lossy())))
}

/// One line of a stack section as seen by a frame grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLine {
    /// Explicit frame index (`#N`) if the grammar has one.
    pub index: Option<usize>,
    /// Parsed frame, `None` for frames that are counted but not kept.
    pub frame: Option<StackFrame>,
}

/// Per-sanitizer frame line pattern.
pub trait FrameGrammar {
    /// Classify one line.
    ///
    /// `Ok(None)` means the line is not a frame and ends the stack. An error
    /// means the line claims to be a frame but is malformed.
    fn frame_line(&self, line: &str) -> Result<Option<FrameLine>>;

    /// Whether the line starts a stack section.
    fn is_frame_start(&self, line: &str) -> bool {
        matches!(self.frame_line(line), Ok(Some(_)))
    }

    /// Whether the end of input is a valid stack terminator. When it is not,
    /// a stack reaching the end of input is a truncated report.
    fn end_of_input_ends_stack(&self) -> bool {
        false
    }
}

/// Sequential, non-backtracking cursor over normalized report lines.
#[derive(Clone, Debug)]
pub struct Lines<'a> {
    lines: &'a [String],
    pos: usize,
}

impl<'a> Lines<'a> {
    pub fn new(lines: &'a [String]) -> Self {
        Lines { lines, pos: 0 }
    }

    /// Next line without consuming it.
    pub fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).map(String::as_str)
    }

    /// Consume blank lines.
    pub fn skip_blank(&mut self) {
        while self.peek().map_or(false, |line| line.trim().is_empty()) {
            self.pos += 1;
        }
    }

    /// Consume the next non-blank line, which must match `re`.
    ///
    /// # Arguments
    ///
    /// * `re` - mandatory line pattern
    ///
    /// * `what` - name of the line for the error message
    pub fn expect(&mut self, re: &Regex, what: &str) -> Result<Captures<'a>> {
        self.skip_blank();
        let Some(line) = self.next() else {
            return Err(Error::Truncated(format!("missing {what} line")));
        };
        re.captures(line)
            .ok_or_else(|| Error::Parse(format!("Couldn't parse {what} line: {line}")))
    }

    /// Consume the next non-blank line if it matches `re`.
    pub fn next_if_match(&mut self, re: &Regex) -> Option<Captures<'a>> {
        self.skip_blank();
        let caps = re.captures(self.peek()?)?;
        self.pos += 1;
        Some(caps)
    }

    /// Consume lines up to and including the first one matching `re`.
    pub fn seek(&mut self, re: &Regex) -> Option<Captures<'a>> {
        for line in self.by_ref() {
            if let Some(caps) = re.captures(line) {
                return Some(caps);
            }
        }
        None
    }

    /// Consume lines until the next one starts a stack section.
    pub fn seek_frame<G: FrameGrammar + ?Sized>(&mut self, grammar: &G) -> Result<()> {
        while let Some(line) = self.peek() {
            if grammar.is_frame_start(line) {
                return Ok(());
            }
            self.pos += 1;
        }
        Err(Error::Truncated("no stack trace found".to_string()))
    }

    /// Consume one stack section.
    ///
    /// The line that ends the stack is not consumed. Frame indices, when the
    /// grammar provides them, must run 0, 1, 2, ... without gaps.
    pub fn stack<G: FrameGrammar + ?Sized>(&mut self, grammar: &G) -> Result<Stacktrace> {
        let mut stack = Stacktrace::new();
        let mut expected = 0;
        loop {
            let Some(line) = self.peek() else {
                if grammar.end_of_input_ends_stack() {
                    return Ok(stack);
                }
                return Err(Error::Truncated(format!(
                    "input ends inside a stack after {expected} frames"
                )));
            };
            let Some(frame_line) = grammar.frame_line(line)? else {
                return Ok(stack);
            };
            self.pos += 1;
            if let Some(found) = frame_line.index {
                if found != expected {
                    return Err(Error::StackIndex { expected, found });
                }
            }
            expected += 1;
            if let Some(frame) = frame_line.frame {
                stack.push(frame);
            }
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `name file:line` frames without indices.
    struct Plain;

    impl FrameGrammar for Plain {
        fn frame_line(&self, line: &str) -> Result<Option<FrameLine>> {
            let Some((function, source)) = line.split_once(' ') else {
                return Ok(None);
            };
            Ok(SourceLocation::parse(source)
                .filter(|location| location.line.is_some())
                .map(|location| FrameLine {
                    index: None,
                    frame: Some(StackFrame::new(function, location)),
                }))
        }
    }

    /// `#N name` frames.
    struct Indexed;

    impl FrameGrammar for Indexed {
        fn frame_line(&self, line: &str) -> Result<Option<FrameLine>> {
            let Some(rest) = line.strip_prefix('#') else {
                return Ok(None);
            };
            let Some((index, function)) = rest.split_once(' ') else {
                return Err(Error::Parse(line.to_string()));
            };
            Ok(Some(FrameLine {
                index: index.parse().ok(),
                frame: Some(StackFrame::new(function, SourceLocation::default())),
            }))
        }
    }

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_source_location() {
        let loc = SourceLocation::parse("/src/./lib/../main.c:12:7").unwrap();
        assert_eq!(loc.file, "/src/main.c");
        assert_eq!(loc.line, Some(12));
        assert_eq!(loc.column, Some(7));
        assert_eq!(loc.to_string(), "/src/main.c:12:7");

        let loc = SourceLocation::parse("mm/slub.c:3412").unwrap();
        assert_eq!(loc.to_string(), "mm/slub.c:3412");
        assert_eq!(loc.column, None);

        let loc = SourceLocation::parse("bin_dyldcache.c").unwrap();
        assert_eq!(loc.line, None);
        assert_eq!(loc.to_string(), "bin_dyldcache.c");
    }

    #[test]
    fn test_strip_source_root() {
        assert_eq!(
            strip_source_root("/root/src/a/../b.c", "/root"),
            Some("/src/b.c".to_string())
        );
        assert_eq!(strip_source_root("/rootfs/b.c", "/root"), None);
        assert_eq!(strip_source_root("/usr/include/string.h", "/root"), None);
        assert_eq!(
            strip_source_root("/src/proj/x.c", "/"),
            Some("/src/proj/x.c".to_string())
        );
    }

    #[test]
    fn test_stack_stops_before_terminator() {
        let text = lines("f a.c:1\ng b.c:2\nAllocated by task 1:\nh c.c:3");
        let mut cursor = Lines::new(&text);
        let stack = cursor.stack(&Plain).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[1].function, "g");
        assert_eq!(cursor.peek(), Some("Allocated by task 1:"));
    }

    #[test]
    fn test_stack_truncated() {
        let text = lines("f a.c:1\ng b.c:2");
        let mut cursor = Lines::new(&text);
        assert!(matches!(cursor.stack(&Plain), Err(Error::Truncated(_))));
    }

    #[test]
    fn test_stack_index() {
        let text = lines("#0 f\n#1 g\n\n");
        assert_eq!(Lines::new(&text).stack(&Indexed).unwrap().len(), 2);

        let text = lines("#0 f\n#1 g\n#3 h\n\n");
        assert_eq!(
            Lines::new(&text).stack(&Indexed),
            Err(Error::StackIndex {
                expected: 2,
                found: 3
            })
        );

        let text = lines("#1 f\n\n");
        assert!(Lines::new(&text).stack(&Indexed).is_err());
    }

    #[test]
    fn test_cursor_moves() {
        let re = Regex::new(r"^freed by thread (T\d+) here:$").unwrap();
        let text = lines("\n\nfreed by thread T0 here:\n#0 f\nnoise\n#0 g\n");
        let mut cursor = Lines::new(&text);
        let caps = cursor.next_if_match(&re).unwrap();
        assert_eq!(&caps[1], "T0");
        assert!(cursor.next_if_match(&re).is_none());
        assert!(cursor.expect(&re, "free").is_err());

        let mut cursor = Lines::new(&text);
        cursor.seek_frame(&Indexed).unwrap();
        assert_eq!(cursor.peek(), Some("#0 f"));
        assert!(cursor.seek(&re).is_none());
        assert!(cursor.seek_frame(&Indexed).is_err());
    }
}
