extern crate lazy_static;
extern crate sanrep;
extern crate serde_json;

use sanrep::{parse, try_parse, Cwe, ParseConfig, Sanitizer, SanitizerReport};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::RwLock;

lazy_static::lazy_static! {
    static ref EXE_SANREP: RwLock<&'static str> = RwLock::new(env!("CARGO_BIN_EXE_sanrep"));
}

const ASAN_HEAP_OVERFLOW: &str = "tests/sanrep_tests/asan_heap_overflow.txt";
const UBSAN_OVERFLOW: &str = "tests/sanrep_tests/ubsan_overflow.txt";
const KASAN_SLAB_OOB: &str = "tests/sanrep_tests/kasan_slab_oob.txt";
const JAZZER_COMMAND_INJECTION: &str = "tests/sanrep_tests/jazzer_command_injection.txt";
const NO_REPORT: &str = "tests/sanrep_tests/no_report.txt";

fn fixtures() -> Vec<(Sanitizer, String)> {
    [
        (Sanitizer::AddressSanitizer, ASAN_HEAP_OVERFLOW),
        (Sanitizer::UndefinedBehaviorSanitizer, UBSAN_OVERFLOW),
        (Sanitizer::KernelAddressSanitizer, KASAN_SLAB_OOB),
        (Sanitizer::JazzerSanitizer, JAZZER_COMMAND_INJECTION),
    ]
    .into_iter()
    .map(|(sanitizer, path)| (sanitizer, fs::read_to_string(path).unwrap()))
    .collect()
}

/// First `count` lines of a run log.
fn head(text: &str, count: usize) -> String {
    text.lines().take(count).collect::<Vec<_>>().join("\n")
}

#[test]
fn test_heap_buffer_overflow() {
    let text = fs::read_to_string(ASAN_HEAP_OVERFLOW).unwrap();
    let report = parse(&text, Sanitizer::AddressSanitizer).unwrap();

    assert_eq!(report.name(), "heap-buffer-overflow");
    assert!(report.cwe().contains(Cwe::CWE_787));
    assert!(report.cwe().contains(Cwe::CWE_125));
    assert_eq!(report.cwe().description(), "Out of bounds");
    assert!(report.content().starts_with("==1234==ERROR: AddressSanitizer"));
    assert!(report.content().ends_with("in read_header"));

    // libFuzzer and libc frames are outside of the project.
    let stack = report.stacktrace();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].function, "read_header");
    assert_eq!(stack[0].location.to_string(), "/src/parser.c:17:10");
    assert_eq!(stack[1].function, "LLVMFuzzerTestOneInput");

    let all = report.all_stacktraces();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].len(), 2);
    assert_eq!(all[1][0].function, "parser_new");

    let summary = report.summary();
    assert!(summary.starts_with("The sanitizer detected a heap-buffer-overflow error."));
    assert!(summary.contains("heap object outside of its allocated memory"));
    assert!(summary.contains("4 bytes at offset 4"));
    assert!(summary.contains("at /src/parser.c:17:10 within read_header which is called"));
    assert!(summary.contains("The object was allocated at /src/parser.c:5:15 within parser_new"));
}

#[test]
fn test_os_command_injection() {
    let text = fs::read_to_string(JAZZER_COMMAND_INJECTION).unwrap();
    let report = parse(&text, Sanitizer::JazzerSanitizer).unwrap();

    assert_eq!(report.name(), "os-command-injection");
    assert_eq!(report.cwe(), Cwe::OS_COMMAND_INJECTION);
    assert!(!report.content().contains("DEDUP_TOKEN"));

    let stack = report.stacktrace();
    assert_eq!(stack.len(), 5);
    assert_eq!(stack[1].function, "java.lang.ProcessImpl.start");
    assert_eq!(stack[1].location.to_string(), "java/lang/ProcessImpl.java:98");
    assert_eq!(
        stack[4].location.to_string(),
        "com/example/ShellFuzzer.java:14"
    );
    assert!(report
        .summary()
        .starts_with("The sanitizer detected a os-command-injection error."));
}

#[test]
fn test_slab_out_of_bounds() {
    let text = fs::read_to_string(KASAN_SLAB_OOB).unwrap();
    let report = parse(&text, Sanitizer::KernelAddressSanitizer).unwrap();

    assert_eq!(report.name(), "slab-out-of-bounds");
    assert_eq!(report.cwe(), Cwe::OUT_OF_BOUNDS);
    assert!(!report.content().contains("Kernel panic"));
    assert_eq!(report.all_stacktraces().len(), 3);

    // Sanitizer runtime frames are not narrated.
    let summary = report.summary();
    assert!(summary.contains("at drivers/misc/demo.c:41:9 within demo_read"));
    assert!(!summary.contains("kasan_report"));
    assert!(!summary.contains("dump_stack_lvl"));
}

#[test]
fn test_signed_integer_overflow() {
    let text = fs::read_to_string(UBSAN_OVERFLOW).unwrap();
    let report = parse(&text, Sanitizer::UndefinedBehaviorSanitizer).unwrap();

    assert_eq!(report.name(), "undefined-behavior");
    assert_eq!(report.cwe(), Cwe::INTEGER_OVERFLOW);
    assert_eq!(report.stacktrace().len(), 2);
    assert_eq!(report.stacktrace()[0].location.to_string(), "/src/calc.c:10:7");
    assert!(report.summary().contains(
        "signed integer overflow: 2147483647 + 1 cannot be represented in type 'int'"
    ));
}

#[test]
fn test_no_report() {
    let text = fs::read_to_string(NO_REPORT).unwrap();
    for sanitizer in Sanitizer::ALL {
        assert!(parse(&text, sanitizer).is_none());
        assert!(parse("", sanitizer).is_none());
    }

    // Run logs of other sanitizers don't match.
    for (sanitizer, text) in fixtures() {
        for other in Sanitizer::ALL.into_iter().filter(|other| *other != sanitizer) {
            assert!(parse(&text, other).is_none(), "{sanitizer} log parsed as {other}");
        }
    }
}

#[test]
fn test_idempotent() {
    for (sanitizer, text) in fixtures() {
        let first = parse(&text, sanitizer);
        let second = parse(&text, sanitizer);
        assert!(first.is_some(), "{sanitizer} fixture is not parsed");
        assert_eq!(first, second);
    }
}

#[test]
fn test_unknown_label() {
    let text = fs::read_to_string(ASAN_HEAP_OVERFLOW)
        .unwrap()
        .replace("heap-buffer-overflow", "container-overflow");
    let report = parse(&text, Sanitizer::AddressSanitizer).unwrap();
    assert_eq!(report.name(), "container-overflow");
    assert!(report.cwe().is_unknown());
    assert_eq!(report.stacktrace().len(), 2);
    assert!(report
        .summary()
        .starts_with("The sanitizer detected an error. Here is the stacktrace:"));
}

#[test]
fn test_truncated() {
    let config = ParseConfig::default();
    let cases = [
        // Error stack cut after the first frame.
        (Sanitizer::AddressSanitizer, head(&fs::read_to_string(ASAN_HEAP_OVERFLOW).unwrap(), 7)),
        (Sanitizer::UndefinedBehaviorSanitizer, head(&fs::read_to_string(UBSAN_OVERFLOW).unwrap(), 3)),
        (Sanitizer::KernelAddressSanitizer, head(&fs::read_to_string(KASAN_SLAB_OOB).unwrap(), 12)),
        // Exception without frames.
        (Sanitizer::JazzerSanitizer, head(&fs::read_to_string(JAZZER_COMMAND_INJECTION).unwrap(), 5)),
        // Stack cut after the second frame.
        (Sanitizer::JazzerSanitizer, head(&fs::read_to_string(JAZZER_COMMAND_INJECTION).unwrap(), 7)),
    ];
    for (sanitizer, text) in cases {
        assert!(
            !matches!(try_parse(&text, sanitizer, &config), Ok(Some(_))),
            "truncated {sanitizer} report is parsed"
        );
        assert!(parse(&text, sanitizer).is_none());
    }
}

#[test]
fn test_frame_index_gap() {
    let asan = fs::read_to_string(ASAN_HEAP_OVERFLOW)
        .unwrap()
        .replace("#1 0x55d1a2", "#2 0x55d1a2");
    assert!(parse(&asan, Sanitizer::AddressSanitizer).is_none());

    let ubsan = fs::read_to_string(UBSAN_OVERFLOW)
        .unwrap()
        .replace("#1 0x2", "#3 0x2");
    assert!(parse(&ubsan, Sanitizer::UndefinedBehaviorSanitizer).is_none());
}

#[test]
fn test_access_inside_region() {
    let text = fs::read_to_string(ASAN_HEAP_OVERFLOW).unwrap().replace(
        "0 bytes to the right of 4-byte region [0x602000000010,0x602000000014)",
        "4 bytes inside of 16-byte region [0x602000000010,0x602000000020)",
    );
    assert!(try_parse(&text, Sanitizer::AddressSanitizer, &ParseConfig::default()).is_err());
    assert!(parse(&text, Sanitizer::AddressSanitizer).is_none());
}

#[test]
fn test_source_root() {
    let text = fs::read_to_string(ASAN_HEAP_OVERFLOW).unwrap();
    let config = ParseConfig::new("/root/src");
    let report = try_parse(&text, Sanitizer::AddressSanitizer, &config)
        .unwrap()
        .unwrap();
    // Fuzz harness frames under /root/fuzz are dropped.
    assert_eq!(report.stacktrace().len(), 1);
    assert_eq!(report.stacktrace()[0].location.to_string(), "/parser.c:17:10");
}

#[test]
fn test_sanrep_stdout() {
    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "asan", "--stdout", ASAN_HEAP_OVERFLOW])
        .output()
        .expect("failed to start sanrep");

    assert!(output.status.success());

    let report: Result<Value, _> = serde_json::from_slice(&output.stdout);
    if let Ok(report) = report {
        assert_eq!(report["Input"], ASAN_HEAP_OVERFLOW);
        assert!(report["Summary"]
            .as_str()
            .unwrap()
            .contains("heap-buffer-overflow"));

        let report = &report["Report"];
        assert_eq!(report["Sanitizer"], "AddressSanitizer");
        assert_eq!(report["Name"], "heap-buffer-overflow");
        assert!(report["Cwe"]
            .as_array()
            .unwrap()
            .contains(&Value::from("CWE-787")));
        assert_eq!(report["Stacktrace"].as_array().unwrap().len(), 2);
        assert_eq!(report["Stacktrace"][0]["Location"], "/src/parser.c:17:10");
        assert_eq!(report["AllocStack"].as_array().unwrap().len(), 2);
        assert_eq!(report["Size"], 4);
        assert_eq!(report["Length"], 4);
        assert_eq!(report["Offset"], 4);
        assert!(report.get("FreeStack").is_none());
    } else {
        panic!("Couldn't parse json report.");
    }
}

#[test]
fn test_sanrep_summary() {
    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "jazzer", "--stdout", "--summary", JAZZER_COMMAND_INJECTION])
        .output()
        .expect("failed to start sanrep");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("The sanitizer detected a os-command-injection error."));
    assert!(stdout.contains("within com.example.Shell.run"));
}

#[test]
fn test_sanrep_stdin() {
    let mut child = Command::new(*EXE_SANREP.read().unwrap())
        .args(["--sanitizer", "UndefinedBehaviorSanitizer", "--stdout"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("failed to start sanrep");
    {
        let mut stdin = child.stdin.take().unwrap();
        stdin
            .write_all(fs::read_to_string(UBSAN_OVERFLOW).unwrap().as_bytes())
            .unwrap();
    }
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["Input"], "stdin");
    assert_eq!(report["Report"]["Location"], "/src/calc.c:10:7");
    assert_eq!(report["Report"]["Cwe"][0], "CWE-190");
}

#[test]
fn test_sanrep_output_dir() {
    let out = std::env::temp_dir().join("sanrep_tests_output");
    let _ = fs::remove_dir_all(&out);

    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "kasan", "-j", "2", "-o", out.to_str().unwrap()])
        .args([KASAN_SLAB_OOB, NO_REPORT])
        .output()
        .expect("failed to start sanrep");

    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let reports: Vec<PathBuf> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].file_name().unwrap().to_str().unwrap(),
        "kasan_slab_oob.txt.sanrep"
    );

    let report: Value = serde_json::from_str(&fs::read_to_string(&reports[0]).unwrap()).unwrap();
    assert_eq!(report["Report"]["Sanitizer"], "KernelAddressSanitizer");
    assert_eq!(report["Report"]["Address"], "ffff888003a4b208");
    assert_eq!(report["Report"]["FreeStack"].as_array().unwrap().len(), 2);

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No KernelAddressSanitizer report found in tests/sanrep_tests/no_report.txt"));

    let _ = fs::remove_dir_all(&out);
}

#[test]
fn test_sanrep_args() {
    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "msan", "--stdout", NO_REPORT])
        .output()
        .expect("failed to start sanrep");
    assert!(!output.status.success());

    // One of --stdout and --output is required.
    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "asan", NO_REPORT])
        .output()
        .expect("failed to start sanrep");
    assert!(!output.status.success());

    let output = Command::new(*EXE_SANREP.read().unwrap())
        .args(["-s", "tsan", "--stdout", ASAN_HEAP_OVERFLOW])
        .output()
        .expect("failed to start sanrep");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}
