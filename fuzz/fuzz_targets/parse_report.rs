#![no_main]

use libfuzzer_sys::fuzz_target;

use sanrep::{parse, Sanitizer, SanitizerReport};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let s = String::from_utf8_lossy(&data[1..]);
    let sanitizer = Sanitizer::ALL[data[0] as usize % Sanitizer::ALL.len()];
    if let Some(report) = parse(&s, sanitizer) {
        assert!(!report.stacktrace().is_empty());
        let _ = report.summary();
    }
});
