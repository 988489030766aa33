//! Natural-language narratives of parsed reports.
use crate::asan::AsanReport;
use crate::constants::{KASAN_INTERNAL_FUNCTIONS, KASAN_MARKER, KASAN_SYSCALL_ENTRY_MARKERS};
use crate::jazzer::JazzerReport;
use crate::kasan::KasanReport;
use crate::report::Report;
use crate::stacktrace::StackFrame;
use crate::ubsan::UbsanReport;

/// Meaning of AddressSanitizer error kinds.
pub const ASAN_DESCRIPTIONS: &[(&str, &str)] = &[
    ("heap-buffer-overflow", "the program tried to access a heap object outside of its allocated memory"),
    ("stack-buffer-overflow", "the program tried to access a stack object outside of its allocated memory"),
    ("stack-buffer-underflow", "the program tried to access a stack object outside of its allocated memory"),
    ("stack-use-after-return", "the program tried to access a stack object after the function that allocated it returned"),
    ("global-buffer-overflow", "the program tried to access a global object outside of its allocated memory"),
    ("heap-use-after-free", "the program tried to access a heap object after it was freed"),
    ("double-free", "the program tried to free a heap object that was already freed"),
    ("invalid-free", "the program attempted to free a pointer that does not point to the start address of a heap object"),
    ("invalid-memory-access", "the program tried to access an invalid pointer"),
    ("negative-size-param", "the program passed a negative value as a size parameter"),
    ("memcpy-param-overlap", "the program passed overlapping source and destination pointers to memcpy"),
    ("stack-overflow", "the program's stack size exceeded the limit"),
    ("float-point-exception", "the program encountered a floating-point exception (eg. division by zero)"),
];

/// Meaning of KernelAddressSanitizer bug types.
pub const KASAN_DESCRIPTIONS: &[(&str, &str)] = &[
    ("out-of-bounds", "the kernel tried to access a kernel heap object outside of its allocated memory"),
    ("slab-out-of-bounds", "the kernel tried to access a kernel heap object outside of its allocated memory"),
    ("vmalloc-out-of-bounds", "the kernel tried to access an address outside of the vmalloc memory area"),
    ("global-out-of-bounds", "the kernel tried to access a global object outside of its allocated memory"),
    ("use-after-free", "the kernel tried to access a kernel heap object after it was freed"),
    ("slab-use-after-free", "the kernel tried to access a kernel heap object after it was freed"),
    ("double-free", "the kernel tried to free a kernel heap object that was already freed"),
    ("invalid-free", "the kernel attempted to free a pointer that does not point to the start address of a kernel heap object"),
    ("null-ptr-deref", "the kernel tried to dereference a null pointer"),
    ("wild-memory-access", "the kernel tried to access an invalid memory area"),
    ("user-memory-access", "the kernel tried to access an invalid user memory area"),
    ("stack-out-of-bounds", "the kernel tried to access a stack object outside of its allocated memory"),
];

/// Meaning of Jazzer security issues.
pub const JAZZER_DESCRIPTIONS: &[(&str, &str)] = &[
    ("ldap-injection", "the program built an LDAP query from untrusted input"),
    ("remote-jndi-lookup", "the program performed a JNDI lookup of an attacker-controlled name"),
    ("os-command-injection", "the program executed an OS command built from untrusted input"),
    ("load-arbitrary-library", "the program loaded a native library whose path comes from untrusted input"),
    ("regular-expression-injection", "the program compiled a regular expression built from untrusted input"),
    ("script-engine-injection", "the program evaluated script code built from untrusted input"),
    ("server-side-request-forgery", "the program opened a network connection to an attacker-controlled host"),
    ("sql-injection", "the program executed an SQL query built from untrusted input"),
    ("xpath-injection", "the program evaluated an XPath expression built from untrusted input"),
];

const OUT_OF_BOUNDS_HINT: &str = "1. Find which variable indicates the size of the object and add bounds checking to prevent the overflow. \n\
    2. Focused on some unsafe functions like memcpy, strcpy, strcat, strcmp, and so on, replace them with safer alternatives. \n\
    3. If the overflow is unavoidable, consider allocating a larger buffer at allocation site. \n\
    4. The error may caused by a integer overflow, consider all suspicious integer operations.";

const USE_AFTER_FREE_HINT: &str = "1. Ensure that the object is not accessed after it is freed. \n\
    2. If the object is accessed after it is freed, consider swapping the order of the free and access operations. \n";

const NULL_POINTER_HINT: &str = "1. Ensure that the pointer is valid before dereferencing it. \n\
    2. If the pointer is not valid, consider checking the pointer before dereferencing it.";

const INJECTION_HINT: &str = "1. Validate or escape the untrusted input before it reaches the query or command. \n\
    2. Prefer APIs that take the untrusted value as a bound parameter over building the query or command by string concatenation.";

const RESOURCE_HINT: &str = "1. Check the untrusted value against an allowlist before it is used to locate a remote or native resource. \n\
    2. Reject values that do not match the expected format.";

/// Remediation hints of AddressSanitizer error kinds.
pub const ASAN_HINTS: &[(&[&str], &str)] = &[
    (
        &[
            "heap-buffer-overflow",
            "stack-buffer-overflow",
            "stack-buffer-underflow",
            "global-buffer-overflow",
        ],
        OUT_OF_BOUNDS_HINT,
    ),
    (
        &["heap-use-after-free", "double-free", "invalid-free"],
        USE_AFTER_FREE_HINT,
    ),
    (&["invalid-memory-access"], NULL_POINTER_HINT),
    (
        &["negative-size-param"],
        "1. Ensure that the size parameter is not negative. \n\
         2. If the size parameter is negative, consider checking the size parameter before using it.",
    ),
    (
        &["memcpy-param-overlap"],
        "1. Ensure that the source and destination pointers do not overlap. \n\
         2. If the source and destination pointers overlap, consider using memmove instead of memcpy.",
    ),
    (
        &["float-point-exception"],
        "1. If the operation is division(/), mod(%), you should consider the possibility of dividing by zero. \n\
         2. If the operation is sqrt, log, pow, you should consider the possibility of taking the square root of a negative number.",
    ),
    (
        &["stack-use-after-return"],
        "1. Ensure that the object is not accessed after the function that allocated it returned. \n\
         2. If the object is accessed after the function that allocated it returned, consider allocating the object on the heap instead of the stack.",
    ),
];

/// Remediation hints of KernelAddressSanitizer bug types.
pub const KASAN_HINTS: &[(&[&str], &str)] = &[
    (
        &[
            "slab-out-of-bounds",
            "out-of-bounds",
            "vmalloc-out-of-bounds",
            "stack-out-of-bounds",
            "global-out-of-bounds",
        ],
        OUT_OF_BOUNDS_HINT,
    ),
    (
        &["use-after-free", "slab-use-after-free", "double-free", "invalid-free"],
        USE_AFTER_FREE_HINT,
    ),
    (&["null-ptr-deref"], NULL_POINTER_HINT),
    (
        &["user-memory-access"],
        "1. Ensure that the user memory is valid before accessing it. \n\
         2. If the user memory is not valid, consider checking the user memory before accessing it.",
    ),
];

/// Remediation hints of Jazzer security issues.
pub const JAZZER_HINTS: &[(&[&str], &str)] = &[
    (
        &[
            "ldap-injection",
            "os-command-injection",
            "regular-expression-injection",
            "script-engine-injection",
            "sql-injection",
            "xpath-injection",
        ],
        INJECTION_HINT,
    ),
    (
        &[
            "remote-jndi-lookup",
            "load-arbitrary-library",
            "server-side-request-forgery",
        ],
        RESOURCE_HINT,
    ),
];

fn description(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table.iter().find(|(key, _)| *key == name).map(|(_, text)| *text)
}

fn hint(table: &[(&[&str], &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(keys, _)| keys.contains(&name))
        .map(|(_, text)| *text)
}

/// Narrate a stack from the innermost frame outwards.
pub fn narrate(stack: &[StackFrame]) -> String {
    narrate_filtered(stack, |_| true)
}

/// Narrate a kernel stack without sanitizer and system call entry frames.
/// The outermost frame is always kept.
pub fn narrate_kernel(stack: &[StackFrame]) -> String {
    narrate_filtered(stack, |frame| !is_kernel_internal(frame))
}

fn narrate_filtered<F: Fn(&StackFrame) -> bool>(stack: &[StackFrame], keep: F) -> String {
    let Some((last, rest)) = stack.split_last() else {
        return String::new();
    };
    let mut narration = String::new();
    for frame in rest.iter().filter(|frame| keep(frame)) {
        narration.push_str(&format!(
            "at {} within {} which is called \n",
            frame.location, frame.function
        ));
    }
    narration.push_str(&format!("at {} within {}.", last.location, last.function));
    narration
}

/// Frame of the sanitizer runtime, the allocator or the system call entry.
pub fn is_kernel_internal(frame: &StackFrame) -> bool {
    frame.function.contains(KASAN_MARKER)
        || frame.location.file.contains(KASAN_MARKER)
        || KASAN_INTERNAL_FUNCTIONS.contains(&frame.function.as_str())
        || KASAN_SYSCALL_ENTRY_MARKERS
            .iter()
            .any(|marker| frame.function.contains(marker))
}

fn reduced(narration: String) -> String {
    format!("The sanitizer detected an error. Here is the stacktrace: \n{narration}")
}

fn opening(name: &str, description: &str) -> String {
    format!("The sanitizer detected a {name} error. It means that {description}. ")
}

fn closing(summary: &mut String, hint: Option<&str>) {
    if let Some(hint) = hint {
        summary.push_str(&format!(
            "\n\nTo patch the error, you could consider the following options: \n{hint}"
        ));
    }
}

/// Narrative of an AddressSanitizer report.
pub fn asan(report: &AsanReport) -> String {
    let Some(description) = description(ASAN_DESCRIPTIONS, &report.name) else {
        return reduced(narrate(&report.stacktrace));
    };
    let mut summary = opening(&report.name, description);
    if let (Some(size), Some(length), Some(offset)) = (report.size, report.length, report.offset)
    {
        summary.push_str(&format!(
            "The size of the object is {size} bytes, but the program tried to access {length} bytes at offset {offset}. "
        ));
    }
    if let Some(address) = &report.address {
        summary.push_str(&format!("The address is {address}. "));
    }

    summary.push_str("\n\nThe error happened ");
    summary.push_str(&narrate(&report.stacktrace));
    if let Some(stack) = report.alloc_stack.as_ref().filter(|stack| !stack.is_empty()) {
        summary.push_str("\n\nThe object was allocated ");
        summary.push_str(&narrate(stack));
    }
    if let Some(stack) = report.free_stack.as_ref().filter(|stack| !stack.is_empty()) {
        summary.push_str("\n\nThe object was freed ");
        summary.push_str(&narrate(stack));
    }
    if let Some(frame) = &report.frame {
        summary.push_str("\n\nThe object is defined ");
        summary.push_str(&narrate(std::slice::from_ref(frame)));
    }
    closing(&mut summary, hint(ASAN_HINTS, &report.name));
    summary
}

/// Narrative of an UndefinedBehaviorSanitizer report.
pub fn ubsan(report: &UbsanReport) -> String {
    format!(
        "The sanitizer detected a {} error: {}.\n\nThe error happened {}",
        report.name,
        report.description,
        narrate(&report.stacktrace)
    )
}

/// Narrative of a KernelAddressSanitizer report. Allocation and free sites with
/// a single frame are left out.
pub fn kasan(report: &KasanReport) -> String {
    let Some(description) = description(KASAN_DESCRIPTIONS, &report.name) else {
        return reduced(narrate_kernel(&report.stacktrace));
    };
    let mut summary = opening(&report.name, description);
    summary.push_str("\n\nThe error happened ");
    summary.push_str(&narrate_kernel(&report.stacktrace));
    if let Some(stack) = report.alloc_stack.as_ref().filter(|stack| stack.len() > 1) {
        summary.push_str("\n\nThe object was allocated ");
        summary.push_str(&narrate_kernel(stack));
    }
    if let Some(stack) = report.free_stack.as_ref().filter(|stack| stack.len() > 1) {
        summary.push_str("\n\nThe object was freed ");
        summary.push_str(&narrate_kernel(stack));
    }
    closing(&mut summary, hint(KASAN_HINTS, &report.name));
    summary
}

/// Narrative of a Jazzer finding.
pub fn jazzer(report: &JazzerReport) -> String {
    let Some(description) = description(JAZZER_DESCRIPTIONS, &report.name) else {
        return reduced(narrate(&report.stacktrace));
    };
    let mut summary = opening(&report.name, description);
    summary.push_str("\n\nThe error happened ");
    summary.push_str(&narrate(&report.stacktrace));
    closing(&mut summary, hint(JAZZER_HINTS, &report.name));
    summary
}

/// Narrative of any report.
pub fn render(report: &Report) -> String {
    match report {
        Report::Address(report) => asan(report),
        Report::UndefinedBehavior(report) => ubsan(report),
        Report::KernelAddress(report) => kasan(report),
        Report::Jazzer(report) => jazzer(report),
    }
}
