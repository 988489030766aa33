//! Constants for kernel log cleanup and stack trace narration.

/// Substrings of kernel log lines that are dropped from a KASAN report
/// (register dumps, CPU and task banners, audit messages).
pub const KASAN_NOISE_KEYWORDS: &[&str] = &[
    "RIP",
    "Code",
    "RSP",
    "RAX",
    "RDX",
    "RBP",
    "R10",
    "R13",
    "</",
    "CORRUPTED:",
    "MAINTAINERS ",
    "CPU: ",
    "Hardware name:",
    "Call Trace:",
    "<IRQ>",
    "<TASK>",
    "audit:",
    "Workqueue:",
];

/// Kernel functions of the sanitizer, allocator and report machinery that are
/// left out of stack narrations. The names follow the 6.x kernel series.
pub const KASAN_INTERNAL_FUNCTIONS: &[&str] = &[
    "__kmem_cache_alloc_lru",
    "slab_alloc",
    "slab_alloc_node",
    "slab_post_alloc_hook",
    "slab_free",
    "slab_free_freelist_hook",
    "slab_free_hook",
    "__dump_stack",
    "dump_stack_lvl",
    "print_report",
    "__virt_addr_valid",
    "__phys_addr",
    "kasan_report",
    "trace_event_raw_event_sched_switch",
    "__sanitizer_cov_trace_switch",
    "entry_SYSCALL_64_after_hwframe",
    "do_syscall_64",
    "panic_print_sys_info.part.0",
    "kasan_report.cold",
    "panic",
    "end_report",
    "end_report.part.0",
    "check_panic_on_warn.cold",
    "die_addr.cold",
    "exc_general_protection",
    "asm_exc_general_protection",
    "syscall_enter_from_user_mode",
    "lockdep_hardirqs_on",
    "lockdep_hardirqs_on_prepare",
    "kasan_check_range",
    "end_report.cold",
    "print_address_description",
    "kasan_save_stack",
    "get_current",
    "kasan_set_track",
    "kasan_save_track",
    "poison_kmalloc_redzone",
    "__kasan_kmalloc",
    "poison_slab_object",
    "__kasan_slab_free",
    "show_stack",
    "dump_backtrace",
];

/// Substrings of system call entry functions left out of stack narrations.
pub const KASAN_SYSCALL_ENTRY_MARKERS: &[&str] = &[
    "__x64_sys",
    "__do_sys_",
    "__se_sys_",
    "do_syscall_",
    "entry_SYSCALL_64_",
];

/// Sanitizer frames and sources contain this substring.
pub const KASAN_MARKER: &str = "kasan";
