// kernel/src/process/embedded_programs.rs
//
// Raw machine code for the four CLI-selectable programs (`malloc`,
// `alloctests`, `test`, `test2`), embedded directly in the kernel
// binary: a `global_asm!` block per program, with a `_start`/`_end`
// label pair bracketing it so `loader::EmbeddedLoader` can slice out
// its bytes without a real ELF loader or build pipeline.
//
// These are the runnable stand-ins for `demos/malloc_demo` and
// `demos/forktest` — equivalent in spirit (they exercise the same
// syscalls) but hand-assembled so the kernel is self-contained. The
// syscall numbering matches `process::syscall::numbers` exactly:
// getpid=0, fork=1, exit=2, yield=3, brk=4, sbrk=5, page_alloc=6,
// panic=7, mapping=8, mem_tog=9.

use core::arch::global_asm;

// `malloc` — grows the heap by one page via `sbrk`, touches every byte
// of it (driving one demand-paging fault per page), then loops forever.
global_asm!(
    ".global prog_malloc_start",
    ".global prog_malloc_end",
    ".section .text.user",
    "prog_malloc_start:",
    "    mov rax, 5",          // sbrk
    "    mov rdi, 4096",
    "    int 0x80",            // rax = old break
    "    mov rbx, rax",
    "    mov rcx, 4096",
    "1:",
    "    mov byte ptr [rbx], 0xAA",
    "    inc rbx",
    "    dec rcx",
    "    jnz 1b",
    "2:",
    "    mov rax, 3",          // yield
    "    int 0x80",
    "    jmp 2b",
    "prog_malloc_end:",
);

// `alloctests` — a short sequence of `sbrk` growth and shrink
// (`sbrk(+8192); sbrk(-4096)`), touching the grown region before
// shrinking it back.
global_asm!(
    ".global prog_alloctests_start",
    ".global prog_alloctests_end",
    ".section .text.user",
    "prog_alloctests_start:",
    "    mov rax, 5",          // sbrk(+8192)
    "    mov rdi, 8192",
    "    int 0x80",
    "    mov rbx, rax",
    "    mov byte ptr [rbx], 0x42",
    "    mov byte ptr [rbx + 4096], 0x42",
    "    mov rax, 5",          // sbrk(-4096)
    "    mov rdi, -4096",
    "    int 0x80",
    "1:",
    "    mov rax, 3",          // yield
    "    int 0x80",
    "    jmp 1b",
    "prog_alloctests_end:",
);

// `test` — the minimal Ring-3 sanity check: one `getpid` syscall, then
// loop. If this doesn't come back with a sane pid, nothing else in the
// system can be trusted either.
global_asm!(
    ".global prog_test_start",
    ".global prog_test_end",
    ".section .text.user",
    "prog_test_start:",
    "    mov rax, 0",          // getpid
    "    int 0x80",
    "1:",
    "    mov rax, 3",          // yield
    "    int 0x80",
    "    jmp 1b",
    "prog_test_end:",
);

// `test2` — exercises `fork`: the child spins, the parent `exit`s
// immediately so the scheduler moves on to it; `demos/forktest` covers
// the heap-independence check more directly.
global_asm!(
    ".global prog_test2_start",
    ".global prog_test2_end",
    ".section .text.user",
    "prog_test2_start:",
    "    mov rax, 1",          // fork
    "    int 0x80",
    "    cmp rax, 0",
    "    je 2f",
    "    mov rax, 2",          // exit (parent)
    "    int 0x80",
    "2:",
    "1:",
    "    mov rax, 3",          // yield (child)
    "    int 0x80",
    "    jmp 1b",
    "prog_test2_end:",
);

extern "C" {
    static prog_malloc_start: u8;
    static prog_malloc_end: u8;
    static prog_alloctests_start: u8;
    static prog_alloctests_end: u8;
    static prog_test_start: u8;
    static prog_test_end: u8;
    static prog_test2_start: u8;
    static prog_test2_end: u8;
}

unsafe fn slice_between(start: &u8, end: &u8) -> &'static [u8] {
    let start = start as *const u8;
    let end = end as *const u8;
    core::slice::from_raw_parts(start, end as usize - start as usize)
}

/// Program numbers in CLI selection order: `malloc`, `alloctests`,
/// `test`, `test2`. An unrecognized CLI string falls through to `test`
/// (index 2), the default program.
pub const MALLOC: u32 = 0;
pub const ALLOCTESTS: u32 = 1;
pub const TEST: u32 = 2;
pub const TEST2: u32 = 3;

pub fn program_image(program: u32) -> &'static [u8] {
    unsafe {
        match program {
            MALLOC => slice_between(&prog_malloc_start, &prog_malloc_end),
            ALLOCTESTS => slice_between(&prog_alloctests_start, &prog_alloctests_end),
            TEST2 => slice_between(&prog_test2_start, &prog_test2_end),
            _ => slice_between(&prog_test_start, &prog_test_end),
        }
    }
}

/// Parses the bootloader CLI command string into a program number:
/// `malloc`, `alloctests`, `test`, `test2`, default.
pub fn program_for_cli(cmd: &str) -> u32 {
    match cmd {
        "malloc" => MALLOC,
        "alloctests" => ALLOCTESTS,
        "test" => TEST,
        "test2" => TEST2,
        _ => TEST,
    }
}

use lazy_static::lazy_static;

lazy_static! {
    /// Indexed by program number; backs `loader::EmbeddedLoader.programs`.
    pub static ref PROGRAMS: [&'static [u8]; 4] = [
        program_image(MALLOC),
        program_image(ALLOCTESTS),
        program_image(TEST),
        program_image(TEST2),
    ];
}
