//! `malloc` demo program: exercises `useralloc`'s best-fit reuse and
//! coalescing, then reports pass/fail through the `panic` syscall — the
//! only message-carrying channel a user program has, since the console
//! is read-only from every process.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use useralloc::{defrag, free, heap_info, malloc, panic_msg, HeapInfo};

fn report(msg: &[u8]) -> ! {
    panic_msg(msg.as_ptr())
}

/// Scenario 1: malloc(16); malloc(16); free(first); malloc(16) reuses the
/// first block (best fit); live count ends at 2.
unsafe fn scenario_best_fit_reuse() -> bool {
    let a = malloc(16);
    let _b = malloc(16);
    if a.is_null() || _b.is_null() {
        return false;
    }
    free(a);
    let c = malloc(16);
    if c != a {
        return false;
    }

    let mut info = HeapInfo::new();
    if heap_info(&mut info) != 0 {
        return false;
    }
    info.num_allocs == 2
}

/// Scenario 2: two 100-byte allocations, both freed, then `defrag()`
/// leaves a single free block of at least 200 bytes plus two headers.
unsafe fn scenario_defrag_merges() -> bool {
    let a = malloc(100);
    let b = malloc(100);
    if a.is_null() || b.is_null() {
        return false;
    }
    free(a);
    free(b);
    defrag();

    let mut info = HeapInfo::new();
    if heap_info(&mut info) != 0 {
        return false;
    }
    info.largest_free_chunk >= 200
}

#[no_mangle]
#[link_section = ".text.start"]
pub extern "C" fn _start() -> ! {
    let ok = unsafe { scenario_best_fit_reuse() && scenario_defrag_merges() };
    if ok {
        report(b"malloc_demo: PASS\0");
    } else {
        report(b"malloc_demo: FAIL\0");
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    report(b"malloc_demo: panicked\0")
}
