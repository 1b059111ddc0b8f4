//! `fork` demo program: the parent grows its heap by one page, fills it
//! with `0xAA`, forks, overwrites its own copy with `0xBB`, and exits
//! normally (not via `panic`, so the VM keeps running). The child —
//! scheduled next — reads its own copy of the page and reports via
//! `panic` whether it still sees `0xAA`, proving fork produced an
//! independent copy rather than a shared mapping.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use useralloc::{exit, fork, panic_msg, sbrk};

const PAGE_SIZE: usize = 4096;

fn report(msg: &[u8]) -> ! {
    panic_msg(msg.as_ptr())
}

#[no_mangle]
#[link_section = ".text.start"]
pub extern "C" fn _start() -> ! {
    let base = sbrk(PAGE_SIZE as isize);
    if base < 0 {
        report(b"forktest: sbrk failed\0");
    }
    let page = base as usize as *mut u8;

    unsafe {
        for i in 0..PAGE_SIZE {
            page.add(i).write_volatile(0xAA);
        }
    }

    match fork() {
        child_pid if child_pid > 0 => {
            // Parent: overwrite its own copy, then exit normally so the
            // child — not a `panic` halt — gets to run and report.
            unsafe { page.write_volatile(0xBB) };
            exit(0);
        }
        0 => {
            // Child: independent copy, must still read 0xAA.
            let first = unsafe { page.read_volatile() };
            if first == 0xAA {
                report(b"forktest: PASS (child saw 0xAA, independent copy)\0");
            } else {
                report(b"forktest: FAIL (child saw parent's write)\0");
            }
        }
        _ => report(b"forktest: fork failed\0"),
    }
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    report(b"forktest: panicked\0")
}
