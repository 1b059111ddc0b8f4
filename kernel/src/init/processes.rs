// kernel/src/init/processes.rs
//
// Boot-time process creation: the bootloader's CLI command string
// selects which of the four embedded programs is loaded into the
// first process slot. The per-process setup is an
// Init -> Load -> Install-stack sequence over `process::lifecycle`.

use crate::config::USER_CODE_BASE;
use crate::loader::EmbeddedLoader;
use crate::process::{dispatch, embedded_programs, lifecycle, scheduler, PROCESSES};
use crate::serial_println;

/// The real bootloader's command-line string isn't part of the
/// `bootloader_api` contract this build targets. Until that plumbing
/// exists, this constant stands in for it; `program_for_cli` already
/// treats any unrecognized value as falling through to `test`.
const BOOT_CLI: &str = "test";

/// First process id this kernel ever hands out. Slot 0 is permanently
/// free, so boot always starts at 1.
const FIRST_PID: u32 = 1;

/// Creates the first process: a fresh root, the CLI-selected program
/// loaded into it, and a stack installed at the top of its address
/// space. Returns the pid so the caller can hand control to it.
pub fn init_all() -> u32 {
    let loader = EmbeddedLoader { programs: &*embedded_programs::PROGRAMS };
    let program = embedded_programs::program_for_cli(BOOT_CLI);
    let pid = FIRST_PID;

    lifecycle::init(pid).expect("init: failed to create root page table for first process");
    lifecycle::load(pid, program, &loader).expect("init: failed to load program image");

    // The embedded loader always places a program's entry point at the
    // fixed user code base — the virtual side is fixed too, since this
    // kernel never relocates.
    lifecycle::install_stack(pid, USER_CODE_BASE).expect("init: failed to install user stack");

    serial_println!("init: pid {} running program #{}", pid, program);
    pid
}

/// Captures the kernel's own root (whatever CR3 already holds, coming
/// out of the bootloader) as the trap dispatcher's reference point, then
/// drops into the first process for the very first time. Never returns.
pub fn start_first(pid: u32) -> ! {
    dispatch::set_kernel_root(crate::memory::page_table::PageTable::from_current());
    scheduler::set_current_pid(pid);

    PROCESSES.with_lock(|slots| {
        if let Some(root) = slots[pid as usize].root.as_ref() {
            unsafe { root.activate() };
        }
    });

    let tf = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe);
    dispatch::enter_user_mode(&tf)
}
