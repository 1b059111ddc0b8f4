// kernel/src/process/dispatch.rs
//
// The trap dispatcher. One assembly entry per vector this kernel cares
// about, all converging on `common_trap_handler`, which copies the
// saved frame into the current process's descriptor, switches to the
// kernel root, classifies the trap, and hands back a pointer to
// whichever process's trapframe should run next.
//
// Each stub below is a push-all/call/restore shape: the handler
// returns the next `TrapFrame` pointer in `rax`. `r15` is pushed first
// and `rax` last, so the final stack image lines up with `TrapFrame`'s
// declared field order — the last push ends up at the lowest address,
// which is `TrapFrame`'s first field.
//
// Keyboard interrupts (vector 33) are not routed through here — the
// keyboard driver never marks a process Broken or reschedules, so it
// stays a plain `extern "x86-interrupt"` handler in `init::devices`
// that never needs a full register capture. Double fault (vector 8)
// is unrecoverable by construction and also stays a plain
// `extern "x86-interrupt"` handler that panics directly.

use core::arch::global_asm;

use spin::Once;

use crate::memory::demand_paging::{self, Fault};
use crate::memory::page_table::PageTable;
use crate::process::trapframe::TrapFrame;
use crate::process::{scheduler, syscall};
use crate::process::{ProcessState, PROCESSES};

pub const VECTOR_DIVIDE_BY_ZERO: u64 = 0;
pub const VECTOR_INVALID_OPCODE: u64 = 6;
pub const VECTOR_GENERAL_PROTECTION: u64 = 13;
pub const VECTOR_PAGE_FAULT: u64 = 14;
pub const VECTOR_TIMER: u64 = 32;
pub const VECTOR_SYSCALL: u64 = 0x80;

/// The kernel's own root page table, captured once at boot, so every
/// trap entry can switch the CPU back to it. Before any process exists
/// this is simply whatever root CR3 already holds coming out of the
/// bootloader.
static KERNEL_ROOT: Once<PageTable> = Once::new();

pub fn set_kernel_root(root: PageTable) {
    KERNEL_ROOT.call_once(|| root);
}

fn kernel_root() -> &'static PageTable {
    KERNEL_ROOT.get().expect("dispatch: kernel root not initialized")
}

/// Exact image the entry stubs below leave on the kernel stack: the
/// fifteen general-purpose registers in `TrapFrame`'s field order, the
/// trap vector, the hardware error code (0 for vectors that don't
/// carry one), and the five words the CPU itself pushes.
#[repr(C)]
struct RawTrapStack {
    rax: u64,
    rbx: u64,
    rcx: u64,
    rdx: u64,
    rsi: u64,
    rdi: u64,
    rbp: u64,
    r8: u64,
    r9: u64,
    r10: u64,
    r11: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    vector: u64,
    error_code: u64,
    rip: u64,
    cs: u64,
    rflags: u64,
    rsp: u64,
    ss: u64,
}

macro_rules! trap_stub {
    ($name:ident, $vector:literal) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            "push 0",
            concat!("push ", stringify!($vector)),
            "push r15", "push r14", "push r13", "push r12",
            "push r11", "push r10", "push r9", "push r8",
            "push rbp", "push rdi", "push rsi", "push rdx",
            "push rcx", "push rbx", "push rax",
            "mov rdi, rsp",
            "call common_trap_handler",
            "mov rsp, rax",
            "pop rax", "pop rbx", "pop rcx", "pop rdx",
            "pop rsi", "pop rdi", "pop rbp",
            "pop r8", "pop r9", "pop r10", "pop r11",
            "pop r12", "pop r13", "pop r14", "pop r15",
            "iretq",
        );
    };
    ($name:ident, $vector:literal, has_error_code) => {
        global_asm!(
            concat!(".global ", stringify!($name)),
            concat!(stringify!($name), ":"),
            concat!("push ", stringify!($vector)),
            "push r15", "push r14", "push r13", "push r12",
            "push r11", "push r10", "push r9", "push r8",
            "push rbp", "push rdi", "push rsi", "push rdx",
            "push rcx", "push rbx", "push rax",
            "mov rdi, rsp",
            "call common_trap_handler",
            "mov rsp, rax",
            "pop rax", "pop rbx", "pop rcx", "pop rdx",
            "pop rsi", "pop rdi", "pop rbp",
            "pop r8", "pop r9", "pop r10", "pop r11",
            "pop r12", "pop r13", "pop r14", "pop r15",
            "iretq",
        );
    };
}

trap_stub!(divide_by_zero_entry, 0);
trap_stub!(invalid_opcode_entry, 6);
trap_stub!(general_protection_entry, 13, has_error_code);
trap_stub!(page_fault_entry, 14, has_error_code);
trap_stub!(timer_entry, 32);
trap_stub!(syscall_entry, 0x80);

extern "C" {
    pub fn divide_by_zero_entry();
    pub fn invalid_opcode_entry();
    pub fn general_protection_entry();
    pub fn page_fault_entry();
    pub fn timer_entry();
    pub fn syscall_entry();
}

/// Called from every stub above with `rdi` pointing at the freshly
/// pushed `RawTrapStack`. Returns the address of the `TrapFrame` the
/// stub should restore from and `iretq` into — always a pointer into
/// `PROCESSES`, never back into the stack-resident `RawTrapStack`
/// (whose vector/error-code words don't belong in a `TrapFrame`).
#[no_mangle]
pub extern "C" fn common_trap_handler(raw: *mut RawTrapStack) -> *const TrapFrame {
    let image = unsafe { &*raw };
    let pid = scheduler::current_pid();

    PROCESSES.with_lock(|slots| {
        let tf = &mut slots[pid as usize].trapframe;
        tf.rax = image.rax;
        tf.rbx = image.rbx;
        tf.rcx = image.rcx;
        tf.rdx = image.rdx;
        tf.rsi = image.rsi;
        tf.rdi = image.rdi;
        tf.rbp = image.rbp;
        tf.r8 = image.r8;
        tf.r9 = image.r9;
        tf.r10 = image.r10;
        tf.r11 = image.r11;
        tf.r12 = image.r12;
        tf.r13 = image.r13;
        tf.r14 = image.r14;
        tf.r15 = image.r15;
        tf.rip = image.rip;
        tf.cs = image.cs;
        tf.rflags = image.rflags;
        tf.rsp = image.rsp;
        tf.ss = image.ss;
    });

    unsafe { kernel_root().activate() };

    // Observational and idempotent: draining the keyboard's exit-signal
    // buffer here as well as in the idle spin costs nothing and keeps
    // Ctrl-C responsive even under sustained load.
    let _ = crate::keyboard::check_keyboard_exit_signal();

    let next_pid = match image.vector {
        VECTOR_TIMER => {
            scheduler::tick();
            scheduler::schedule()
        }
        VECTOR_SYSCALL => match syscall::dispatch(pid) {
            syscall::Outcome::Resume => Some(pid),
            syscall::Outcome::Reschedule => scheduler::schedule(),
        },
        VECTOR_PAGE_FAULT => handle_page_fault(pid, image.error_code),
        _ => handle_other(pid, image.vector, image.cs),
    };

    match next_pid {
        Some(next) => {
            PROCESSES.with_lock(|slots| {
                if let Some(root) = slots[next as usize].root.as_ref() {
                    unsafe { root.activate() };
                }
            });
            PROCESSES.trapframe_ptr(next)
        }
        None => {
            crate::serial_println!("dispatch: no runnable process, halting");
            loop {
                unsafe { core::arch::asm!("cli", "hlt") };
            }
        }
    }
}

// The tail of `enter_user_mode_asm` below is deliberately identical to
// every `trap_stub!`'s restore sequence: `TrapFrame`'s field order is
// exactly what `RawTrapStack` looks like once the vector/error-code
// prefix and hardware-pushed quintet are peeled off, so pointing `rsp`
// straight at a `TrapFrame` and running the same pop/iretq tail works
// whether that frame came from a real trap or, as here, was built by
// hand for a process's very first run.
global_asm!(
    ".global enter_user_mode_asm",
    "enter_user_mode_asm:",
    "mov rsp, rdi",
    "pop rax", "pop rbx", "pop rcx", "pop rdx",
    "pop rsi", "pop rdi", "pop rbp",
    "pop r8", "pop r9", "pop r10", "pop r11",
    "pop r12", "pop r13", "pop r14", "pop r15",
    "iretq",
);

extern "C" {
    fn enter_user_mode_asm(tf: *const TrapFrame) -> !;
}

/// Drops into user mode for the very first time, from a trapframe
/// `process::lifecycle::install_stack` built directly rather than one
/// captured off a real trap. Never returns.
pub fn enter_user_mode(tf: &TrapFrame) -> ! {
    unsafe { enter_user_mode_asm(tf as *const TrapFrame) }
}

fn handle_page_fault(pid: u32, error_code: u64) -> Option<u32> {
    let fault_addr = demand_paging::read_cr2();
    let (root_ptr, heap_window) = PROCESSES.with_lock(|slots| {
        let slot = &slots[pid as usize];
        (slot.root.as_ref().map(|r| r as *const PageTable), slot.heap_window())
    });

    let root = match unsafe { root_ptr.as_ref() } {
        Some(r) => r,
        None => panic!("page fault on pid {} with no root page table", pid),
    };

    match demand_paging::handle(fault_addr, error_code, root, pid, heap_window) {
        Fault::KernelMode => panic!(
            "kernel-mode page fault at {:#x} (error {:#b})",
            fault_addr, error_code
        ),
        Fault::Resolved => Some(pid),
        Fault::Broken(reason) => {
            crate::serial_println!(
                "dispatch: pid {} broken on page fault at {:#x}: {}",
                pid, fault_addr, reason
            );
            PROCESSES.with_lock(|slots| slots[pid as usize].state = ProcessState::Broken);
            scheduler::schedule()
        }
    }
}

/// Any trap vector besides timer/syscall/page-fault: a kernel-mode
/// occurrence is unconditionally fatal, a user-mode one marks the
/// process Broken and reschedules.
fn handle_other(pid: u32, vector: u64, cs: u64) -> Option<u32> {
    if cs & 0x3 == 0 {
        panic!("unhandled kernel-mode trap, vector {}", vector);
    }
    crate::serial_println!("dispatch: pid {} broken on vector {}", pid, vector);
    PROCESSES.with_lock(|slots| slots[pid as usize].state = ProcessState::Broken);
    scheduler::schedule()
}
