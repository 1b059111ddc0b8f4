// kernel/src/process/mod.rs
//
// The process descriptor and the fixed-size process table. The
// descriptor carries only what this kernel actually needs per process
// — no `Context`, no heap-allocated kernel stack (a single shared
// kernel stack via `tss::init` suffices, since the kernel never runs
// two processes concurrently), no `PrivilegeLevel` (every process here
// is a ring-3 process). The table itself is a fixed `[Process; NPROC]`
// array rather than a heap-backed queue, with slot 0 permanently free.

pub mod dispatch;
pub mod embedded_programs;
pub mod lifecycle;
pub mod scheduler;
pub mod syscall;
pub mod trapframe;
pub mod tss;

use spin::Mutex;

use crate::config::NPROC;
use crate::memory::page_table::PageTable;
use trapframe::TrapFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Free,
    Runnable,
    Broken,
}

/// Process Control Block: pid, state, saved register frame, root page
/// table, the two break pointers that bound the demand-paged heap
/// window, and the display-enable flag toggled by `mem_tog`.
pub struct Process {
    pub pid: u32,
    pub state: ProcessState,
    pub trapframe: TrapFrame,
    pub root: Option<PageTable>,
    pub original_break: u64,
    pub program_break: u64,
    pub display_enabled: bool,
}

impl Process {
    const fn empty(pid: u32) -> Self {
        Self {
            pid,
            state: ProcessState::Free,
            trapframe: TrapFrame {
                rax: 0, rbx: 0, rcx: 0, rdx: 0, rsi: 0, rdi: 0, rbp: 0,
                r8: 0, r9: 0, r10: 0, r11: 0, r12: 0, r13: 0, r14: 0, r15: 0,
                rip: 0, cs: 0, rflags: 0, rsp: 0, ss: 0,
            },
            root: None,
            original_break: 0,
            program_break: 0,
            display_enabled: true,
        }
    }

    pub fn heap_window(&self) -> core::ops::Range<u64> {
        self.original_break..self.program_break
    }
}

struct ProcessTableInner {
    slots: [Process; NPROC],
}

pub struct ProcessTable {
    inner: Mutex<ProcessTableInner>,
}

impl ProcessTable {
    /// pid 0 is permanently free, reserved as a sentinel so a
    /// `pid: u32` of 0 can mean "no process" without an `Option` at
    /// call sites that need a bare number (e.g. the `fork` syscall's
    /// parent-side return value).
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut [Process; NPROC]) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner.slots)
    }

    /// Raw pointer to `pid`'s saved register frame, for the trap entry
    /// stubs to restore from and `iretq` into (`process::dispatch`).
    /// Sound only because the kernel runs to completion between
    /// user-mode resumptions: nothing else touches this memory while a
    /// stub is mid-restore, so the pointer can safely outlive the lock
    /// guard that produced it.
    pub fn trapframe_ptr(&self, pid: u32) -> *const TrapFrame {
        let inner = self.inner.lock();
        &inner.slots[pid as usize].trapframe as *const TrapFrame
    }
}

macro_rules! empty_table {
    () => {{
        const EMPTY: Process = Process::empty(0);
        let mut slots = [EMPTY; NPROC];
        let mut i = 0;
        while i < NPROC {
            slots[i] = Process::empty(i as u32);
            i += 1;
        }
        slots
    }};
}

pub static PROCESSES: ProcessTable = ProcessTable {
    inner: Mutex::new(ProcessTableInner { slots: empty_table!() }),
};
