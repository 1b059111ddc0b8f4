// kernel/src/process/syscall.rs
//
// System-call handlers entered through the push-all assembly stub in
// `process::dispatch`. Ten calls: getpid, fork, exit, yield, brk,
// sbrk, page_alloc, panic, mapping, mem_tog.

use x86_64::VirtAddr;

use crate::config::{PAGE_SIZE, PANIC_MSG_MAX, USER_ADDR_TOP};
use crate::memory::frame_table::{self, Owner};
use crate::memory::page_table::{Lookup, PageTable, Permissions};
use crate::process::{ProcessState, PROCESSES};

/// Syscall numbers. Must match `useralloc::syscalls` and
/// `process::embedded_programs`'s hand-assembled test programs exactly.
pub mod numbers {
    pub const GETPID: u64 = 0;
    pub const FORK: u64 = 1;
    pub const EXIT: u64 = 2;
    pub const YIELD: u64 = 3;
    pub const BRK: u64 = 4;
    pub const SBRK: u64 = 5;
    pub const PAGE_ALLOC: u64 = 6;
    pub const PANIC: u64 = 7;
    pub const MAPPING: u64 = 8;
    pub const MEM_TOG: u64 = 9;
}

/// What the dispatcher should do once a syscall handler returns.
pub enum Outcome {
    /// The process is still runnable; resume it directly.
    Resume,
    /// The process yielded, exited, or broke; reschedule.
    Reschedule,
}

/// The wire format `mapping(dst, va)` writes into the caller's buffer:
/// the same three facts `memory::page_table::Lookup` carries, in a
/// fixed C-compatible layout a user process can read back without
/// needing this crate's enum.
#[repr(C)]
pub struct MappingRecord {
    pub present: u64,
    pub physical_addr: u64,
    pub writable: u64,
    pub user: u64,
}

/// Dispatch one `int 0x80` syscall for `pid`, whose saved registers are
/// `current.trapframe`. Every syscall routes through this single
/// vector, keyed on `rax` as the call number, with the rest of its
/// arguments in general-purpose registers in a fixed order.
pub fn dispatch(pid: u32) -> Outcome {
    let call = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rax);

    match call {
        numbers::GETPID => {
            PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rax = pid as u64);
            Outcome::Resume
        }
        numbers::YIELD => Outcome::Reschedule,
        numbers::FORK => {
            // `lifecycle::fork` already sets the parent's rax to the
            // child pid on success; on failure it never touches it, so
            // set -1 explicitly here.
            if super::lifecycle::fork(pid).is_err() {
                PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rax = u64::MAX);
            }
            Outcome::Resume
        }
        numbers::EXIT => {
            super::lifecycle::exit(pid);
            Outcome::Reschedule
        }
        numbers::BRK => {
            let target = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rdi);
            let result = set_break(pid, target);
            PROCESSES.with_lock(|slots| {
                slots[pid as usize].trapframe.rax = if result.is_ok() { 0 } else { u64::MAX };
            });
            Outcome::Resume
        }
        numbers::SBRK => {
            let delta = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rdi) as i64;
            let old_break = PROCESSES.with_lock(|slots| slots[pid as usize].program_break);
            let target = old_break.wrapping_add(delta as u64);
            let result = set_break(pid, target);
            PROCESSES.with_lock(|slots| {
                slots[pid as usize].trapframe.rax = if result.is_ok() { old_break } else { u64::MAX };
            });
            Outcome::Resume
        }
        numbers::PAGE_ALLOC => {
            let va = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rdi);
            let result = page_alloc(pid, va);
            PROCESSES.with_lock(|slots| {
                slots[pid as usize].trapframe.rax = if result.is_ok() { 0 } else { u64::MAX };
            });
            Outcome::Resume
        }
        numbers::PANIC => {
            let msg_ptr = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rdi);
            do_panic(pid, msg_ptr); // never returns
        }
        numbers::MAPPING => {
            let (dst, va) = PROCESSES.with_lock(|slots| {
                let tf = &slots[pid as usize].trapframe;
                (tf.rdi, tf.rsi)
            });
            do_mapping(pid, dst, va);
            Outcome::Resume
        }
        numbers::MEM_TOG => {
            let target = PROCESSES.with_lock(|slots| slots[pid as usize].trapframe.rdi) as u32;
            do_mem_tog(pid, target);
            Outcome::Resume
        }
        _ => {
            crate::serial_println!("syscall: pid {} unknown call number {}", pid, call);
            PROCESSES.with_lock(|slots| slots[pid as usize].state = ProcessState::Broken);
            Outcome::Reschedule
        }
    }
}

/// `brk`/`sbrk` shared tail: move `program_break` to `target`, unmapping
/// and releasing pages on shrink. Growing only moves the boundary —
/// actual frames are installed on first touch by the page-fault handler.
fn set_break(pid: u32, target: u64) -> Result<(), ()> {
    let (original_break, old_break) =
        PROCESSES.with_lock(|slots| (slots[pid as usize].original_break, slots[pid as usize].program_break));

    if target < original_break || target >= USER_ADDR_TOP - PAGE_SIZE {
        return Err(());
    }

    if target < old_break {
        let shrink_start = round_up(target);
        let shrink_end = round_up(old_break);
        let mut va = shrink_start;
        while va < shrink_end {
            PROCESSES.with_lock(|slots| {
                if let Some(root) = slots[pid as usize].root.as_ref() {
                    if let Some(frame_no) = unsafe { root.unmap(VirtAddr::new(va)) } {
                        frame_table::release(frame_table::frame_addr(frame_no));
                    }
                }
            });
            va += PAGE_SIZE;
        }
    }

    PROCESSES.with_lock(|slots| slots[pid as usize].program_break = target);
    Ok(())
}

fn round_up(addr: u64) -> u64 {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_snaps_to_next_page_boundary() {
        assert_eq!(round_up(0), 0);
        assert_eq!(round_up(1), PAGE_SIZE);
        assert_eq!(round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(round_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }
}

/// `page_alloc(va)` — allocate a user-owned frame and map it
/// writable/user at `va`, outside of the normal demand-paging path.
fn page_alloc(pid: u32, va: u64) -> Result<(), &'static str> {
    if va % PAGE_SIZE != 0 {
        return Err("syscall: page_alloc address not page-aligned");
    }
    let frame = frame_table::allocate_for(Owner::Process(pid)).ok_or("syscall: out of physical frames")?;
    unsafe { PageTable::zero_frame(frame) };

    PROCESSES
        .with_lock(|slots| -> Result<(), &'static str> {
            let root = slots[pid as usize].root.as_ref().ok_or("syscall: process has no root")?;
            unsafe { root.map(VirtAddr::new(va), frame, PAGE_SIZE, Permissions::READ_WRITE_USER) }
        })
        .inspect_err(|_| frame_table::release(frame))
}

/// `panic(msg_ptr)` — copy up to `PANIC_MSG_MAX` bytes starting at the
/// caller's pointer into a kernel-local buffer and halt with it,
/// mirroring `exception()`'s `INT_SYS_PANIC` arm. A null or unmapped
/// pointer panics with no message rather than faulting again.
fn do_panic(pid: u32, msg_ptr: u64) -> ! {
    let mut buf = [0u8; PANIC_MSG_MAX];
    let mut len = 0usize;

    if msg_ptr != 0 {
        PROCESSES.with_lock(|slots| {
            if let Some(root) = slots[pid as usize].root.as_ref() {
                len = read_user_bytes(root, msg_ptr, &mut buf);
            }
        });
    }

    let msg = core::str::from_utf8(&buf[..len]).unwrap_or("<panic message not valid utf8>");
    crate::serial_println_raw!("process {} called panic(): {}", pid, msg);
    panic!("user process {} panicked: {}", pid, msg);
}

/// Reads up to `out.len()` bytes starting at `va` from `root`'s address
/// space, stopping at the first unmapped page or embedded NUL. The
/// message may span at most two pages.
fn read_user_bytes(root: &PageTable, va: u64, out: &mut [u8]) -> usize {
    let offset = crate::memory::physical_memory_offset();
    let mut copied = 0usize;
    let mut cursor = va;

    while copied < out.len() {
        let page_va = VirtAddr::new(cursor & !(PAGE_SIZE - 1));
        let frame = match root.lookup(page_va) {
            Lookup::Present { frame, .. } => frame,
            Lookup::Absent => break,
        };
        let page_off = (cursor - page_va.as_u64()) as usize;
        let in_page = (PAGE_SIZE as usize - page_off).min(out.len() - copied);
        let src = unsafe { (offset + frame.as_u64()).as_ptr::<u8>().add(page_off) };
        let chunk = unsafe { core::slice::from_raw_parts(src, in_page) };

        if let Some(nul_at) = chunk.iter().position(|&b| b == 0) {
            out[copied..copied + nul_at].copy_from_slice(&chunk[..nul_at]);
            copied += nul_at;
            break;
        }
        out[copied..copied + in_page].copy_from_slice(chunk);
        copied += in_page;
        cursor += in_page as u64;
    }
    copied
}

/// `mapping(dst, va)` — write the lookup record for `va` into the
/// buffer at `dst`, after verifying `dst` is user-writable at both its
/// start and end byte (Open Question 2: both probes use write+user,
/// unlike the original's inconsistent end-of-buffer check).
fn do_mapping(pid: u32, dst: u64, va: u64) {
    PROCESSES.with_lock(|slots| {
        let root = match slots[pid as usize].root.as_ref() {
            Some(r) => r,
            None => return,
        };

        if !writable_user(root, dst) {
            return;
        }
        let end = dst + core::mem::size_of::<MappingRecord>() as u64 - 1;
        if page_of(end) != page_of(dst) && !writable_user(root, end) {
            return;
        }

        let record = match root.lookup(VirtAddr::new(va)) {
            Lookup::Present { frame, writable, user } => {
                MappingRecord { present: 1, physical_addr: frame.as_u64(), writable: writable as u64, user: user as u64 }
            }
            Lookup::Absent => MappingRecord { present: 0, physical_addr: 0, writable: 0, user: 0 },
        };

        let bytes = unsafe {
            core::slice::from_raw_parts(
                &record as *const MappingRecord as *const u8,
                core::mem::size_of::<MappingRecord>(),
            )
        };
        let page_off = (dst & (PAGE_SIZE - 1)) as usize;
        let in_first_page = (PAGE_SIZE as usize - page_off).min(bytes.len());

        if let Lookup::Present { frame: dst_frame, .. } = root.lookup(VirtAddr::new(dst)) {
            unsafe { PageTable::write_frame(dst_frame, page_off, &bytes[..in_first_page]) };
        }

        // The record may straddle the page boundary; the tail goes
        // through whichever frame backs the next page, not the one
        // backing `dst`.
        if in_first_page < bytes.len() {
            if let Lookup::Present { frame: tail_frame, .. } = root.lookup(VirtAddr::new(page_of(dst) + PAGE_SIZE)) {
                unsafe { PageTable::write_frame(tail_frame, 0, &bytes[in_first_page..]) };
            }
        }
    });
}

fn page_of(addr: u64) -> u64 {
    addr & !(PAGE_SIZE - 1)
}

fn writable_user(root: &PageTable, addr: u64) -> bool {
    matches!(root.lookup(VirtAddr::new(page_of(addr))), Lookup::Present { writable: true, user: true, .. })
}

/// `mem_tog(pid)` — toggle the caller's own `display_enabled` flag if
/// `pid == 0` or `pid == caller`; toggling a *different* pid is a
/// silent no-op.
fn do_mem_tog(pid: u32, target: u32) {
    PROCESSES.with_lock(|slots| {
        if target == 0 || target == pid {
            let flag = slots[pid as usize].display_enabled;
            slots[pid as usize].display_enabled = !flag;
        }
    });
}
