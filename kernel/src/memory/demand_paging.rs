// kernel/src/memory/demand_paging.rs
//
// The page-fault handler's three-case policy:
//   1. kernel-mode fault             → caller panics (never recoverable here)
//   2. user fault, absent, in the
//      process's heap window        → allocate + zero + map
//   3. anything else                → the process is marked Broken
//
// CR2 read, error-code pre-filter, and frame-allocate-zero-map sequence
// checked against the process's `[original_break, program_break)`
// window — every demand-paged page in this kernel is anonymous heap,
// so there's no VMA kind to branch on here.

use x86_64::{PhysAddr, VirtAddr};

use crate::memory::frame_table::{self, Owner};
use crate::memory::page_table::{PageTable, Permissions};

const PF_PRESENT: u64 = 1 << 0;
const PF_USER: u64 = 1 << 2;
const PF_RESERVED: u64 = 1 << 3;

#[inline]
pub fn read_cr2() -> u64 {
    let addr: u64;
    unsafe { core::arch::asm!("mov {}, cr2", out(reg) addr) };
    addr
}

pub enum Fault {
    /// Not the user layer's problem: the dispatcher panics on this.
    KernelMode,
    /// A not-present fault inside `[original_break, program_break)`,
    /// successfully backed by a freshly zeroed frame.
    Resolved,
    /// Anything else a user process can trigger: protection violation
    /// on a present page, or a not-present fault outside the heap
    /// window. The process is marked Broken, not killed outright.
    Broken(&'static str),
}

/// Classify and, where possible, resolve a page fault.
///
/// `error_code` is the CPU-pushed error code; `root` is the faulting
/// process's page table; `heap_window` is `[original_break,
/// program_break)` read from its process descriptor.
pub fn handle(
    fault_addr: u64,
    error_code: u64,
    root: &PageTable,
    pid: u32,
    heap_window: core::ops::Range<u64>,
) -> Fault {
    if error_code & PF_USER == 0 {
        return Fault::KernelMode;
    }
    if error_code & PF_RESERVED != 0 {
        return Fault::Broken("reserved page-table bit set");
    }
    if error_code & PF_PRESENT != 0 {
        return Fault::Broken("protection violation on a present page");
    }
    if !heap_window.contains(&fault_addr) {
        return Fault::Broken("fault outside the process's heap window");
    }

    // Racing satisfaction: impossible with a single core and no kernel
    // preemption, but the policy calls for checking anyway rather than
    // assuming the fault is still unresolved.
    let page_addr = VirtAddr::new(fault_addr & !0xFFF);
    if let crate::memory::page_table::Lookup::Present { .. } = root.lookup(page_addr) {
        return Fault::Resolved;
    }

    match allocate_and_map(root, fault_addr, pid) {
        Ok(()) => Fault::Resolved,
        Err(reason) => Fault::Broken(reason),
    }
}

fn allocate_and_map(root: &PageTable, fault_addr: u64, pid: u32) -> Result<(), &'static str> {
    let frame = frame_table::allocate_for(Owner::Process(pid)).ok_or("out of physical frames")?;

    unsafe {
        PageTable::zero_frame(frame);
        let page_addr = VirtAddr::new(fault_addr & !0xFFF);
        root.map(page_addr, frame, crate::config::PAGE_SIZE, Permissions::READ_WRITE_USER)
            .inspect_err(|_| frame_table::release(frame))?;
    }

    crate::serial_println!(
        "demand_paging: pid {} fault at {:#x} -> frame {:#x}",
        pid,
        fault_addr,
        frame_no_addr(frame),
    );
    Ok(())
}

fn frame_no_addr(addr: PhysAddr) -> u64 {
    addr.as_u64()
}
