// kernel/src/process/lifecycle.rs
//
// Init / Load / Install-stack / Fork / Exit: the five operations that
// take a process slot from empty to runnable and back. The kernel-half
// PML4 copy lives in `PageTable::new_user`; this module wraps it with
// the allocate-copy-install shape `process_setup`/`process_fork` need.

use x86_64::{PhysAddr, VirtAddr};

use crate::config::{PAGE_SIZE, USER_STACK_PAGE};
use crate::console;
use crate::loader::ProgramLoader;
use crate::memory::frame_table::{self, Owner};
use crate::memory::page_table::{Permissions, PageTable};
use crate::process::trapframe::TrapFrame;
use crate::process::tss::get_user_selectors;
use crate::process::{ProcessState, PROCESSES};

/// Init(pid) — a fresh root with the kernel half already mapped, plus
/// the one mapping every process shares unconditionally: the console
/// page.
pub fn init(pid: u32) -> Result<(), &'static str> {
    let root = unsafe { PageTable::new_user(pid)? };
    unsafe { console::map_into(&root)? };

    PROCESSES.with_lock(|slots| {
        let slot = &mut slots[pid as usize];
        slot.root = Some(root);
        slot.original_break = 0;
        slot.program_break = 0;
        slot.display_enabled = true;
        Ok(())
    })
}

/// Load(pid, program) — delegate to the external loader; record the
/// break window it reports.
pub fn load(pid: u32, program: u32, loader: &dyn ProgramLoader) -> Result<(), &'static str> {
    let image = PROCESSES.with_lock(|slots| -> Result<_, &'static str> {
        let root = slots[pid as usize].root.as_ref().ok_or("lifecycle: process has no root")?;
        loader.load(pid, root, program)
    })?;

    PROCESSES.with_lock(|slots| {
        let slot = &mut slots[pid as usize];
        slot.original_break = image.original_break;
        slot.program_break = image.program_break;
    });
    Ok(())
}

/// Install-stack(pid) — one user-writable frame at the top of the
/// address space; saved `rsp` points at its top.
pub fn install_stack(pid: u32, entry_point: u64) -> Result<(), &'static str> {
    let frame = frame_table::allocate_for(Owner::Process(pid)).ok_or("lifecycle: out of physical frames")?;
    unsafe { PageTable::zero_frame(frame) };

    let (user_cs, user_ss) = get_user_selectors();

    PROCESSES.with_lock(|slots| -> Result<(), &'static str> {
        let slot = &mut slots[pid as usize];
        let root = slot.root.as_ref().ok_or("lifecycle: process has no root")?;
        unsafe {
            root.map(VirtAddr::new(USER_STACK_PAGE), frame, PAGE_SIZE, Permissions::READ_WRITE_USER)?;
        }
        let stack_top = USER_STACK_PAGE + PAGE_SIZE;
        slot.trapframe = TrapFrame::new_user(entry_point, stack_top, user_cs.0 as u64, user_ss.0 as u64);
        slot.state = ProcessState::Runnable;
        Ok(())
    })
}

/// Fork(parent) — copies every user-accessible leaf mapping
/// unconditionally (no copy-on-write, no sharing) except the console
/// page, which both address spaces already map to the same reserved
/// frame by construction.
pub fn fork(parent: u32) -> Result<u32, &'static str> {
    let child = PROCESSES.with_lock(|slots| {
        slots.iter().skip(1).position(|s| s.state == ProcessState::Free).map(|i| i as u32 + 1)
    }).ok_or("lifecycle: no free process slot")?;

    if let Err(e) = init(child) {
        return Err(e);
    }

    let copy_result = copy_user_mappings(parent, child);
    if let Err(e) = copy_result {
        cleanup_partial(child);
        return Err(e);
    }

    PROCESSES.with_lock(|slots| {
        let parent_tf = slots[parent as usize].trapframe;
        let parent_break = (slots[parent as usize].original_break, slots[parent as usize].program_break);

        let mut child_tf = parent_tf;
        child_tf.rax = 0;
        slots[child as usize].trapframe = child_tf;
        slots[child as usize].original_break = parent_break.0;
        slots[child as usize].program_break = parent_break.1;
        slots[child as usize].state = ProcessState::Runnable;

        slots[parent as usize].trapframe.rax = child as u64;
    });

    Ok(child)
}

/// Copies every user-accessible leaf in the parent's heap window, then
/// the user stack page separately — the stack sits at `USER_STACK_PAGE`,
/// far above `program_break`, so the heap scan below never reaches it,
/// and the child's copied trapframe has `rsp` pointing right into it.
fn copy_user_mappings(parent: u32, child: u32) -> Result<(), &'static str> {
    let program_break = PROCESSES.with_lock(|slots| slots[parent as usize].program_break);
    let mut va = 0u64;
    while va < program_break {
        copy_one_mapping(parent, child, va)?;
        va += PAGE_SIZE;
    }
    copy_one_mapping(parent, child, USER_STACK_PAGE)?;
    Ok(())
}

fn copy_one_mapping(parent: u32, child: u32, va: u64) -> Result<(), &'static str> {
    let lookup = PROCESSES.with_lock(|slots| slots[parent as usize].root.as_ref().unwrap().lookup(VirtAddr::new(va)));
    if let crate::memory::page_table::Lookup::Present { frame, writable, .. } = lookup {
        if frame != console::physical_frame() {
            let new_frame = frame_table::allocate_for(Owner::Process(child)).ok_or("lifecycle: out of physical frames during fork")?;
            let perm = if writable { Permissions::READ_WRITE_USER } else { Permissions::READ_ONLY_USER };
            unsafe { copy_frame(frame, new_frame) };
            PROCESSES.with_lock(|slots| unsafe {
                slots[child as usize].root.as_ref().unwrap().map(VirtAddr::new(va), new_frame, PAGE_SIZE, perm)
            })?;
        }
    }
    Ok(())
}

unsafe fn copy_frame(src: PhysAddr, dst: PhysAddr) {
    let offset = crate::memory::physical_memory_offset();
    let src_ptr = (offset + src.as_u64()).as_ptr::<u8>();
    let dst_ptr = (offset + dst.as_u64()).as_mut_ptr::<u8>();
    core::ptr::copy_nonoverlapping(src_ptr, dst_ptr, PAGE_SIZE as usize);
}

fn cleanup_partial(pid: u32) {
    exit(pid);
}

/// Exit(pid) — release every user-owned leaf, then every interior
/// table that only this process's mappings reference, then the root.
/// Walks the two user-owned PML4 slots directly rather than going
/// through `PageTable::unmap` page by page, since the leaf-release
/// loop in the earlier design left the PDPT/PD/PT frames behind.
pub fn exit(pid: u32) {
    PROCESSES.with_lock(|slots| {
        let slot = &mut slots[pid as usize];
        if let Some(root) = slot.root.take() {
            unsafe { release_user_subtree(root.root_phys()) };
            frame_table::release(root.root_phys());
        }
        slot.state = ProcessState::Free;
        slot.original_break = 0;
        slot.program_break = 0;
    });
}

/// Recursively release every frame under the user-owned PML4 slots of
/// `pml4_phys`: leaves first, then the interior tables that reach
/// them, bottom-up. The kernel-half entries (everything outside
/// `USER_PML4_ENTRIES`) are left untouched — they point at
/// kernel-owned frames this process never owned.
unsafe fn release_user_subtree(pml4_phys: PhysAddr) {
    use crate::memory::page_table::USER_PML4_ENTRIES;
    use x86_64::structures::paging::PageTable as RawPageTable;

    let offset = crate::memory::physical_memory_offset();
    let pml4: &RawPageTable = &*(offset + pml4_phys.as_u64()).as_ptr::<RawPageTable>();

    for &i in USER_PML4_ENTRIES.iter() {
        let entry = &pml4[i];
        if entry.is_unused() {
            continue;
        }
        release_table_level(entry.addr(), 3);
    }
}

/// `level` counts levels remaining above the leaf: 3 = PDPT, 2 = PD,
/// 1 = PT (whose entries are the 4 KiB leaves themselves).
unsafe fn release_table_level(table_phys: PhysAddr, level: u8) {
    use x86_64::structures::paging::PageTable as RawPageTable;

    let offset = crate::memory::physical_memory_offset();
    let table: &RawPageTable = &*(offset + table_phys.as_u64()).as_ptr::<RawPageTable>();

    for entry in table.iter() {
        if entry.is_unused() {
            continue;
        }
        if level > 1 {
            release_table_level(entry.addr(), level - 1);
        } else {
            frame_table::release(entry.addr());
        }
    }
    frame_table::release(table_phys);
}
