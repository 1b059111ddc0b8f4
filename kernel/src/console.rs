// kernel/src/console.rs
//
// The console itself (rendering, cursor, scrolling) lives outside this
// crate — treated here as a write sink at a fixed memory-mapped
// address. What this module owns is naming that address and installing
// the one mapping that must be identical and user-readable across
// every process: a grid of 16-bit cells at a fixed physical address.

use x86_64::{PhysAddr, VirtAddr};

use crate::config::{CONSOLE_PHYS_ADDR, CONSOLE_SIZE_BYTES, CONSOLE_VIRT_ADDR};
use crate::memory::frame_table::Owner;
use crate::memory::page_table::{PageTable, Permissions};

/// Physical frame backing the console cell grid.
pub fn physical_frame() -> PhysAddr {
    PhysAddr::new(CONSOLE_PHYS_ADDR)
}

/// Install the fixed read-only console mapping into a process's root.
/// Called once during `process::lifecycle::init` for every process — the
/// mapping points at the same reserved frame in every address space, so
/// no frame is allocated or its refcount touched beyond the single
/// `Owner::Reserved` record created at `frame_table::init`.
pub unsafe fn map_into(root: &PageTable) -> Result<(), &'static str> {
    root.map(
        VirtAddr::new(CONSOLE_VIRT_ADDR),
        physical_frame(),
        CONSOLE_SIZE_BYTES,
        Permissions::READ_ONLY_USER,
    )
}

/// Owner tag the frame table records for the console page at `Initialize`.
pub const OWNER: Owner = Owner::Reserved;
