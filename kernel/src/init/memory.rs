// kernel/src/init/memory.rs
//
// Physical memory bring-up: record the bootloader's direct-physical-map
// offset, then hand its memory map to `memory::frame_table::init` so
// every frame in the machine has an owner before any process exists.

use bootloader_api::info::{MemoryRegionKind, MemoryRegions};
use x86_64::VirtAddr;

use crate::{memory, serial_println};

/// `MemoryRegionKind::Bootloader` covers the kernel image, its own page
/// tables, and the stack the bootloader handed control off on — the
/// closest this boot protocol has to separately tracked "kernel image"
/// and "kernel stack" ranges, both of which should end up `Kernel`-
/// owned. Both are passed the same combined span rather than inventing
/// a split this boot protocol doesn't report.
pub fn init_core(phys_mem_offset: VirtAddr, memory_regions: &'static MemoryRegions) {
    serial_println!(
        "memory: physical offset {:#x} (PML4 entry {})",
        phys_mem_offset.as_u64(),
        phys_mem_offset.as_u64() >> 39,
    );

    memory::init(phys_mem_offset);

    let mut kernel_start = u64::MAX;
    let mut kernel_end = 0u64;
    for region in memory_regions.iter() {
        if region.kind == MemoryRegionKind::Bootloader {
            kernel_start = kernel_start.min(region.start);
            kernel_end = kernel_end.max(region.end);
        }
    }
    if kernel_start > kernel_end {
        kernel_start = 0;
        kernel_end = 0;
    }

    memory::frame_table::init(memory_regions, kernel_start..kernel_end, kernel_start..kernel_end);
}
