// kernel/src/init/mod.rs
//
// Boot orchestration, in the order the hardware actually requires it:
// record the bootloader's physical-memory offset, hand the memory map
// to the frame table, bring up the GDT/TSS and IDT/PIC/PIT, load the
// CLI-selected program into the first process slot, and drop into it.
// This core has no console driver or interactive shell of its own, so
// there's no framebuffer, repl, or shell-process step to run.

pub mod devices;
pub mod memory;
pub mod processes;

use bootloader_api::BootInfo;
use x86_64::VirtAddr;

use crate::process;
use crate::serial_println;

pub fn boot(boot_info: &'static mut BootInfo) -> ! {
    let phys_mem_offset = VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("bootloader did not map physical memory"),
    );
    memory::init_core(phys_mem_offset, &boot_info.memory_regions);

    process::tss::init();
    devices::init_idt();
    devices::init_hardware_interrupts();

    serial_println!("init: loading first process");
    let pid = processes::init_all();

    processes::start_first(pid)
}
