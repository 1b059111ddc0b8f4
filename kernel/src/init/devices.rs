// kernel/src/init/devices.rs
//
// IDT construction and PIC/PIT bring-up. Every vector that can
// transition a process —
// timer, syscall, page fault, and the "other" bucket (divide-by-zero,
// invalid opcode, general protection) — is routed to one of
// `process::dispatch`'s raw entry stubs. Double fault is unrecoverable
// by construction and keyboard never touches process state, so both
// stay plain `extern "x86-interrupt"` handlers that never need a full
// register capture.

use spin::Once;

use crate::interrupts::exception::ExceptionStackFrame;
use crate::interrupts::idt::InterruptDescriptorTable;
use crate::process::dispatch;
use crate::{keyboard, serial_println};

static IDT: Once<InterruptDescriptorTable> = Once::new();

pub fn init_idt() {
    IDT.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();

        idt.add_raw_handler(0, dispatch::divide_by_zero_entry as u64);
        idt.add_raw_handler(6, dispatch::invalid_opcode_entry as u64);

        // IST index is 1-based in the IDT entry. TSS defines
        // DOUBLE_FAULT_IST_INDEX = 0 (array index), so CPU IST = 0 + 1 = 1.
        idt.add_double_fault_handler(
            8,
            double_fault_handler,
            (crate::process::tss::DOUBLE_FAULT_IST_INDEX + 1) as u16,
        );

        idt.add_raw_handler(13, dispatch::general_protection_entry as u64);
        idt.add_raw_handler(14, dispatch::page_fault_entry as u64);
        idt.add_raw_handler(32, dispatch::timer_entry as u64);
        idt.add_handler(33, keyboard_interrupt_handler);

        // DPL 3: the only gate a ring-3 `int 0x80` may reach.
        idt.add_raw_handler(0x80, dispatch::syscall_entry as u64)
            .set_privilege_level(3);

        idt
    });
}

fn load_idt() {
    IDT.get().unwrap().load();
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_: &mut ExceptionStackFrame) {
    let scancode = unsafe { x86_64::instructions::port::PortReadOnly::<u8>::new(0x60).read() };
    keyboard::process_scancode(scancode);
    crate::interrupts::pic::end_of_interrupt(crate::interrupts::pic::Irq::Keyboard.as_u8());
}

/// Double fault has no recovery path in this kernel: whatever process
/// was running, the saved frame that would be needed to resume or
/// switch away from it can no longer be trusted.
extern "x86-interrupt" fn double_fault_handler(sf: &mut ExceptionStackFrame, error_code: u64) -> ! {
    panic!(
        "DOUBLE FAULT (error {:#x}) at {:#x}",
        error_code, sf.instruction_pointer
    );
}

/// PIC remap + unmask (timer, keyboard), PIT programming, IDT load.
pub fn init_hardware_interrupts() {
    crate::interrupts::pic::initialize();
    crate::interrupts::pic::enable_irq(0);
    crate::interrupts::pic::enable_irq(1);
    load_idt();

    crate::pit::init(crate::config::HZ);
    serial_println!("devices: IDT loaded, PIC remapped, PIT at {} Hz", crate::config::HZ);
}
