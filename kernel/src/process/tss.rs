// kernel/src/process/tss.rs
//
// GDT and TSS setup: kernel code/data segments, user code/data segments
// (ring 3, needed for the `iretq` that drops into user mode), and one
// TSS carrying the double-fault IST stack and the RSP0 used whenever a
// trap lands from ring 3.

use x86_64::VirtAddr;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::structures::gdt::{GlobalDescriptorTable, Descriptor, SegmentSelector};
use lazy_static::lazy_static;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

/// Selector of the kernel code segment, fixed by the GDT layout below
/// (null, kernel code, kernel data, user data, user code, TSS). `idt.rs`
/// needs this as a plain constant rather than a runtime lookup, since
/// IDT entries are populated before any `GDT.1.code_selector` borrow
/// would be convenient to thread through.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

struct Selectors {
    code_selector: SegmentSelector,
    data_selector: SegmentSelector,
    user_code_selector: SegmentSelector,
    user_data_selector: SegmentSelector,
    tss_selector: SegmentSelector,
}

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();

        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            const STACK_SIZE: usize = 4096 * 5;
            static mut STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

            let stack_start = VirtAddr::from_ptr({ &raw const STACK });
            stack_start + STACK_SIZE as u64
        };

        // RSP0: the stack the CPU switches to on any ring3->ring0 trap,
        // including `int 0x80`.
        tss.privilege_stack_table[0] = {
            const STACK_SIZE: usize = 4096 * 5;
            static mut STACK: [u8; STACK_SIZE] = [0; STACK_SIZE];

            let stack_start = VirtAddr::from_ptr({ &raw const STACK });
            stack_start + STACK_SIZE as u64
        };

        tss
    };

    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();

        let code_selector = gdt.append(Descriptor::kernel_code_segment());
        let data_selector = gdt.append(Descriptor::kernel_data_segment());

        let user_data_selector = gdt.append(Descriptor::user_data_segment());
        let user_code_selector = gdt.append(Descriptor::user_code_segment());

        let tss_selector = gdt.append(Descriptor::tss_segment(&TSS));

        (gdt, Selectors {
            code_selector,
            data_selector,
            user_code_selector,
            user_data_selector,
            tss_selector,
        })
    };
}

/// Loads the GDT and TSS and reloads CS/DS from it.
pub fn init() {
    use x86_64::instructions::tables::load_tss;
    use x86_64::instructions::segmentation::{CS, DS, Segment};

    GDT.0.load();

    unsafe {
        CS::set_reg(GDT.1.code_selector);
        DS::set_reg(GDT.1.data_selector);
        load_tss(GDT.1.tss_selector);
    }

    debug_assert_eq!(GDT.1.code_selector.0, KERNEL_CODE_SELECTOR);

    crate::serial_println!("TSS and GDT initialized");
}

/// Ring3 code/data selectors, used to build the iret frame that drops a
/// freshly loaded process into user mode.
pub fn get_user_selectors() -> (SegmentSelector, SegmentSelector) {
    (GDT.1.user_code_selector, GDT.1.user_data_selector)
}
