// kernel/src/panic.rs

use core::panic::PanicInfo;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    unsafe { core::arch::asm!("cli"); }

    crate::serial_println_raw!("================ KERNEL PANIC ================");
    if let Some(location) = info.location() {
        crate::serial_println_raw!("  at {}:{}:{}", location.file(), location.line(), location.column());
    }
    crate::serial_println_raw!("  {}", info.message());
    crate::serial_println_raw!("================================================");

    loop {
        unsafe { core::arch::asm!("hlt"); }
    }
}
