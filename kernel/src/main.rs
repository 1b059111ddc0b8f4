// Plain `#![no_std]`/`#![no_main]` would also apply to `cargo test` builds,
// which need `std`'s test harness and a normal host entry point to run the
// handful of pure-logic unit tests under `process`/`memory` — gate both on
// `not(test)`, the standard way a `no_std` binary stays host-testable.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(abi_x86_interrupt)]

mod config;
mod console;
mod init;
mod interrupts;
mod keyboard;
mod loader;
mod memory;
mod panic;
mod pit;
mod process;
mod serial;

#[cfg(not(test))]
use bootloader_api::{BootInfo, BootloaderConfig, config::Mapping, entry_point};

#[cfg(not(test))]
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

#[cfg(not(test))]
entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

#[cfg(not(test))]
fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    init::boot(boot_info)
}

/// `cargo test` links this crate as an ordinary host binary; `entry_point!`
/// above only exists for the real `not(test)` bare-metal build, so the host
/// build needs its own, otherwise-unused `main`.
#[cfg(test)]
fn main() {}
