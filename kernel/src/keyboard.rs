// kernel/src/keyboard.rs
//
// PS/2 scancode capture, trimmed to what the core actually consumes: a
// non-blocking check for Ctrl-C (the scheduler's external exit signal,
// §4.4 / §6's "keyboard-check that returns control-C as an exit signal").
// The keyboard IRQ handler still buffers raw characters so the check has
// something to look at; interpreting other keys is out of scope.

const BUFFER_SIZE: usize = 128;
static mut KEY_BUFFER: [Option<u8>; BUFFER_SIZE] = [None; BUFFER_SIZE];
static mut BUFFER_READ_INDEX: usize = 0;
static mut BUFFER_WRITE_INDEX: usize = 0;

const CTRL_C: u8 = 0x03;

fn add_to_buffer(c: u8) {
    unsafe {
        let next_write_index = (BUFFER_WRITE_INDEX + 1) % BUFFER_SIZE;
        if next_write_index != BUFFER_READ_INDEX {
            KEY_BUFFER[BUFFER_WRITE_INDEX] = Some(c);
            BUFFER_WRITE_INDEX = next_write_index;
        }
    }
}

fn take_from_buffer() -> Option<u8> {
    unsafe {
        if BUFFER_READ_INDEX == BUFFER_WRITE_INDEX {
            return None;
        }
        let key = KEY_BUFFER[BUFFER_READ_INDEX].take();
        BUFFER_READ_INDEX = (BUFFER_READ_INDEX + 1) % BUFFER_SIZE;
        key
    }
}

/// Called from the keyboard IRQ handler with the raw scancode.
pub fn process_scancode(scancode: u8) {
    if scancode >= 0x80 {
        return; // key release
    }
    if let Some(c) = scancode_to_control_char(scancode) {
        add_to_buffer(c);
    }
}

/// Minimal Set-1 mapping: only the keys the exit-signal check cares about.
fn scancode_to_control_char(scancode: u8) -> Option<u8> {
    match scancode {
        0x2E => Some(CTRL_C), // 'c' — combined with held Ctrl by the hardware driver out of scope
        _ => None,
    }
}

/// Non-blocking poll used by the scheduler's idle spin (§4.4).
/// Returns true once if a Ctrl-C has been observed since the last check.
pub fn check_keyboard_exit_signal() -> bool {
    while let Some(c) = take_from_buffer() {
        if c == CTRL_C {
            return true;
        }
    }
    false
}
