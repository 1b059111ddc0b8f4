// kernel/src/process/scheduler.rs
//
// Round-robin scheduling over the fixed process table: scan forward
// from the current pid modulo NPROC, skip Broken slots without
// cleaning them up, and when nothing is Runnable, spin while polling
// the keyboard for the external exit signal. "Move current to the
// back, scan for the next Ready one" adapted to a modular scan over
// `[Process; NPROC]` with the classic `(pid + 1) % NPROC` advance and
// the keyboard check placed in the idle spin.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::NPROC;
use crate::keyboard;
use crate::process::{ProcessState, PROCESSES};

static CURRENT_PID: AtomicU32 = AtomicU32::new(0);
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn current_pid() -> u32 {
    CURRENT_PID.load(Ordering::Relaxed)
}

pub fn set_current_pid(pid: u32) {
    CURRENT_PID.store(pid, Ordering::Relaxed);
}

/// Called once per timer tick.
pub fn tick() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Scan `[current+1 ..= current+NPROC]` mod NPROC for a Runnable slot.
/// Broken and Free slots are passed over, never touched. Returns the
/// chosen pid, or `None` if nothing in the table is Runnable.
pub fn next_runnable() -> Option<u32> {
    let start = current_pid() as usize;
    PROCESSES.with_lock(|slots| {
        for offset in 1..=NPROC {
            let idx = (start + offset) % NPROC;
            if idx == 0 {
                continue; // slot 0 is permanently free
            }
            if slots[idx].state == ProcessState::Runnable {
                return Some(slots[idx].pid);
            }
        }
        None
    })
}

/// Pick the next process to run, spinning and polling the keyboard
/// exit signal while the table has nothing Runnable. Returns `None`
/// only when Ctrl-C was observed while idle — the caller's cue to
/// halt rather than resume a process.
pub fn schedule() -> Option<u32> {
    loop {
        if let Some(pid) = next_runnable() {
            set_current_pid(pid);
            return Some(pid);
        }
        if keyboard::check_keyboard_exit_signal() {
            return None;
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `PROCESSES` is a single shared static, so this resets every slot
    /// back to `Free` first rather than assuming a pristine table —
    /// tests in this module aren't guaranteed any particular run order.
    fn reset_table() {
        PROCESSES.with_lock(|slots| {
            for slot in slots.iter_mut() {
                slot.state = ProcessState::Free;
            }
        });
    }

    #[test]
    fn next_runnable_skips_free_and_broken_and_wraps() {
        reset_table();
        PROCESSES.with_lock(|slots| {
            slots[3].state = ProcessState::Broken;
            slots[5].state = ProcessState::Runnable;
        });
        set_current_pid(4);

        assert_eq!(next_runnable(), Some(5));
    }

    #[test]
    fn next_runnable_never_picks_slot_zero() {
        reset_table();
        PROCESSES.with_lock(|slots| {
            slots[0].state = ProcessState::Runnable;
        });
        set_current_pid(0);

        assert_eq!(next_runnable(), None);
    }
}
