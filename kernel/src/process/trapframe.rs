// kernel/src/process/trapframe.rs
// xv6-derived saved-register layout.

/// Saved user-mode state: general-purpose registers pushed by the trap
/// entry stub, followed by the five-word frame the CPU itself pushes
/// on interrupt/exception entry and that `iretq` expects to find.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,

    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// A trapframe for a process about to run for the very first time.
    pub fn new_user(entry_point: u64, user_stack: u64, user_cs: u64, user_ss: u64) -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,

            rip: entry_point,
            cs: user_cs | 3,
            rflags: 0x202,
            rsp: user_stack,
            ss: user_ss | 3,
        }
    }
}
