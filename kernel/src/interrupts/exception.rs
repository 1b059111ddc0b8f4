// exception.rs

/// The stack frame the CPU pushes automatically on any interrupt or
/// exception, before any handler-specific error code.
#[repr(C)]
pub struct ExceptionStackFrame {
    /// Address of the instruction to resume at.
    pub instruction_pointer: u64,

    /// Code segment selector at the time of the interrupt.
    pub code_segment: u64,

    /// RFLAGS at the time of the interrupt.
    pub cpu_flags: u64,

    /// Stack pointer before the interrupt.
    pub stack_pointer: u64,

    /// Stack segment selector at the time of the interrupt.
    pub stack_segment: u64,
}

impl ExceptionStackFrame {
    pub const fn new() -> Self {
        Self {
            instruction_pointer: 0,
            code_segment: 0,
            cpu_flags: 0,
            stack_pointer: 0,
            stack_segment: 0,
        }
    }
}

impl core::fmt::Debug for ExceptionStackFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ExceptionStackFrame")
            .field("instruction_pointer", &format_args!("{:#x}", self.instruction_pointer))
            .field("code_segment", &format_args!("{:#x}", self.code_segment))
            .field("cpu_flags", &format_args!("{:#x}", self.cpu_flags))
            .field("stack_pointer", &format_args!("{:#x}", self.stack_pointer))
            .field("stack_segment", &format_args!("{:#x}", self.stack_segment))
            .finish()
    }
}
