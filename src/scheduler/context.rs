use core::arch::naked_asm;

/// CPU register context saved/restored during a context switch.
/// Callee-saved registers only, per the x86_64 System V ABI — the
/// caller-saved set is already on the stack by the time we get here.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl Context {
    /// An empty context, used only for the bootstrap thread before its
    /// first switch-away (it is never switched *into* via [`switch_context`]).
    pub fn empty() -> Self {
        Context {
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
        }
    }

    /// Builds the initial context for a brand new thread: `entry` becomes
    /// the return address that `switch_context`'s `ret` lands on, and
    /// `stack_top` is the top of its freshly allocated kernel stack.
    pub fn new(entry: u64, stack_top: u64) -> Self {
        let aligned_sp = (stack_top - 8) & !0xF;
        Context {
            rsp: aligned_sp,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: entry,
        }
    }
}

/// Switches from `old` to `new`: saves the outgoing thread's
/// callee-saved registers into `*old`, then restores `*new`'s and jumps
/// to its `rip`. Returns (to the caller of the *original* `switch_context`
/// call for `old`) only once some other thread switches back into `old`.
///
/// # Safety
/// Both pointers must reference live, correctly laid out [`Context`]
/// values, and `new`'s stack must not be in use by any other thread.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(old: *mut Context, new: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "jmp [rsi + 0x38]",

        "2:",
        "ret",
    );
}

/// Jumps into `new` without saving any outgoing state. Used when the
/// outgoing thread is dying and will never be switched back into.
///
/// # Safety
/// `new` must reference a live [`Context`] whose stack is not in use
/// elsewhere.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_context(new: *const Context) {
    naked_asm!(
        "mov rsp, [rdi + 0x00]",
        "mov rbp, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov r13, [rdi + 0x20]",
        "mov r14, [rdi + 0x28]",
        "mov r15, [rdi + 0x30]",
        "jmp [rdi + 0x38]",
    );
}
