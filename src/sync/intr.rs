//! Interrupt level control and context classification.
//!
//! Every data structure touched by the timer ISR (ready queues, sleep
//! queue, donation state, the frame table's clock list) relies on
//! interrupt-disable as its mutual-exclusion mechanism on this
//! uniprocessor kernel. This module is the single place that flips IF.

use core::sync::atomic::{AtomicBool, Ordering};
use x86_64::instructions::interrupts;

/// Interrupt level: whether maskable interrupts are currently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// True while the CPU is executing inside an external interrupt handler.
/// An external handler must never call into the scheduler directly; it
/// may only set [`set_yield_on_return`] and let the IRET path yield.
static IN_EXTERNAL_INTERRUPT: AtomicBool = AtomicBool::new(false);

/// True while the current kernel-mode execution arrived via the `int 0x80`
/// syscall gate rather than a hardware interrupt or a direct kernel call.
/// The page-fault handler consults this to decide whether a bad user
/// pointer dereferenced from inside a syscall body should be turned into
/// `exit(-1)` by the outer dispatcher instead of killed on the spot.
static IN_SYSCALL: AtomicBool = AtomicBool::new(false);

/// Set when an external interrupt handler wants the scheduler to run
/// before control returns to the interrupted thread. Consumed (and
/// cleared) by the interrupt-return path.
static YIELD_ON_RETURN: AtomicBool = AtomicBool::new(false);

/// Returns the current interrupt level without changing it.
pub fn get_level() -> IntrLevel {
    if interrupts::are_enabled() {
        IntrLevel::On
    } else {
        IntrLevel::Off
    }
}

/// Sets the interrupt level to `level`, returning the previous level.
pub fn set_level(level: IntrLevel) -> IntrLevel {
    let old = get_level();
    match level {
        IntrLevel::On => interrupts::enable(),
        IntrLevel::Off => interrupts::disable(),
    }
    old
}

/// Disables interrupts, returning the level that was in effect before.
/// Callers restore it later with [`set_level`].
pub fn disable() -> IntrLevel {
    set_level(IntrLevel::Off)
}

/// Enables interrupts. Only meaningful when called from a context that
/// is not itself an interrupt handler (an ISR must not re-enable IF
/// before it returns).
pub fn enable() {
    interrupts::enable();
}

/// Runs `f` with interrupts disabled, restoring the prior level
/// afterward. This is the primitive every invariant-sensitive mutation
/// in the scheduler and VM subsystems is wrapped in.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

/// True if the calling context is an external (hardware) interrupt
/// handler. Used by [`crate::scheduler`] to assert that blocking
/// primitives are never reached from inside an ISR.
pub fn in_external_interrupt() -> bool {
    IN_EXTERNAL_INTERRUPT.load(Ordering::Relaxed)
}

/// Enters external-interrupt context for the duration of `f`. Called
/// once, at the top of each hardware interrupt handler.
pub fn run_as_external_interrupt<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    IN_EXTERNAL_INTERRUPT.store(true, Ordering::Relaxed);
    let r = f();
    IN_EXTERNAL_INTERRUPT.store(false, Ordering::Relaxed);
    r
}

/// Requests that the scheduler run before the current interrupt frame
/// is restored. Safe to call from an external handler, where invoking
/// the scheduler directly is forbidden.
pub fn set_yield_on_return() {
    YIELD_ON_RETURN.store(true, Ordering::Relaxed);
}

/// Consumes the yield-on-return flag, returning whether it was set.
pub fn take_yield_on_return() -> bool {
    YIELD_ON_RETURN.swap(false, Ordering::Relaxed)
}

/// True if kernel-mode execution was entered through the syscall gate.
pub fn in_syscall() -> bool {
    IN_SYSCALL.load(Ordering::Relaxed)
}

/// Marks the current kernel-mode stretch as syscall context for the
/// duration of `f`. The `int 0x80` trampoline wraps the dispatcher call
/// in this so a page fault taken while servicing a syscall is
/// attributed to user-pointer validation rather than a kernel bug.
pub fn run_as_syscall<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    IN_SYSCALL.store(true, Ordering::Relaxed);
    let r = f();
    IN_SYSCALL.store(false, Ordering::Relaxed);
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yield_on_return_is_one_shot() {
        assert!(!take_yield_on_return());
        set_yield_on_return();
        assert!(take_yield_on_return());
        assert!(!take_yield_on_return());
    }
}
