//! Timer tick accounting, sleep, and delay, grounded on
//! `original_source/src/devices/timer.c`. `TIMER_FREQ` ticks fire per
//! second; everything coarser than one tick blocks the sleeping thread,
//! everything finer busy-waits using a calibrated loop count.

use core::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Ticks per second the timer interrupt is programmed to deliver.
pub const TIMER_FREQ: i64 = 100;

static TICKS: AtomicI64 = AtomicI64::new(0);
static LOOPS_PER_TICK: AtomicU32 = AtomicU32::new(0);

/// Returns the number of timer ticks since boot.
pub fn ticks() -> i64 {
    TICKS.load(Ordering::SeqCst)
}

/// Ticks elapsed since `then`, a value previously returned by [`ticks`].
pub fn elapsed(then: i64) -> i64 {
    ticks() - then
}

/// Called once, with interrupts on, before any thread calls `sleep`.
/// Finds the largest power-of-two loop count that still completes
/// within one tick, then refines the next 8 bits — the original's
/// doubling-then-binary-search approach, reused verbatim in shape.
pub fn calibrate() {
    assert!(crate::sync::intr::get_level() == crate::sync::intr::IntrLevel::On);

    let mut loops_per_tick: u32 = 1 << 10;
    while !too_many_loops(loops_per_tick << 1) {
        loops_per_tick <<= 1;
        assert!(loops_per_tick != 0, "timer calibration overflowed");
    }

    let high_bit = loops_per_tick;
    let mut test_bit = high_bit >> 1;
    while test_bit != high_bit >> 10 {
        if !too_many_loops(high_bit | test_bit) {
            loops_per_tick |= test_bit;
        }
        test_bit >>= 1;
    }

    LOOPS_PER_TICK.store(loops_per_tick, Ordering::SeqCst);
    crate::log_info!(
        "Timer calibrated: {} loops/s",
        loops_per_tick as u64 * TIMER_FREQ as u64
    );
}

fn too_many_loops(loops: u32) -> bool {
    let start = ticks();
    while ticks() == start {
        core::hint::spin_loop();
    }
    let start = ticks();
    busy_wait(loops as i64);
    ticks() != start
}

#[inline(never)]
fn busy_wait(mut loops: i64) {
    while loops > 0 {
        core::hint::spin_loop();
        loops -= 1;
    }
}

/// Blocks the calling thread until at least `ticks` timer interrupts
/// have fired. Interrupts must be on; the thread is parked on the sleep
/// queue rather than spinning.
pub fn sleep(ticks_to_wait: i64) {
    debug_assert!(crate::sync::intr::get_level() == crate::sync::intr::IntrLevel::On);
    if ticks_to_wait <= 0 {
        return;
    }
    let wake_at = ticks() + ticks_to_wait;
    crate::scheduler::sleep_until(wake_at);
}

pub fn msleep(ms: i64) {
    real_time_sleep(ms, 1000);
}

pub fn usleep(us: i64) {
    real_time_sleep(us, 1_000_000);
}

pub fn nsleep(ns: i64) {
    real_time_sleep(ns, 1_000_000_000);
}

/// Converts `num/denom` seconds to ticks, rounding down; sleeps a whole
/// number of ticks on the queue, or busy-waits for anything finer.
fn real_time_sleep(num: i64, denom: i64) {
    let whole_ticks = num * TIMER_FREQ / denom;
    if whole_ticks > 0 {
        sleep(whole_ticks);
    } else {
        real_time_delay(num, denom);
    }
}

fn real_time_delay(num: i64, denom: i64) {
    debug_assert_eq!(denom % 1000, 0);
    let loops_per_tick = LOOPS_PER_TICK.load(Ordering::SeqCst) as i64;
    busy_wait(loops_per_tick * num / 1000 * TIMER_FREQ / (denom / 1000));
}

/// Invoked from the timer interrupt handler with interrupts off. Bumps
/// the tick counter, then delegates the MLFQ per-second / per-4-tick
/// recalculation and sleep-queue wakeups to the scheduler, exactly the
/// jobs `original_source/src/devices/timer.c`'s `timer_interrupt` does
/// inline.
pub fn on_tick() {
    debug_assert!(crate::sync::intr::get_level() == crate::sync::intr::IntrLevel::Off);
    let now = TICKS.fetch_add(1, Ordering::SeqCst) + 1;
    crate::scheduler::on_timer_tick(now);
}
