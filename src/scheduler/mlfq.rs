//! Pure MLFQ recalculation formulas, kept free of any
//! scheduler/thread-table access so they can be exercised on the host.
//! Grounded on `original_source/src/devices/timer.c`'s per-second and
//! per-4-tick jobs and `original_source/src/threads/fixed-point.c`.

use super::fixed_point::Fixed;
use super::thread::{PRI_MAX, PRI_MIN};

/// `load_avg = (59/60)*load_avg + (1/60)*ready_count`, recomputed once
/// per second (every `TIMER_FREQ` ticks).
pub fn update_load_avg(load_avg: Fixed, ready_count: i32) -> Fixed {
    let c59_60 = Fixed::from_int(59).div_int(60);
    let c1_60 = Fixed::from_int(1).div_int(60);
    c59_60.mul(load_avg).add(c1_60.mul(Fixed::from_int(ready_count)))
}

/// `recent_cpu = (2*load_avg)/(2*load_avg+1) * recent_cpu + nice`.
pub fn update_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i32) -> Fixed {
    let two_la = load_avg.mul_int(2);
    let coeff = two_la.div(two_la.add_int(1));
    coeff.mul(recent_cpu).add_int(nice)
}

/// Rounds `recent_cpu / 4` to the nearest integer using the original
/// kernel's "round half down" convention (ties truncate toward zero,
/// because the caller immediately negates the result). Implemented via
/// the same percent-scaled integer trick as the original rather than a
/// textbook rounding formula, so the tie-breaking edge case matches
/// exactly.
fn round_quarter(recent_cpu: Fixed) -> i32 {
    let percent = recent_cpu.mul_int(100).to_int_round();
    let mut a = percent / 40;
    if a % 10 > 5 {
        a = a / 10 + 1;
    } else {
        a = a / 10;
    }
    a
}

/// `priority = PRI_MAX − round(recent_cpu/4) − 2*nice`, clamped to
/// `[PRI_MIN, PRI_MAX]`. Run once every 4 ticks for every thread marked
/// "recent_cpu changed".
pub fn recompute_priority(recent_cpu: Fixed, nice: i32) -> u8 {
    let a = round_quarter(recent_cpu);
    let raw = PRI_MAX as i32 - a - nice * 2;
    raw.clamp(PRI_MIN as i32, PRI_MAX as i32) as u8
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn load_avg_converges_toward_ready_count() {
        let mut load_avg = Fixed::ZERO;
        for _ in 0..2000 {
            load_avg = update_load_avg(load_avg, 1);
        }
        // (59/60)^n -> 0, so load_avg -> 1 for a constantly-ready single thread.
        assert_eq!(load_avg.to_int_round(), 1);
    }

    #[test]
    fn recent_cpu_decays_to_zero_while_sleeping() {
        let mut recent_cpu = Fixed::from_int(100);
        let load_avg = Fixed::ZERO; // no other runnable threads
        for _ in 0..200 {
            recent_cpu = update_recent_cpu(recent_cpu, load_avg, 0);
        }
        assert!(recent_cpu.to_int() < 5, "expected decay toward zero, got {:?}", recent_cpu);
    }

    #[test]
    fn heavy_cpu_use_drives_priority_to_minimum_within_four_seconds() {
        // Scenario 4: a thread consuming the CPU exclusively for 4
        // seconds (load_avg == 1, since it is always the lone ready
        // thread) must see its priority reach PRI_MIN within that
        // window, and it must be monotonically non-increasing.
        let mut recent_cpu = Fixed::ZERO;
        let load_avg = Fixed::from_int(1);
        let nice = 0;
        let mut last_priority = PRI_MAX;
        let mut hit_min = false;
        for tick in 1..=(4 * 100) {
            recent_cpu = recent_cpu.add_int(1);
            if tick % 100 == 0 {
                recent_cpu = update_recent_cpu(recent_cpu, load_avg, nice);
            }
            if tick % 4 == 0 {
                let p = recompute_priority(recent_cpu, nice);
                assert!(p <= last_priority, "priority rose from {} to {}", last_priority, p);
                last_priority = p;
                if p == PRI_MIN {
                    hit_min = true;
                }
            }
        }
        assert!(hit_min, "priority never reached PRI_MIN within 4 seconds");
    }

    #[test]
    fn round_quarter_ties_truncate_toward_zero() {
        // recent_cpu/4 exactly .5 -> truncated down, not rounded up.
        let recent_cpu = Fixed::from_int(2); // 2/4 = 0.5
        assert_eq!(round_quarter(recent_cpu), 0);
    }
}
