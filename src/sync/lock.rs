//! Priority-donating lock, built from a binary [`Semaphore`] plus the
//! donation bookkeeping fields `original_source/src/threads/thread.h`
//! documents on its thread struct (`donated_for`, `donated_to_get`,
//! `hold_list`, `original_priority`); the lock-acquire/release mechanics
//! themselves follow the standard semaphore-backed mutex construction.

use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::scheduler::thread::{LockId, ThreadId};
use crate::sync::intr;
use crate::sync::semaphore::Semaphore;

/// Bounds how many links a donation chain walk follows before giving up,
/// so a (forbidden, but defensively handled) cyclic donation graph can
/// never spin the kernel forever.
const MAX_DONATION_DEPTH: usize = 8;

/// A mutual-exclusion lock with priority donation. Binary semaphore
/// underneath; `holder` lets [`Lock::acquire`] and [`Lock::release`]
/// walk and rebuild donation chains.
pub struct Lock {
    sema: Semaphore,
    holder: UnsafeCell<Option<ThreadId>>,
}

unsafe impl Sync for Lock {}

impl Lock {
    pub const fn new() -> Self {
        Lock {
            sema: Semaphore::new(1),
            holder: UnsafeCell::new(None),
        }
    }

    /// This lock's identity for donation bookkeeping: its own address.
    /// Valid for the lock's entire lifetime because kernel locks are
    /// always static or embedded in long-lived structs, never moved
    /// after first use.
    pub fn id(&self) -> LockId {
        self as *const Lock as usize
    }

    pub fn is_held_by_current(&self) -> bool {
        let me = crate::scheduler::current_thread_id();
        intr::without_interrupts(|| unsafe { *self.holder.get() == Some(me) })
    }

    /// Reads the current holder of the lock identified by `lock_id`.
    ///
    /// # Safety
    /// `lock_id` must be a [`Lock::id`] obtained from a `Lock` that is
    /// still alive — guaranteed by the invariant that kernel locks are
    /// static or embedded in long-lived structs.
    unsafe fn holder_of_raw(lock_id: LockId) -> Option<ThreadId> {
        let lock = &*(lock_id as *const Lock);
        *lock.holder.get()
    }

    /// Acquires the lock, donating the current thread's priority along
    /// the chain of lock holders it is blocked behind when the lock is
    /// already held.
    pub fn acquire(&self) {
        let me = crate::scheduler::current_thread_id();
        debug_assert!(!self.is_held_by_current(), "lock is not re-entrant");

        intr::without_interrupts(|| {
            if let Some(holder) = unsafe { *self.holder.get() } {
                crate::scheduler::set_waiting_on_lock(me, Some(self.id()));
                donate_chain(me, holder, self.id());
            }
        });

        self.sema.down();

        intr::without_interrupts(|| {
            unsafe {
                *self.holder.get() = Some(me);
            }
            crate::scheduler::set_waiting_on_lock(me, None);
            crate::scheduler::add_held_lock(me, self.id());
        });
    }

    /// Releases the lock. The holder's priority is recomputed from its
    /// remaining held locks' waiter lists (it may still be elevated by a
    /// donation owed to a *different* lock it still holds).
    pub fn release(&self) {
        let me = crate::scheduler::current_thread_id();
        assert!(
            self.is_held_by_current(),
            "lock released by a thread that does not hold it"
        );
        intr::without_interrupts(|| {
            unsafe {
                *self.holder.get() = None;
            }
            crate::scheduler::remove_held_lock(me, self.id());
            crate::scheduler::recompute_donated_priority(me);
        });
        self.sema.up();
    }
}

/// Walks the chain of lock holders starting at `first_holder`, raising
/// each one's priority to at least the priority of the thread donating
/// to it (`donor`'s effective priority, which may itself already include
/// an earlier donation). Stops at [`MAX_DONATION_DEPTH`], at a holder
/// that is not itself waiting on another lock, or as soon as a holder's
/// priority is already high enough.
fn donate_chain(donor: ThreadId, mut holder: ThreadId, mut via_lock: LockId) {
    let donor_priority = crate::scheduler::priority_of(donor);
    let mut depth = 0;
    loop {
        if depth >= MAX_DONATION_DEPTH {
            break;
        }
        depth += 1;

        let raised = crate::scheduler::donate_priority_to(holder, donor_priority, via_lock);
        if !raised {
            break;
        }

        let Some(next_lock) = crate::scheduler::lock_waited_on_by(holder) else {
            break;
        };
        let Some(next_holder) = (unsafe { Lock::holder_of_raw(next_lock) }) else {
            break;
        };
        via_lock = next_lock;
        holder = next_holder;
    }
}

/// Tracks every [`Lock`] this thread currently holds, used only to
/// recompute a donated priority on release (see
/// [`crate::scheduler::recompute_donated_priority`]).
pub type HeldLocks = Vec<LockId>;

/// A process-wide monotonic counter occasionally useful for naming
/// anonymous locks in diagnostics; not used for identity.
static LOCK_DEBUG_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn next_debug_id() -> usize {
    LOCK_DEBUG_COUNTER.fetch_add(1, Ordering::Relaxed)
}
