//! Preemptive priority scheduler with donation and optional MLFQ.
//! Every [`Tcb`](thread::Tcb) lives in a single
//! arena keyed by [`ThreadId`](thread::ThreadId) and is never moved;
//! ready queues, the sleep set, and lock waiter lists hold only
//! `ThreadId`s pointing back into it. This is what lets priority
//! donation mutate a thread's priority in place no matter which queue
//! currently (notionally) owns it — a move-by-value
//! `VecDeque<Process>` style round-robin queue can't support that.

pub mod context;
pub mod fixed_point;
pub mod mlfq;
pub mod thread;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

use context::{restore_context, switch_context, Context};
use fixed_point::Fixed;
use thread::{
    LockId, Membership, ProcessState, Tcb, ThreadId, ThreadStatus, NICE_DEFAULT, PRI_DEFAULT,
    PRI_LEVELS, PRI_MIN, THREAD_MAGIC,
};

use crate::fs::fd::File;
use crate::sync::intr;
use crate::vm::page::SupplementalPageTable;

const KERNEL_STACK_SIZE: usize = 16 * 1024;

pub struct Scheduler {
    threads: BTreeMap<ThreadId, Tcb>,
    ready: [VecDeque<ThreadId>; PRI_LEVELS],
    sleeping: Vec<ThreadId>,
    current: ThreadId,
    idle: ThreadId,
    next_tid: u64,
    mlfqs: bool,
    load_avg: Fixed,
    ready_count_cache: usize,
}

lazy_static! {
    static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::bootstrap());
    /// Exit statuses of process threads that have already been reaped
    /// from `Scheduler::threads`, kept just long enough for a `wait`
    /// syscall to collect. Grounded on `original_source/src/userprog/
    /// process.c`'s parent/child `exit_status` handoff, which the
    /// original keeps inline on a shared struct; a thread's `Tcb` here
    /// disappears on reap, so the status has to survive it separately.
    static ref EXITED: Mutex<BTreeMap<ThreadId, i32>> = Mutex::new(BTreeMap::new());
    /// One clone of each live process thread's `exit_wait` semaphore,
    /// keyed by the thread it belongs to. Outlives the `Tcb` (and its
    /// `ProcessState`) past `reap_dead_threads`, so a parent that calls
    /// `wait_for_exit` can still down it after the child is gone.
    static ref EXIT_SEMAS: Mutex<BTreeMap<ThreadId, Arc<crate::sync::semaphore::Semaphore>>> =
        Mutex::new(BTreeMap::new());
}

impl Scheduler {
    fn bootstrap() -> Self {
        let main_tid = ThreadId(0);
        let mut threads = BTreeMap::new();
        threads.insert(
            main_tid,
            Tcb {
                tid: main_tid,
                name: String::from("main"),
                status: ThreadStatus::Running,
                membership: Membership::Current,
                context: Context::empty(),
                kernel_stack: Box::new([]),
                priority: PRI_DEFAULT,
                original_priority: PRI_DEFAULT,
                nice: NICE_DEFAULT,
                recent_cpu: Fixed::ZERO,
                rcc_pending: false,
                awake_tick: 0,
                donated_for: None,
                waiting_on_lock: None,
                held_locks: Vec::new(),
                process: None,
                magic: THREAD_MAGIC,
            },
        );
        Scheduler {
            threads,
            ready: core::array::from_fn(|_| VecDeque::new()),
            sleeping: Vec::new(),
            current: main_tid,
            idle: main_tid, // replaced by init_idle_thread()
            next_tid: 1,
            mlfqs: false,
            load_avg: Fixed::ZERO,
            ready_count_cache: 0,
        }
    }

    fn alloc_tid(&mut self) -> ThreadId {
        let tid = ThreadId(self.next_tid);
        self.next_tid += 1;
        tid
    }

    fn ready_count(&self) -> usize {
        self.ready.iter().map(|q| q.len()).sum::<usize>()
            + if self.threads.get(&self.current).map(|t| t.tid != self.idle).unwrap_or(false) {
                1
            } else {
                0
            }
    }

    fn push_ready(&mut self, tid: ThreadId) {
        let priority = self.threads[&tid].priority;
        self.ready[priority as usize].push_back(tid);
        if let Some(t) = self.threads.get_mut(&tid) {
            t.status = ThreadStatus::Ready;
            t.membership = Membership::Ready(priority);
        }
    }

    /// Removes `tid` from whichever ready-priority queue it's sitting in.
    /// Used when a donation changes its priority after it was enqueued.
    fn remove_from_ready(&mut self, tid: ThreadId, at_priority: u8) {
        self.ready[at_priority as usize].retain(|&t| t != tid);
    }

    fn pop_highest_ready(&mut self) -> Option<ThreadId> {
        for level in self.ready.iter_mut().rev() {
            if let Some(tid) = level.pop_front() {
                return Some(tid);
            }
        }
        None
    }

    fn highest_ready_priority(&self) -> Option<u8> {
        self.ready
            .iter()
            .enumerate()
            .rev()
            .find(|(_, q)| !q.is_empty())
            .map(|(p, _)| p as u8)
    }
}

/// Must run once, after the heap and interrupt tables are up, before any
/// `spawn`. Creates the idle thread, which runs at [`PRI_MIN`] and
/// simply halts the CPU whenever nothing else is ready.
pub fn init() {
    let idle_tid = spawn_kernel_thread_internal("idle", idle_entry, PRI_MIN);
    let mut sched = SCHEDULER.lock();
    sched.idle = idle_tid;
    sched.threads.get_mut(&idle_tid).unwrap().status = ThreadStatus::Ready;
    crate::log_info!("Scheduler initialized (priority donation, MLFQ available).");
}

pub fn set_mlfqs(enabled: bool) {
    SCHEDULER.lock().mlfqs = enabled;
}

pub extern "C" fn idle_entry() -> ! {
    loop {
        x86_64::instructions::interrupts::enable_and_hlt();
    }
}

/// Allocates a TCB and its kernel stack and drops it into the ready
/// queue. Does not yield to it immediately (matching the original's
/// `thread_create`, which leaves preemption to the next tick or an
/// explicit `thread_yield`).
pub fn spawn_kernel_thread(name: &str, entry: extern "C" fn() -> !, priority: u8) -> ThreadId {
    spawn_kernel_thread_internal(name, entry, priority)
}

fn spawn_kernel_thread_internal(name: &str, entry: extern "C" fn() -> !, priority: u8) -> ThreadId {
    let stack: Box<[u8]> = alloc::vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
    let stack_top = stack.as_ptr() as u64 + stack.len() as u64;
    let context = Context::new(entry as u64, stack_top);

    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let tid = sched.alloc_tid();
        let parent_recent_cpu = sched.threads[&sched.current].recent_cpu;
        let parent_nice = sched.threads[&sched.current].nice;
        sched.threads.insert(
            tid,
            Tcb {
                tid,
                name: String::from(name),
                status: ThreadStatus::Ready,
                membership: Membership::Ready(priority),
                context,
                kernel_stack: stack,
                priority,
                original_priority: priority,
                nice: parent_nice,
                recent_cpu: parent_recent_cpu,
                rcc_pending: false,
                awake_tick: 0,
                donated_for: None,
                waiting_on_lock: None,
                held_locks: Vec::new(),
                process: None,
                magic: THREAD_MAGIC,
            },
        );
        sched.push_ready(tid);
        tid
    })
}

/// Spawns a thread backing a user process, with a freshly built
/// [`ProcessState`] (caller fills in `page_table`/`spt`/`binary`).
pub fn spawn_process_thread(
    name: &str,
    entry: extern "C" fn() -> !,
    priority: u8,
    process: ProcessState,
) -> ThreadId {
    let tid = spawn_kernel_thread_internal(name, entry, priority);
    let exit_wait = process.exit_wait.clone();
    intr::without_interrupts(|| {
        SCHEDULER.lock().threads.get_mut(&tid).unwrap().process = Some(process);
    });
    EXIT_SEMAS.lock().insert(tid, exit_wait);
    tid
}

pub fn current_thread_id() -> ThreadId {
    intr::without_interrupts(|| SCHEDULER.lock().current)
}

pub fn priority_of(tid: ThreadId) -> u8 {
    intr::without_interrupts(|| {
        SCHEDULER
            .lock()
            .threads
            .get(&tid)
            .map(|t| t.priority)
            .unwrap_or(PRI_MIN)
    })
}

/// Runs `f` with mutable access to `tid`'s supplemental page table, if
/// `tid` is a process thread. Used by the VM subsystem instead of
/// exposing the whole [`Tcb`].
pub fn with_process_spt<F, R>(tid: ThreadId, f: F) -> Option<R>
where
    F: FnOnce(&mut SupplementalPageTable) -> R,
{
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let process = sched.threads.get_mut(&tid)?.process.as_mut()?;
        Some(f(&mut process.spt))
    })
}

/// Blocks `tid` (which must be the running thread) and switches away.
/// Returns once some other thread calls [`unblock`] on it.
pub fn block_current(tid: ThreadId) {
    debug_assert!(!intr::in_external_interrupt());
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        debug_assert_eq!(sched.current, tid);
        let t = sched.threads.get_mut(&tid).unwrap();
        t.status = ThreadStatus::Blocked;
        t.membership = Membership::WaitingOnSemaphore;
    });
    reschedule();
}

/// Moves a blocked thread back onto its priority's ready queue. Safe to
/// call from external-interrupt context (it never switches directly;
/// the caller's IRET path picks up [`crate::sync::intr::take_yield_on_return`]).
pub fn unblock(tid: ThreadId) {
    let should_preempt = intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let Some(t) = sched.threads.get_mut(&tid) else {
            return false;
        };
        if t.status != ThreadStatus::Blocked {
            return false;
        }
        t.status = ThreadStatus::Ready;
        sched.push_ready(tid);
        let woken_priority = sched.threads[&tid].priority;
        let current_priority = sched.threads[&sched.current].priority;
        woken_priority > current_priority
    });

    if should_preempt {
        if intr::in_external_interrupt() {
            intr::set_yield_on_return();
        } else {
            yield_now();
        }
    }
}

/// Voluntarily gives up the CPU, returning to the ready queue at the
/// caller's current (possibly donated) priority.
pub fn yield_now() {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let cur = sched.current;
        if cur != sched.idle {
            sched.push_ready(cur);
        }
    });
    reschedule();
}

/// Terminates the calling thread with `status`, recording it for a
/// parent's `wait` if this is a process thread. Never returns.
pub fn exit_current(status: i32) -> ! {
    let exit_wait = intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let cur = sched.current;
        let exit_wait = if sched.threads[&cur].is_process() {
            EXITED.lock().insert(cur, status);
            sched.threads[&cur].process.as_ref().map(|p| p.exit_wait.clone())
        } else {
            None
        };
        sched.threads.get_mut(&cur).unwrap().status = ThreadStatus::Dying;
        exit_wait
    });
    // Wakes a parent blocked in `wait_for_exit`. Called with the
    // scheduler lock already released: `Semaphore::up` may itself call
    // back into `unblock`, which takes that lock.
    if let Some(sema) = exit_wait {
        sema.up();
    }
    reschedule();
    unreachable!("a dying thread must never be switched back into");
}

/// Runs `f` with mutable access to `tid`'s file descriptor table, if
/// `tid` is a process thread.
pub fn with_process_fds<F, R>(tid: ThreadId, f: F) -> Option<R>
where
    F: FnOnce(&mut Vec<Option<Arc<Mutex<File>>>>) -> R,
{
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let process = sched.threads.get_mut(&tid)?.process.as_mut()?;
        Some(f(&mut process.fd_table))
    })
}

/// Whether `child` is among `parent`'s recorded children (a `wait` may
/// only be issued for a direct, not-yet-waited-on child).
pub fn is_child_of(parent: ThreadId, child: ThreadId) -> bool {
    intr::without_interrupts(|| {
        let sched = SCHEDULER.lock();
        sched
            .threads
            .get(&parent)
            .and_then(|t| t.process.as_ref())
            .map(|p| p.children.contains(&child))
            .unwrap_or(false)
    })
}

pub fn forget_child(parent: ThreadId, child: ThreadId) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        if let Some(process) = sched.threads.get_mut(&parent).and_then(|t| t.process.as_mut()) {
            process.children.retain(|&c| c != child);
        }
    });
}

pub fn add_child(parent: ThreadId, child: ThreadId) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        if let Some(process) = sched.threads.get_mut(&parent).and_then(|t| t.process.as_mut()) {
            process.children.push(child);
        }
    });
}

/// Blocks until `child` has exited, returning its status. `None` if
/// `child` is not a live or pending-exit child of the calling thread,
/// matching `wait`'s "not a child" error. Blocks on `child`'s own
/// `exit_wait` semaphore rather than polling, so this suspends the same
/// way every other blocking call in this kernel does.
pub fn wait_for_exit(parent: ThreadId, child: ThreadId) -> Option<i32> {
    if !is_child_of(parent, child) {
        return None;
    }
    let Some(sema) = EXIT_SEMAS.lock().get(&child).cloned() else {
        // No semaphore was ever registered (not a process thread) —
        // treat as already collected, matching the old no-status path.
        forget_child(parent, child);
        return Some(-1);
    };
    sema.down();
    let status = EXITED.lock().remove(&child);
    EXIT_SEMAS.lock().remove(&child);
    forget_child(parent, child);
    Some(status.unwrap_or(-1))
}

pub fn set_priority(new_priority: u8) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let cur = sched.current;
        let t = sched.threads.get_mut(&cur).unwrap();
        t.original_priority = new_priority;
        // A donation currently in effect must not be clobbered by a
        // lower explicit request; only raise past it or, if nothing is
        // being donated right now, take the new value outright.
        if t.held_locks.is_empty() || new_priority > t.priority {
            t.priority = new_priority;
        }
    });
    maybe_yield_to_higher_priority();
}

pub fn get_priority() -> u8 {
    priority_of(current_thread_id())
}

pub fn set_nice(nice: i32) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let cur = sched.current;
        let t = sched.threads.get_mut(&cur).unwrap();
        t.nice = nice.clamp(thread::NICE_MIN, thread::NICE_MAX);
        t.priority = mlfq::recompute_priority(t.recent_cpu, t.nice);
        t.original_priority = t.priority;
    });
    maybe_yield_to_higher_priority();
}

pub fn get_nice() -> i32 {
    intr::without_interrupts(|| SCHEDULER.lock().threads[&current_thread_id()].nice)
}

/// `recent_cpu * 100`, rounded to nearest, per the original's reporting
/// convention for the `get_recent_cpu` syscall-ish accessor.
pub fn get_recent_cpu() -> i32 {
    intr::without_interrupts(|| {
        let sched = SCHEDULER.lock();
        sched.threads[&sched.current].recent_cpu.mul_int(100).to_int_round()
    })
}

pub fn get_load_avg() -> i32 {
    intr::without_interrupts(|| SCHEDULER.lock().load_avg.mul_int(100).to_int_round())
}

fn maybe_yield_to_higher_priority() {
    let should_yield = intr::without_interrupts(|| {
        let sched = SCHEDULER.lock();
        let mine = sched.threads[&sched.current].priority;
        sched.highest_ready_priority().map(|p| p > mine).unwrap_or(false)
    });
    if should_yield {
        yield_now();
    }
}

/// Parks the current thread on the sleep set until tick `wake_at`.
pub fn sleep_until(wake_at: i64) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let cur = sched.current;
        let t = sched.threads.get_mut(&cur).unwrap();
        t.status = ThreadStatus::Blocked;
        t.membership = Membership::Sleeping;
        t.awake_tick = wake_at as u64;
        sched.sleeping.push(cur);
    });
    reschedule();
}

// ---- Donation bookkeeping, called from crate::sync::lock ----

pub fn set_waiting_on_lock(tid: ThreadId, lock: Option<LockId>) {
    intr::without_interrupts(|| {
        SCHEDULER.lock().threads.get_mut(&tid).unwrap().waiting_on_lock = lock;
    });
}

pub fn add_held_lock(tid: ThreadId, lock: LockId) {
    intr::without_interrupts(|| {
        SCHEDULER.lock().threads.get_mut(&tid).unwrap().held_locks.push(lock);
    });
}

pub fn remove_held_lock(tid: ThreadId, lock: LockId) {
    intr::without_interrupts(|| {
        SCHEDULER
            .lock()
            .threads
            .get_mut(&tid)
            .unwrap()
            .held_locks
            .retain(|&l| l != lock);
    });
}

pub fn lock_waited_on_by(tid: ThreadId) -> Option<LockId> {
    intr::without_interrupts(|| SCHEDULER.lock().threads.get(&tid)?.waiting_on_lock)
}

/// Raises `holder`'s priority to `donor_priority` if that's an increase,
/// repositioning it in the ready queue if it was sitting in one. Returns
/// whether a raise happened, which is what tells the donation chain walk
/// in `crate::sync::lock` whether to keep following it.
pub fn donate_priority_to(holder: ThreadId, donor_priority: u8, _via_lock: LockId) -> bool {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let Some(t) = sched.threads.get_mut(&holder) else {
            return false;
        };
        if donor_priority <= t.priority {
            return false;
        }
        let old_priority = t.priority;
        t.priority = donor_priority;
        if let Membership::Ready(_) = t.membership {
            sched.remove_from_ready(holder, old_priority);
            sched.push_ready(holder);
        }
        true
    })
}

/// Recomputes `tid`'s effective priority after it releases a lock:
/// `max(original_priority, highest priority among threads still waiting
/// on a lock `tid` still holds)`. The scan mirrors what
/// `original_source/src/threads/thread.h`'s `hold_list` field implies a
/// lock release must do — walk the releasing thread's remaining held
/// locks for the highest donation still owed to it — over this
/// kernel's `held_locks`/`waiting_on_lock` bookkeeping instead of an
/// intrusive list.
pub fn recompute_donated_priority(tid: ThreadId) {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let Some(t) = sched.threads.get(&tid) else {
            return;
        };
        let held: Vec<LockId> = t.held_locks.clone();
        let base = t.original_priority;
        let mut best = base;
        for (_, other) in sched.threads.iter() {
            if let Some(lock) = other.waiting_on_lock {
                if held.contains(&lock) && other.priority > best {
                    best = other.priority;
                }
            }
        }
        let t = sched.threads.get_mut(&tid).unwrap();
        let old_priority = t.priority;
        t.priority = best;
        if let Membership::Ready(_) = t.membership {
            sched.remove_from_ready(tid, old_priority);
            sched.push_ready(tid);
        }
    });
    maybe_yield_to_higher_priority();
}

/// Runs the per-tick scheduler jobs: MLFQ recent-cpu
/// and load-average recalculation, per-4-tick priority recomputation,
/// and sleep-queue wakeups. Called from `devices::timer::on_tick` with
/// interrupts already disabled (interrupt context).
pub fn on_timer_tick(now: i64) {
    let mut sched = SCHEDULER.lock();

    if sched.mlfqs && now % mlfq_ticks_per_second() == 0 {
        let ready_count = sched.ready_count() as i32;
        sched.load_avg = mlfq::update_load_avg(sched.load_avg, ready_count);
        let load_avg = sched.load_avg;
        for (_, t) in sched.threads.iter_mut() {
            t.recent_cpu = mlfq::update_recent_cpu(t.recent_cpu, load_avg, t.nice);
            t.rcc_pending = true;
        }
    } else if sched.mlfqs {
        let current = sched.current;
        let idle = sched.idle;
        if let Some(t) = sched.threads.get_mut(&current) {
            if t.tid != idle {
                t.recent_cpu = t.recent_cpu.add_int(1);
                t.rcc_pending = true;
            }
        }
    }

    if sched.mlfqs && now % 4 == 0 {
        let pending: Vec<ThreadId> = sched
            .threads
            .iter()
            .filter(|(_, t)| t.rcc_pending)
            .map(|(tid, _)| *tid)
            .collect();
        for tid in pending {
            let t = sched.threads.get_mut(&tid).unwrap();
            let new_priority = mlfq::recompute_priority(t.recent_cpu, t.nice);
            let old_priority = t.priority;
            t.priority = new_priority;
            t.original_priority = new_priority;
            t.rcc_pending = false;
            if let Membership::Ready(_) = t.membership {
                sched.remove_from_ready(tid, old_priority);
                sched.push_ready(tid);
            }
        }
    }

    let now_u = now as u64;
    let woken: Vec<ThreadId> = sched
        .sleeping
        .iter()
        .copied()
        .filter(|tid| sched.threads[tid].awake_tick <= now_u)
        .collect();
    if !woken.is_empty() {
        sched.sleeping.retain(|tid| !woken.contains(tid));
        for tid in woken {
            let t = sched.threads.get_mut(&tid).unwrap();
            t.status = ThreadStatus::Ready;
            sched.push_ready(tid);
        }
    }

    let should_yield = sched
        .highest_ready_priority()
        .map(|p| p > sched.threads[&sched.current].priority)
        .unwrap_or(false);
    drop(sched);
    if should_yield {
        intr::set_yield_on_return();
    }
}

fn mlfq_ticks_per_second() -> i64 {
    crate::devices::timer::TIMER_FREQ
}

/// Switches from the current thread to the next ready thread, if any
/// other than itself or idle is ready; otherwise runs idle. Must be
/// called with interrupts disabled; returns with interrupts restored to
/// whatever they were at the call site once this thread runs again.
fn reschedule() {
    let saved = intr::disable();

    let (old_ptr, new_ptr, dying): (*mut Context, *const Context, Option<ThreadId>) = {
        let mut sched = SCHEDULER.lock();
        let next = sched.pop_highest_ready().unwrap_or(sched.idle);
        let old = sched.current;

        if old == next {
            intr::set_level(saved);
            return;
        }

        let dying = if sched.threads[&old].status == ThreadStatus::Dying {
            Some(old)
        } else {
            None
        };
        if sched.threads[&old].status == ThreadStatus::Running {
            // Preempted rather than blocked/dying: goes back on ready.
            sched.threads.get_mut(&old).unwrap().status = ThreadStatus::Ready;
        }
        sched.threads.get_mut(&next).unwrap().status = ThreadStatus::Running;
        sched.threads.get_mut(&next).unwrap().membership = Membership::Current;
        sched.current = next;

        // RSP0 must point at `next`'s kernel stack before it can run,
        // since any interrupt or syscall that traps in from Ring 3 while
        // `next` is current lands on whatever stack the TSS names here.
        let stack = &sched.threads[&next].kernel_stack;
        let stack_top = stack.as_ptr() as u64 + stack.len() as u64;
        crate::interrupts::gdt::set_tss_rsp0(stack_top);

        let new_ptr: *const Context = &sched.threads[&next].context;
        if dying.is_some() {
            (core::ptr::null_mut(), new_ptr, dying)
        } else {
            let old_ptr: *mut Context = &mut sched.threads.get_mut(&old).unwrap().context;
            (old_ptr, new_ptr, dying)
        }
    };

    if let Some(dead) = dying {
        unsafe { restore_context(new_ptr) };
        unreachable!();
        #[allow(unreachable_code)]
        {
            let _ = dead;
        }
    } else {
        unsafe { switch_context(old_ptr, new_ptr) };
    }

    intr::set_level(saved);
    reap_dead_threads();
}

/// Frees the kernel stack and arena slot of any thread that reached
/// [`ThreadStatus::Dying`]. Run opportunistically after every reschedule
/// rather than inline during `exit_current`, since a dying thread cannot
/// free its own still-in-use kernel stack.
fn reap_dead_threads() {
    intr::without_interrupts(|| {
        let mut sched = SCHEDULER.lock();
        let dead: Vec<ThreadId> = sched
            .threads
            .iter()
            .filter(|(_, t)| t.status == ThreadStatus::Dying)
            .map(|(tid, _)| *tid)
            .collect();
        for tid in dead {
            sched.threads.remove(&tid);
        }
    });
}
