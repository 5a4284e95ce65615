//! Thread control block, concretely
//! grounded on `original_source/src/threads/thread.h`'s field list.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::context::Context;
use super::fixed_point::Fixed;
use crate::fs::fd::File;
use crate::vm::page::SupplementalPageTable;

/// Lowest legal priority. The idle thread always runs here.
pub const PRI_MIN: u8 = 0;
/// Priority assigned to threads that don't request one explicitly.
pub const PRI_DEFAULT: u8 = 31;
/// Highest legal priority.
pub const PRI_MAX: u8 = 63;
/// Number of distinct priority levels, and the size of the ready-queue array.
pub const PRI_LEVELS: usize = PRI_MAX as usize + 1;

pub const NICE_MIN: i32 = -20;
pub const NICE_DEFAULT: i32 = 0;
pub const NICE_MAX: i32 = 20;

/// A fixed 32-bit sentinel written at TCB creation and checked on every
/// context switch. A mismatch means the kernel stack overflowed into
/// the TCB and the kernel panics rather than running on corrupted state.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Unique, monotonically assigned thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

/// Opaque identity of a [`crate::sync::lock::Lock`], used only to track
/// which lock a thread is waiting on / holds for donation bookkeeping.
/// Locks are long-lived kernel objects (statics or fields of long-lived
/// structs) so their address is stable for the lifetime of any donation
/// chain that references it.
pub type LockId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Which queue currently owns this thread's slab slot. Purely a
/// debugging / invariant-checking aid: a tagged "which queue am I on"
/// field standing in for the original's multiple embedded list links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Current,
    Ready(u8),
    Sleeping,
    WaitingOnSemaphore,
    Dead,
}

/// Per-process state, present only for threads backing a user program.
pub struct ProcessState {
    pub page_table: u64,
    /// Signaled once by `exit_current` when this process dies; a parent
    /// blocked in `wait_for_exit` downs it to learn the child is gone and
    /// its status (stashed separately, in the scheduler's `EXITED` map,
    /// since this `ProcessState` is dropped with its `Tcb` on reap) is
    /// ready to collect.
    pub exit_wait: Arc<crate::sync::semaphore::Semaphore>,
    pub fd_table: Vec<Option<Arc<Mutex<File>>>>,
    pub binary: Option<String>,
    pub spt: SupplementalPageTable,
    pub user_allocations: Vec<(u64, u64)>,
    pub parent: Option<ThreadId>,
    pub children: Vec<ThreadId>,
}

/// A thread control block. One per kernel thread or user process thread.
pub struct Tcb {
    pub tid: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    pub membership: Membership,

    pub context: Context,
    pub kernel_stack: alloc::boxed::Box<[u8]>,

    pub priority: u8,
    pub original_priority: u8,

    pub nice: i32,
    pub recent_cpu: Fixed,
    pub rcc_pending: bool,

    pub awake_tick: u64,

    pub donated_for: Option<ThreadId>,
    pub waiting_on_lock: Option<LockId>,
    pub held_locks: Vec<LockId>,

    pub process: Option<ProcessState>,

    pub magic: u32,
}

impl Tcb {
    pub fn effective_priority(&self) -> u8 {
        self.priority
    }

    pub fn is_process(&self) -> bool {
        self.process.is_some()
    }

    /// Checks the stack-overflow sentinel. Callers panic on `false`.
    pub fn magic_intact(&self) -> bool {
        self.magic == THREAD_MAGIC
    }
}
