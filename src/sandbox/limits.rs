//! Deadline and interrupt policy for the QuickJS engine.
//!
//! QuickJS polls an interrupt handler from its bytecode loop, so the policy
//! here can stop a `while (true) {}` without any cooperation from the
//! script. The state is shared between the handler installed on the
//! engine, the filesystem bridge, and any [`InterruptHandle`]s the host
//! holds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const NO_DEADLINE: u64 = u64::MAX;

/// Shared interrupt state for one runtime.
#[derive(Debug)]
pub struct InterruptState {
    /// Reference point for `deadline_nanos`.
    origin: Instant,
    /// Deadline as nanoseconds after `origin`, or `NO_DEADLINE`.
    deadline_nanos: AtomicU64,
    /// An evaluation is in flight.
    active: AtomicBool,
    /// The host asked to abort the in-flight evaluation.
    cancelled: AtomicBool,
    /// The handler returned `true` at least once during this call.
    tripped: AtomicBool,
    /// The runtime is being disposed. Never reset.
    closed: AtomicBool,
}

impl Default for InterruptState {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptState {
    /// Create an idle state with no deadline.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            deadline_nanos: AtomicU64::new(NO_DEADLINE),
            active: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Start a call, optionally bounded by `timeout` from now.
    pub fn arm(&self, timeout: Option<Duration>) {
        let deadline = timeout
            .map(|t| {
                let nanos = (self.origin.elapsed() + t).as_nanos();
                u64::try_from(nanos).unwrap_or(NO_DEADLINE - 1)
            })
            .unwrap_or(NO_DEADLINE);
        self.tripped.store(false, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
        self.deadline_nanos.store(deadline, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
    }

    /// End the call. Later polls never interrupt.
    pub fn disarm(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.deadline_nanos.store(NO_DEADLINE, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Ask the in-flight call, if any, to stop.
    pub fn cancel(&self) -> bool {
        if self.active.load(Ordering::SeqCst) {
            self.cancelled.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Mark the runtime as closing and stop the in-flight call, if any.
    ///
    /// Unlike [`cancel`](Self::cancel) this is permanent: every later call
    /// is stopped as soon as it polls. Returns `true` if a call was running.
    pub fn close(&self) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        self.active.load(Ordering::SeqCst)
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Poll from the engine. Returns `true` when evaluation must stop, and
    /// records that it did.
    pub fn should_interrupt(&self) -> bool {
        if !self.active.load(Ordering::Relaxed) {
            return false;
        }
        let expired = self.closed.load(Ordering::Relaxed)
            || self.cancelled.load(Ordering::Relaxed)
            || self.deadline_passed();
        if expired {
            self.tripped.store(true, Ordering::SeqCst);
        }
        expired
    }

    /// Check if the handler has fired since the last `arm`.
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Check if the host cancelled the current call.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Check if a call is in flight.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn deadline_passed(&self) -> bool {
        let deadline = self.deadline_nanos.load(Ordering::Relaxed);
        deadline != NO_DEADLINE && self.origin.elapsed().as_nanos() >= u128::from(deadline)
    }
}

/// Host-side handle that aborts the in-flight evaluation of a runtime.
///
/// The aborted call reports an `interrupted` fault, exactly as if its
/// timeout had fired.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    state: Arc<InterruptState>,
}

impl InterruptHandle {
    pub(crate) fn new(state: Arc<InterruptState>) -> Self {
        Self { state }
    }

    /// Interrupt the current evaluation. Returns `false` if nothing was
    /// running.
    pub fn interrupt(&self) -> bool {
        self.state.cancel()
    }

    /// Check if an evaluation is currently running.
    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }
}

/// Engine-level resource limits applied once at runtime construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Maximum heap in bytes.
    pub max_memory: usize,
    /// Maximum stack in bytes.
    pub max_stack_size: Option<usize>,
}

impl EngineLimits {
    /// Apply the limits to a QuickJS runtime.
    pub fn apply(&self, runtime: &rquickjs::Runtime) {
        runtime.set_memory_limit(self.max_memory);
        if let Some(stack) = self.max_stack_size {
            runtime.set_max_stack_size(stack);
        }
    }
}
