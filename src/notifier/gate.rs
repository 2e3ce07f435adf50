use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

/// Admits handler calls until closed.
///
/// Closing blocks until calls already admitted on other threads have
/// returned, so nothing runs after `close` does. Calls on the closing thread
/// are not waited for; a handler may close its own gate.
#[derive(Default)]
pub(crate) struct DeliveryGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

#[derive(Default)]
struct GateState {
    closed: bool,
    running: Vec<ThreadId>,
}

/// An admitted call. Dropping it marks the call finished.
pub(crate) struct Pass<'a> {
    gate: &'a DeliveryGate,
    thread: ThreadId,
}

impl DeliveryGate {
    pub(crate) fn enter(&self) -> Option<Pass<'_>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }

        let thread = thread::current().id();
        state.running.push(thread);
        Some(Pass { gate: self, thread })
    }

    pub(crate) fn close(&self) {
        let current = thread::current().id();
        let mut state = self.lock();
        state.closed = true;

        while state.running.iter().any(|running| *running != current) {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        if let Some(index) = state.running.iter().position(|t| *t == self.thread) {
            state.running.swap_remove(index);
        }
        self.gate.idle.notify_all();
    }
}
