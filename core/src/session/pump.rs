//! Internal event queue
//!
//! Radio events and follow-up steps are appended here and drained by whichever
//! caller holds the draining flag. An event delivered while a drain is running
//! (from another thread, or synchronously from inside a facade command) is
//! queued and handled after the current step instead of recursing.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct EventPump<T> {
    pending: Mutex<VecDeque<T>>,
    draining: AtomicBool,
}

impl<T> EventPump<T> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, item: T) {
        self.pending.lock().push_back(item);
    }

    /// Handle queued items in FIFO order unless another drain is active
    pub(crate) fn drain(&self, mut handle: impl FnMut(T)) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.pending.lock().pop_front();
                match next {
                    Some(item) => handle(item),
                    None => break,
                }
            }

            self.draining.store(false, Ordering::Release);

            // An item pushed between the last pop and the flag reset would be stranded.
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    /// Run a command with the drain flag held, then handle what it queued
    ///
    /// Events the platform delivers from inside `command` wait in the queue
    /// until it returns. When a drain is already active the command runs
    /// directly and its events may be handled while it is still running, so
    /// `command` must not hold a lock that `handle` takes.
    pub(crate) fn run<R>(&self, command: impl FnOnce() -> R, handle: impl FnMut(T)) -> R {
        let owned = self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        let result = command();

        if owned {
            self.draining.store(false, Ordering::Release);
            self.drain(handle);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.lock().len()
    }
}
