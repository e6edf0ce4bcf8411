//! Poison-tolerant lock access shared by every hub component.
//!
//! A poisoned lock means a thread panicked mid-update. The guard is
//! recovered, the poison flag cleared and the fault counted on the current
//! thread, so [`crate::Hub::dispatch`] can tear down the session whose event
//! ran into it.

use std::cell::Cell;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

thread_local! {
    static RECOVERED: Cell<usize> = const { Cell::new(0) };
}

fn note_poisoned(what: &'static str) {
    tracing::error!(lock = what, "lock poisoned; continuing with inner state");
    RECOVERED.with(|count| count.set(count.get() + 1));
}

/// Returns and resets the number of poisoned locks recovered on this thread.
pub(crate) fn take_recovered() -> usize {
    RECOVERED.with(|count| count.replace(0))
}

pub(crate) fn read<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            note_poisoned(what);
            let guard = poisoned.into_inner();
            lock.clear_poison();
            guard
        }
    }
}

pub(crate) fn write<'a, T>(lock: &'a RwLock<T>, what: &'static str) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            note_poisoned(what);
            let guard = poisoned.into_inner();
            lock.clear_poison();
            guard
        }
    }
}

pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            note_poisoned(what);
            let guard = poisoned.into_inner();
            mutex.clear_poison();
            guard
        }
    }
}

/// Poisons a lock by panicking while holding its write guard.
#[cfg(test)]
pub(crate) fn poison<T: Send + Sync>(lock: &RwLock<T>) {
    std::thread::scope(|scope| {
        let _ = scope
            .spawn(|| {
                let _guard = lock.write().expect("lock is healthy");
                panic!("panicking while holding the lock");
            })
            .join();
    });
}
