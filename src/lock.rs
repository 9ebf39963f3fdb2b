use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock a request-scoped mutex, recovering the guard if a previous holder panicked.
///
/// Every request runs its hook, flush, and delivery on one cooperative task,
/// so these locks are never contended; they exist so the state can cross
/// `.await` points inside `Send` futures.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in a construction hook",
                "Recovered from poisoned render lock"
            );
            poisoned.into_inner()
        }
    }
}
