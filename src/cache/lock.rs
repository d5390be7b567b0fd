//! Lock helpers that keep serving after a panic poisoned the lock.
//!
//! Cache entries are immutable once inserted, so the state behind a poisoned
//! lock is still a valid map; dropping it would only cost hit rate.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.read"))
}

pub(crate) fn write_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, op, "rwlock.write"))
}

fn recover<G>(poisoned: PoisonError<G>, op: &'static str, lock_kind: &'static str) -> G {
    warn!(
        op,
        target_module = "cache::store",
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned output cache lock"
    );
    poisoned.into_inner()
}
