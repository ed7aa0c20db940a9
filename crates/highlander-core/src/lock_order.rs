//! Two-lock acquisition helpers.
//!
//! [`lock_ordered`] takes a pair of mutexes in a global order derived from a
//! caller-supplied key, which rules out circular waits between any number of
//! tasks. [`lock_in_call_order`] takes them first-come as written and exists to
//! reproduce the classic deadlock.
//!
//! Both return the guards in argument order regardless of acquisition order,
//! and both are cancel-safe: dropping the future releases whatever was held.

use tokio::sync::{Mutex, MutexGuard};

/// Lock `a` and `b`, lowest key first.
///
/// Keys must be distinct for distinct mutexes; equal keys fall back to
/// argument order.
pub async fn lock_ordered<'a, T, K>(
    a: &'a Mutex<T>,
    a_key: K,
    b: &'a Mutex<T>,
    b_key: K,
) -> (MutexGuard<'a, T>, MutexGuard<'a, T>)
where
    K: Ord,
{
    debug_assert!(!std::ptr::eq(a, b), "a mutex cannot be paired with itself");
    if a_key <= b_key {
        let first = a.lock().await;
        let second = b.lock().await;
        (first, second)
    } else {
        let first = b.lock().await;
        let second = a.lock().await;
        (second, first)
    }
}

/// Lock `a` then `b` with no global order.
///
/// Yields while holding `a` so the circular wait is reachable even on a
/// single-threaded scheduler.
pub async fn lock_in_call_order<'a, T>(
    a: &'a Mutex<T>,
    b: &'a Mutex<T>,
) -> (MutexGuard<'a, T>, MutexGuard<'a, T>) {
    debug_assert!(!std::ptr::eq(a, b), "a mutex cannot be paired with itself");
    let first = a.lock().await;
    tokio::task::yield_now().await;
    let second = b.lock().await;
    (first, second)
}
