//! Keyed table of in-flight operations.
//!
//! The first caller for a key starts the operation; later callers for the same
//! key receive a clone of the same [`Shared`] future and observe its outcome.
//! The entry removes itself once the operation completes, so a later call
//! starts fresh. A leader that panics resolves to [`MediaError::Internal`]
//! for every caller instead of poisoning the entry.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::{MediaError, Result};

pub(crate) type SharedOp<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Whether the caller started the operation or joined one already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Leader,
    Follower,
}

pub(crate) struct InFlight<K, T>
where
    T: Clone,
{
    ops: Mutex<HashMap<K, SharedOp<T>>>,
}

impl<K, T> InFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            ops: Mutex::new(HashMap::new()),
        })
    }

    /// Join the operation running under `key`, or start one with `start`.
    ///
    /// `start` is only invoked for the leader. The returned future must be
    /// awaited by the caller; nothing runs until someone polls it.
    pub(crate) async fn join_or_start<F>(self: &Arc<Self>, key: K, start: F) -> (Role, SharedOp<T>)
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        let mut ops = self.ops.lock().await;
        if let Some(existing) = ops.get(&key) {
            return (Role::Follower, existing.clone());
        }

        let table: Weak<Self> = Arc::downgrade(self);
        let entry_key = key.clone();
        let work = start();
        let op = async move {
            let outcome = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(MediaError::Internal(panic_message(panic.as_ref()))));
            if let Some(table) = table.upgrade() {
                table.ops.lock().await.remove(&entry_key);
            }
            outcome
        }
        .boxed()
        .shared();

        ops.insert(key, op.clone());
        (Role::Leader, op)
    }

    pub(crate) async fn contains(&self, key: &K) -> bool {
        self.ops.lock().await.contains_key(key)
    }

    pub(crate) async fn len(&self) -> usize {
        self.ops.lock().await.len()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("in-flight operation panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let table: Arc<InFlight<&'static str, u32>> = InFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let start = |runs: Arc<AtomicUsize>| {
            move || {
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(7)
                }
                .boxed()
            }
        };

        let (role_a, op_a) = table.join_or_start("k", start(runs.clone())).await;
        let (role_b, op_b) = table.join_or_start("k", start(runs.clone())).await;
        assert_eq!(role_a, Role::Leader);
        assert_eq!(role_b, Role::Follower);

        let (a, b) = tokio::join!(op_a, op_b);
        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn failures_are_shared_and_entry_cleared() {
        let table: Arc<InFlight<u8, ()>> = InFlight::new();
        let (_, op) = table
            .join_or_start(1, || async { Err(MediaError::Cancelled) }.boxed())
            .await;
        assert!(table.contains(&1).await);

        assert!(matches!(op.await, Err(MediaError::Cancelled)));
        assert!(!table.contains(&1).await);

        let (role, op) = table.join_or_start(1, || async { Ok(()) }.boxed()).await;
        assert_eq!(role, Role::Leader);
        assert!(op.await.is_ok());
    }

    async fn explode() -> Result<()> {
        panic!("buffer overflow")
    }

    #[tokio::test]
    async fn panicking_leader_becomes_internal_error() {
        let table: Arc<InFlight<u8, ()>> = InFlight::new();
        let (_, op) = table.join_or_start(9, || explode().boxed()).await;
        let (role, follower) = table.join_or_start(9, || async { Ok(()) }.boxed()).await;
        assert_eq!(role, Role::Follower);

        let (a, b) = tokio::join!(op, follower);
        assert!(matches!(a, Err(MediaError::Internal(msg)) if msg.contains("buffer overflow")));
        assert!(matches!(b, Err(MediaError::Internal(_))));
        assert!(!table.contains(&9).await);
    }
}
