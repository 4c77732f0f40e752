//! The cache contract and the state bookkeeping shared by its
//! implementations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::ByteReader;
use bytes::Bytes;
use core_runtime::events::{CacheEvent, CacheState, CoreEvent};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CacheSource, CacheStats};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::inflight::{InFlight, Role};
use crate::model::{MediaItem, MediaItemId};
use crate::naming;
use crate::progress::{spawn_sampler, Progress, Sample};

/// Where a cached item's bytes can be read from.
#[derive(Debug, Clone)]
pub enum CachedMedia {
    File(PathBuf),
    Memory(Bytes),
}

/// Moves an item's bytes into local storage and owns its [`CacheState`].
///
/// Every read accessor is gated on `CacheState::Cached` and re-validates that
/// the backing artifact still exists, demoting the item to `NotCached` when it
/// does not.
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Deterministic artifact name for `item`.
    fn cache_file_name(&self, item: &MediaItem) -> String {
        naming::cache_file_name(item)
    }

    /// Populate the cache for `item` from `source` under `cache_name`.
    ///
    /// An existing entry with the same name makes this a no-op success.
    /// Concurrent calls for the same name share one copy.
    async fn cache(
        &self,
        item: &MediaItem,
        source: CacheSource,
        cache_name: &str,
        cancel: CancellationToken,
    ) -> Result<()>;

    /// Drop the mapping for `item` and delete its artifact. Unmapped items
    /// are a no-op.
    async fn remove(&self, item: &MediaItem) -> Result<()>;

    async fn cached_path(&self, item: &MediaItem) -> Result<Option<PathBuf>>;

    async fn cached_stream(&self, item: &MediaItem) -> Result<Option<ByteReader>>;

    async fn cached_media(&self, item: &MediaItem) -> Result<Option<CachedMedia>>;

    /// Remove every artifact this strategy knows about.
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Per-strategy bookkeeping: the in-flight table, which item leads each
/// running copy, and state/progress event emission.
pub(crate) struct CacheLifecycle<A>
where
    A: Clone + Send + Sync + 'static,
{
    ctx: MediaContext,
    inflight: Arc<InFlight<String, A>>,
    leaders: Mutex<HashMap<String, MediaItemId>>,
}

impl<A> CacheLifecycle<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(ctx: MediaContext) -> Self {
        Self {
            ctx,
            inflight: InFlight::new(),
            leaders: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn ctx(&self) -> &MediaContext {
        &self.ctx
    }

    pub(crate) async fn in_flight(&self) -> usize {
        self.inflight.len().await
    }

    pub(crate) fn set_state(&self, item: &MediaItem, state: CacheState) {
        if item.set_cache_state(state) {
            debug!(item = %item.id(), %state, "Cache state changed");
            self.ctx.emit(CoreEvent::Cache(CacheEvent::StateChanged {
                item_id: item.id().to_string(),
                state,
            }));
        }
    }

    /// Mark an existing artifact as the item's cache without copying.
    pub(crate) fn adopt(&self, item: &MediaItem) {
        item.cache_progress().advance(1.0);
        self.set_state(item, CacheState::Cached);
    }

    /// Demote an item whose artifact vanished.
    pub(crate) fn invalidate(&self, item: &MediaItem, reason: &str) {
        warn!(item = %item.id(), reason, "Cached artifact is gone, demoting item");
        self.set_state(item, CacheState::NotCached);
    }

    /// Drive one cache call through the in-flight table.
    ///
    /// `start` builds the copy for the leader. `record` runs for every caller
    /// whose operation succeeded, before its item turns `Cached`.
    pub(crate) async fn run<S, R>(
        &self,
        item: &MediaItem,
        cache_name: &str,
        cancel: CancellationToken,
        start: S,
        record: R,
    ) -> Result<()>
    where
        S: FnOnce() -> BoxFuture<'static, Result<A>>,
        R: FnOnce(&A),
    {
        let key = cache_name.to_string();
        let leader_key = key.clone();
        let item_id = item.id();
        let (role, op) = self
            .inflight
            .join_or_start(key.clone(), || {
                self.leaders.lock().insert(leader_key, item_id);
                start()
            })
            .await;

        // A follower for the item that already leads must not rewind it.
        let shares_leader_item = match role {
            Role::Leader => false,
            Role::Follower => self.leaders.lock().get(&key) == Some(&item_id),
        };

        if !shares_leader_item {
            item.cache_progress().reset();
            self.set_state(item, CacheState::Caching);
        }

        let outcome = match role {
            Role::Leader => op.await,
            Role::Follower => {
                debug!(cache_name, "Joining in-flight cache operation");
                tokio::select! {
                    result = op => result,
                    _ = cancel.cancelled() => {
                        if !shares_leader_item {
                            self.set_state(item, CacheState::NotCached);
                        }
                        return Err(MediaError::Cancelled);
                    }
                }
            }
        };

        if role == Role::Leader {
            self.leaders.lock().remove(&key);
        }

        match outcome {
            Ok(artifact) => {
                record(&artifact);
                item.cache_progress().advance(1.0);
                self.set_state(item, CacheState::Cached);
                Ok(())
            }
            Err(err) => {
                let state = match err {
                    MediaError::Validation(_) => CacheState::Failed,
                    _ => CacheState::NotCached,
                };
                if err.is_cancelled() {
                    debug!(cache_name, "Cache operation cancelled");
                } else {
                    warn!(cache_name, error = %err, "Cache operation failed");
                }
                self.set_state(item, state);
                Err(err)
            }
        }
    }
}

/// Start publishing `CacheEvent::Progress` for `item` until `stop` fires.
pub(crate) fn spawn_progress_events(
    ctx: &MediaContext,
    item: &MediaItem,
    interval: std::time::Duration,
    total_known: bool,
    stop: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let progress: Progress = item.cache_progress().clone();
    let ctx = ctx.clone();
    let item_id = item.id().to_string();

    spawn_sampler(
        interval,
        stop,
        move || {
            if total_known {
                Sample::Value(progress.value())
            } else {
                Sample::Unknown
            }
        },
        move |value| {
            ctx.emit(CoreEvent::Cache(CacheEvent::Progress {
                item_id: item_id.clone(),
                progress: value,
            }))
        },
    )
}
