//! Debounced cart persistence.
//!
//! Every cart change hands the bridge a [`CartWrite`]. The write waits in a
//! single pending slot for the quiescence window; a newer write arriving in
//! the meantime aborts the waiting task and takes its place, so only the
//! latest state is ever flushed.
//!
//! Flush policy:
//! - guest: write the flattened cart to local storage
//! - signed-in user: send the flattened cart to the user record, then clear
//!   local storage so the draft cannot be merged in again later
//!
//! Flushes run one at a time in the order their writes were claimed. A slow
//! remote write therefore finishes before a later guest write touches local
//! storage, and cannot clear a draft saved after it.
//!
//! A failed remote write is reported and dropped. The next change schedules
//! a fresh write of the latest state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use cartsync_core::{PersistedCart, UserId};

use crate::cms::UserCartStore;
use crate::error::{self, CartError};
use crate::storage::{CART_KEY, LocalStore};

/// A flattened cart and where it should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartWrite {
    /// Signed-in user, or `None` for a guest.
    pub user: Option<UserId>,
    /// Flattened cart.
    pub cart: PersistedCart,
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Guest cart written to local storage.
    Local,
    /// User cart stored remotely; local draft cleared.
    Remote,
    /// Write failed and was dropped.
    Failed,
}

/// Debounces cart writes into local storage or the remote user record.
///
/// Cheaply cloneable; clones share the pending slot.
#[derive(Clone)]
pub struct PersistenceBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    window: Duration,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn UserCartStore>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    /// Held for the whole of a flush.
    flush_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Slot {
    /// Write waiting for the window to elapse.
    pending: Option<PendingWrite>,
    /// Most recent flush that has left the window and may still be running.
    in_flight: Option<JoinHandle<()>>,
}

struct PendingWrite {
    generation: u64,
    write: CartWrite,
    task: JoinHandle<()>,
}

impl PersistenceBridge {
    /// Create a bridge with the given quiescence window.
    #[must_use]
    pub fn new(
        window: Duration,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn UserCartStore>,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                window,
                local,
                remote,
                slot: Mutex::new(Slot::default()),
                generation: AtomicU64::new(0),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// The quiescence window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Whether a write is waiting for its window to elapse.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner.lock_slot().pending.is_some()
    }

    /// Schedule a write, superseding any write still waiting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, write: CartWrite) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut slot = self.inner.lock_slot();
        if let Some(previous) = slot.pending.take() {
            previous.task.abort();
            debug!(superseded = previous.generation, generation, "Pending cart write superseded");
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            if let Some(write) = inner.claim(generation) {
                inner.flush(write).await;
            }
        });

        slot.pending = Some(PendingWrite {
            generation,
            write,
            task,
        });
    }

    /// Write out whatever is pending now instead of waiting for the window.
    ///
    /// Waits for an in-flight flush first so writes land in order.
    pub async fn flush_pending(&self) -> Option<FlushOutcome> {
        let (pending, in_flight) = {
            let mut slot = self.inner.lock_slot();
            (slot.pending.take(), slot.in_flight.take())
        };

        if let Some(handle) = in_flight {
            // A panicked or aborted flush has nothing left to wait for
            let _ = handle.await;
        }

        match pending {
            Some(pending) => {
                pending.task.abort();
                Some(self.inner.flush(pending.write).await)
            }
            None => None,
        }
    }
}

impl BridgeInner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the pending write if it still belongs to `generation`.
    ///
    /// After this the task is no longer abortable by `schedule`; its handle
    /// moves to `in_flight`. The caller must go straight on to `flush` so it
    /// queues on the flush lock in claim order.
    fn claim(&self, generation: u64) -> Option<CartWrite> {
        let mut slot = self.lock_slot();
        if slot.pending.as_ref()?.generation != generation {
            return None;
        }
        let pending = slot.pending.take()?;
        slot.in_flight = Some(pending.task);
        Some(pending.write)
    }

    #[instrument(
        skip_all,
        fields(
            user_id = ?write.user.as_ref().map(UserId::as_str),
            items = write.cart.items.len()
        )
    )]
    async fn flush(&self, write: CartWrite) -> FlushOutcome {
        let _serial = self.flush_lock.lock().await;
        match write.user {
            None => match self.write_local(&write.cart) {
                Ok(()) => {
                    debug!("Guest cart saved locally");
                    FlushOutcome::Local
                }
                Err(e) => {
                    warn!(error = %e, "Failed to save guest cart locally");
                    FlushOutcome::Failed
                }
            },
            Some(user) => match self.remote.persist_user_cart(&user, &write.cart).await {
                Ok(()) => {
                    if let Err(e) = self.local.remove(CART_KEY) {
                        warn!(error = %e, "Failed to clear local cart draft");
                    }
                    info!("User cart synced");
                    FlushOutcome::Remote
                }
                Err(e) => {
                    error::report(&CartError::from(e), "Error while syncing cart to user record");
                    FlushOutcome::Failed
                }
            },
        }
    }

    fn write_local(&self, cart: &PersistedCart) -> Result<(), CartError> {
        let payload = serde_json::to_string(cart)?;
        self.local.set(CART_KEY, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cartsync_core::{PersistedItem, ProductId, Quantity};

    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::RecordingUserCarts;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn flat(items: &[(&str, u32)]) -> PersistedCart {
        PersistedCart {
            items: items
                .iter()
                .map(|(id, q)| PersistedItem {
                    product: ProductId::parse(id).unwrap(),
                    quantity: Quantity::new(*q),
                })
                .collect(),
        }
    }

    fn user() -> Option<UserId> {
        Some(UserId::parse("u1").unwrap())
    }

    fn bridge(local: &Arc<MemoryStore>, remote: &Arc<RecordingUserCarts>) -> PersistenceBridge {
        PersistenceBridge::new(WINDOW, local.clone(), remote.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_write_goes_to_local_storage() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::default());
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: None,
            cart: flat(&[("p1", 2)]),
        });
        assert!(bridge.has_pending());
        assert_eq!(local.get(CART_KEY).unwrap(), None);

        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

        let saved = local.get(CART_KEY).unwrap().unwrap();
        assert_eq!(saved, r#"{"items":[{"product":"p1","quantity":2}]}"#);
        assert!(remote.calls().is_empty());
        assert!(!bridge.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_write_goes_remote_and_clears_local() {
        let local = Arc::new(MemoryStore::with_entry(CART_KEY, "{\"items\":[]}"));
        let remote = Arc::new(RecordingUserCarts::default());
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(remote.calls(), vec![(user().unwrap(), flat(&[("p1", 1)]))]);
        assert_eq!(local.get(CART_KEY).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_within_window_coalesce() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::default());
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW / 2).await;
        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 2)]),
        });

        // First window would have ended here; nothing may be sent yet
        tokio::time::sleep(WINDOW * 3 / 4).await;
        assert!(remote.calls().is_empty());

        tokio::time::sleep(WINDOW).await;
        assert_eq!(remote.calls(), vec![(user().unwrap(), flat(&[("p1", 2)]))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_keeps_local_draft() {
        let local = Arc::new(MemoryStore::with_entry(CART_KEY, "draft"));
        let remote = Arc::new(RecordingUserCarts::failing());
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW * 2).await;

        assert_eq!(remote.calls().len(), 1);
        assert_eq!(local.get(CART_KEY).unwrap().as_deref(), Some("draft"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pending_writes_immediately() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::default());
        let bridge = bridge(&local, &remote);

        assert_eq!(bridge.flush_pending().await, None);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 3)]),
        });
        assert_eq!(bridge.flush_pending().await, Some(FlushOutcome::Remote));
        assert_eq!(remote.calls().len(), 1);

        // The aborted timer must not write a second time
        tokio::time::sleep(WINDOW * 2).await;
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_remote_write_does_not_clear_newer_guest_draft() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::slow(WINDOW * 5));
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(remote.calls().len(), 1);

        // Logged out while the remote write is still running
        bridge.schedule(CartWrite {
            user: None,
            cart: flat(&[("p1", 2)]),
        });
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(local.get(CART_KEY).unwrap(), None);

        tokio::time::sleep(WINDOW * 5).await;
        let saved = local.get(CART_KEY).unwrap();
        assert_eq!(
            saved.as_deref(),
            Some(r#"{"items":[{"product":"p1","quantity":2}]}"#)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_writes_for_same_user_land_in_order() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::slow(WINDOW * 3));
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 4)]),
        });

        // Second timer has fired but waits for the first write to finish
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        assert_eq!(remote.calls().len(), 1);

        tokio::time::sleep(WINDOW * 6).await;
        assert_eq!(
            remote.calls(),
            vec![
                (user().unwrap(), flat(&[("p1", 1)])),
                (user().unwrap(), flat(&[("p1", 4)])),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pending_waits_for_running_write() {
        let local = Arc::new(MemoryStore::new());
        let remote = Arc::new(RecordingUserCarts::slow(WINDOW * 3));
        let bridge = bridge(&local, &remote);

        bridge.schedule(CartWrite {
            user: user(),
            cart: flat(&[("p1", 1)]),
        });
        tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;
        bridge.schedule(CartWrite {
            user: None,
            cart: flat(&[]),
        });

        assert_eq!(bridge.flush_pending().await, Some(FlushOutcome::Local));
        assert_eq!(remote.calls().len(), 1);
        assert_eq!(local.get(CART_KEY).unwrap().as_deref(), Some(r#"{"items":[]}"#));
    }
}
