use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

pub type SubscriberId = u64;

/// One live-update subscriber's end of the hub. Dropping it closes the
/// channel, and the hub prunes the subscriber on its next broadcast.
pub struct Subscription<M> {
    id: SubscriberId,
    receiver: mpsc::Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Returns `None` once the hub has released this subscriber.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<M> {
        self.receiver.try_recv().ok()
    }
}

/// Outcome of a single broadcast pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers whose queue was full; the payload was skipped for them.
    pub lagged: usize,
    /// Subscribers removed because their channel was closed.
    pub pruned: usize,
}

/// Fan-out of payloads to every connected subscriber.
///
/// Each subscriber has its own bounded queue, so delivery order per
/// subscriber follows broadcast order. Sends never wait: a full queue drops
/// the payload for that subscriber only, a closed queue removes the
/// subscriber after the pass.
pub struct FanoutHub<M> {
    capacity: usize,
    next_id: AtomicU64,
    senders: Mutex<HashMap<SubscriberId, mpsc::Sender<M>>>,
}

impl<M> FanoutHub<M>
where
    M: Clone + Send + 'static,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<M>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription<M> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.senders().insert(id, sender);
        tracing::debug!("Subscriber {} joined", id);
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.senders().remove(&id).is_some() {
            tracing::debug!("Subscriber {} left", id);
        }
    }

    pub fn len(&self) -> usize {
        self.senders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn broadcast(&self, msg: M) -> BroadcastReport {
        let senders: Vec<(SubscriberId, mpsc::Sender<M>)> = {
            let guard = self.senders();
            guard.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for (id, sender) in senders {
            match sender.try_send(msg.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {} is lagging, payload dropped", id);
                    report.lagged += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut guard = self.senders();
            for id in &dead {
                guard.remove(id);
                tracing::debug!("Subscriber {} pruned", id);
            }
            report.pruned = dead.len();
        }

        report
    }

    /// Releases every subscriber. Their `recv` calls return `None` once the
    /// queued payloads are drained.
    pub fn close_all(&self) {
        let released = std::mem::take(&mut *self.senders());
        if !released.is_empty() {
            tracing::info!("Released {} subscriber(s)", released.len());
        }
    }
}
