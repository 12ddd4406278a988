//! Per-booking fan-out of persisted chat messages.
//!
//! A channel exists only while at least one connection is subscribed or a
//! message is being appended. The channel map is locked briefly to find or
//! create a channel; subscribe, unsubscribe and append then serialize on that
//! booking's own mutex, so unrelated bookings never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use sewa_shared::protocol::{ChatFrame, OutboundFrame};
use sewa_shared::BookingId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServiceError;

pub type ConnectionId = Uuid;

struct ChatChannel {
    booking_id: BookingId,
    subscribers: HashMap<ConnectionId, mpsc::Sender<OutboundFrame>>,
    /// Set once the last subscriber left and the channel is being removed.
    closed: bool,
}

impl ChatChannel {
    fn new(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            subscribers: HashMap::new(),
            closed: false,
        }
    }

    /// Push a frame to every subscriber without waiting on any of them.
    fn broadcast(&mut self, frame: &OutboundFrame) {
        let mut gone = Vec::new();

        for (conn, tx) in &self.subscribers {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(
                        booking = %self.booking_id,
                        connection = %conn,
                        "Dropping frame for slow connection"
                    );
                }
                Err(TrySendError::Closed(_)) => gone.push(*conn),
            }
        }

        for conn in gone {
            self.subscribers.remove(&conn);
        }
    }
}

#[derive(Clone, Default)]
pub struct ChannelHub {
    channels: Arc<RwLock<HashMap<BookingId, Arc<Mutex<ChatChannel>>>>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the booking's channel and lock it.
    async fn lock_channel(&self, booking_id: BookingId) -> (Arc<Mutex<ChatChannel>>, OwnedMutexGuard<ChatChannel>) {
        loop {
            let channel = {
                let mut channels = self.channels.write().await;
                channels
                    .entry(booking_id)
                    .or_insert_with(|| Arc::new(Mutex::new(ChatChannel::new(booking_id))))
                    .clone()
            };

            let guard = channel.clone().lock_owned().await;
            if !guard.closed {
                return (channel, guard);
            }
            // Lost a race with the channel's removal; a fresh one replaces it.
            drop(guard);
            tokio::task::yield_now().await;
        }
    }

    /// Remove `channel` from the map once nobody is subscribed.
    ///
    /// Lock order is channel first, then map.
    async fn retire_if_empty(&self, channel: &Arc<Mutex<ChatChannel>>, guard: &mut ChatChannel) {
        if !guard.subscribers.is_empty() || guard.closed {
            return;
        }
        guard.closed = true;

        let booking_id = guard.booking_id;
        let mut channels = self.channels.write().await;
        if channels
            .get(&booking_id)
            .is_some_and(|current| Arc::ptr_eq(current, channel))
        {
            channels.remove(&booking_id);
            debug!(booking = %booking_id, "Removed empty chat channel");
        }
    }

    /// Join a booking's channel, creating it on first subscribe.
    pub async fn subscribe(
        &self,
        booking_id: BookingId,
        conn: ConnectionId,
        tx: mpsc::Sender<OutboundFrame>,
    ) {
        let (_, mut guard) = self.lock_channel(booking_id).await;
        guard.subscribers.insert(conn, tx);
        info!(
            booking = %booking_id,
            connection = %conn,
            subscribers = guard.subscribers.len(),
            "Connection joined chat channel"
        );
    }

    /// Leave a channel. The channel is removed with its last subscriber.
    pub async fn unsubscribe(&self, booking_id: BookingId, conn: ConnectionId) {
        let Some(channel) = self.channels.read().await.get(&booking_id).cloned() else {
            return;
        };

        let mut guard = channel.lock().await;
        guard.subscribers.remove(&conn);
        debug!(
            booking = %booking_id,
            connection = %conn,
            subscribers = guard.subscribers.len(),
            "Connection left chat channel"
        );
        self.retire_if_empty(&channel, &mut guard).await;
    }

    /// Persist a message and broadcast it to the booking's subscribers.
    ///
    /// The channel stays locked from persistence to broadcast, so frames go
    /// out in the order messages were stored and a connection subscribing
    /// meanwhile waits until the frame is out.
    pub async fn append<Fut>(&self, booking_id: BookingId, persist: Fut) -> Result<ChatFrame, ServiceError>
    where
        Fut: Future<Output = Result<ChatFrame, ServiceError>>,
    {
        let (channel, mut guard) = self.lock_channel(booking_id).await;
        let result = persist.await;
        if let Ok(frame) = &result {
            guard.broadcast(&OutboundFrame::ChatMessage(frame.clone()));
        }
        self.retire_if_empty(&channel, &mut guard).await;
        result
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    #[cfg(test)]
    pub async fn participant_count(&self, booking_id: BookingId) -> usize {
        let channel = self.channels.read().await.get(&booking_id).cloned();
        match channel {
            Some(channel) => channel.lock().await.subscribers.len(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use sewa_shared::{MessageId, UserId};

    fn frame(booking_id: BookingId, seq: i64) -> ChatFrame {
        ChatFrame {
            id: MessageId::new(),
            booking_id,
            seq,
            sender_id: UserId::new(),
            user: "sita".into(),
            message: format!("message {seq}"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_channel_lifecycle() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx, _rx) = mpsc::channel(8);

        hub.subscribe(booking, a, tx.clone()).await;
        hub.subscribe(booking, b, tx).await;
        assert_eq!(hub.participant_count(booking).await, 2);
        assert_eq!(hub.channel_count().await, 1);

        hub.unsubscribe(booking, a).await;
        assert_eq!(hub.channel_count().await, 1);
        hub.unsubscribe(booking, b).await;
        assert_eq!(hub.channel_count().await, 0);

        // Leaving an unknown channel is a no-op.
        hub.unsubscribe(booking, a).await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.subscribe(booking, Uuid::new_v4(), tx_a).await;
        hub.subscribe(booking, Uuid::new_v4(), tx_b).await;

        let sent = hub.append(booking, async { Ok(frame(booking, 1)) }).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.try_recv().unwrap(), OutboundFrame::ChatMessage(sent.clone()));
        }
    }

    #[tokio::test]
    async fn test_failed_persist_broadcasts_nothing() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (tx, mut rx) = mpsc::channel(8);
        hub.subscribe(booking, Uuid::new_v4(), tx).await;

        let result = hub
            .append(booking, async { Err(ServiceError::InvalidArgument("empty".into())) })
            .await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_other_bookings_isolated() {
        let hub = ChannelHub::new();
        let (first, second) = (BookingId::new(), BookingId::new());
        let (tx, mut rx) = mpsc::channel(8);
        hub.subscribe(first, Uuid::new_v4(), tx).await;

        hub.append(second, async move { Ok(frame(second, 1)) }).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receivers_pruned() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (tx, rx) = mpsc::channel(8);
        hub.subscribe(booking, Uuid::new_v4(), tx).await;
        drop(rx);

        hub.append(booking, async { Ok(frame(booking, 1)) }).await.unwrap();
        assert_eq!(hub.participant_count(booking).await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_waits_for_in_flight_append() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let appending = {
            let hub = hub.clone();
            tokio::spawn(async move {
                hub.append(booking, async move {
                    let _ = gate.await;
                    Ok(frame(booking, 1))
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hub.channel_count().await, 1);

        let (tx, mut rx) = mpsc::channel(8);
        let joining = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.subscribe(booking, Uuid::new_v4(), tx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joining.is_finished());

        release.send(()).unwrap();
        appending.await.unwrap().unwrap();
        joining.await.unwrap();
        assert_eq!(hub.participant_count(booking).await, 1);

        // The joiner saw nothing of the earlier message and everything after it.
        let later = hub.append(booking, async { Ok(frame(booking, 2)) }).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::ChatMessage(later));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_append_without_subscribers_leaves_no_channel() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        hub.append(booking, async { Ok(frame(booking, 1)) }).await.unwrap();
        hub.append(booking, async { Err(ServiceError::Timeout) }).await.unwrap_err();
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_wire_order_matches_append_order() {
        let hub = ChannelHub::new();
        let booking = BookingId::new();
        let (tx, mut rx) = mpsc::channel(64);
        hub.subscribe(booking, Uuid::new_v4(), tx).await;

        let counter = Arc::new(Mutex::new(0i64));
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let hub = hub.clone();
            let counter = counter.clone();
            tasks.push(tokio::spawn(async move {
                hub.append(booking, async move {
                    let mut seq = counter.lock().await;
                    *seq += 1;
                    Ok(frame(booking, *seq))
                })
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(OutboundFrame::ChatMessage(f)) = rx.try_recv() {
            seen.push(f.seq);
        }
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }
}
