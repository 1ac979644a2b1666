use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bourse_core::TradeSettled;
use bourse_ports::{PublishError, TradeEventSink};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

/// What to do when the event queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the consumer; settlement slows down with it
    #[default]
    Block,
    /// Drop the event being published and count it
    DropNewest,
}

/// Bounded queue of trade-settled events
pub struct ChannelEventSink {
    tx: mpsc::Sender<TradeSettled>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> (Self, mpsc::Receiver<TradeSettled>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            tx,
            policy,
            dropped: AtomicU64::new(0),
        };
        (sink, rx)
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Events discarded under [`OverflowPolicy::DropNewest`]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TradeEventSink for ChannelEventSink {
    async fn publish(&self, event: TradeSettled) -> Result<(), PublishError> {
        match self.policy {
            OverflowPolicy::Block => self.tx.send(event).await.map_err(|_| PublishError::Closed),
            OverflowPolicy::DropNewest => match self.tx.try_send(event) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(event)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    log::warn!(
                        "Event queue full, dropped trade-settled event {} #{} ({} dropped so far)",
                        event.symbol,
                        event.sequence,
                        dropped
                    );
                    Ok(())
                }
                Err(TrySendError::Closed(_)) => Err(PublishError::Closed),
            },
        }
    }
}
