use async_trait::async_trait;
use bourse_core::TradeSettled;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("event channel closed")]
    Closed,
}

/// Port for trade-settled notifications (pricing, UI fan-out)
#[async_trait]
pub trait TradeEventSink: Send + Sync {
    /// Publish one event; the overflow behaviour is adapter-defined
    async fn publish(&self, event: TradeSettled) -> Result<(), PublishError>;
}
