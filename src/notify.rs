//! Notification sink for domain events.
//!
//! Delivery is best effort. Callers go through [`dispatch`], which logs a
//! failed delivery and carries on; a lost notification never undoes the
//! operation that raised it.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;
use crate::{MarketError, Result};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DomainEvent) -> Result<()>;
}

/// Publishes events as JSON on `<prefix>.<kind>`.
pub struct NatsNotifier {
    client: async_nats::Client,
    prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).map_err(|e| MarketError::Upstream(e.to_string()))?;
        let subject = format!("{}.{}", self.prefix, event.kind());
        self.client.publish(subject, payload.into()).await.map_err(|e| MarketError::Upstream(e.to_string()))
    }
}

/// Fallback when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &DomainEvent) -> Result<()> {
        tracing::info!(kind = event.kind(), "domain event");
        Ok(())
    }
}

pub async fn dispatch(notifier: &dyn Notifier, event: DomainEvent) {
    if let Err(e) = notifier.notify(&event).await {
        tracing::warn!(kind = event.kind(), error = %e, "notification delivery failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingNotifier { pub events: Mutex<Vec<&'static str>> }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: &DomainEvent) -> Result<()> {
            self.events.lock().await.push(event.kind());
            Ok(())
        }
    }

    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &DomainEvent) -> Result<()> {
            Err(MarketError::Upstream("telegram unavailable".into()))
        }
    }
}
