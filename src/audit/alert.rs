use crate::audit::event::SecurityEvent;
use anyhow::Result;
use async_trait::async_trait;

/// Out-of-band escalation for critical events. Injectable; no-op by default.
#[async_trait]
pub trait AlertHook: Send + Sync {
    async fn raise(&self, event: &SecurityEvent) -> Result<()>;
}

pub struct NoopAlert;

#[async_trait]
impl AlertHook for NoopAlert {
    async fn raise(&self, _event: &SecurityEvent) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct HttpAlertHook {
    pub target_url: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl AlertHook for HttpAlertHook {
    async fn raise(&self, event: &SecurityEvent) -> Result<()> {
        self.client
            .post(&self.target_url)
            .header("Content-Type", "application/json")
            .header("X-Event-Type", event.event_type.as_str())
            .json(event)
            .send()
            .await?;
        Ok(())
    }
}
