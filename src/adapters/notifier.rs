//! Notification sinks

use async_trait::async_trait;
use tracing::info;

use crate::adapters::traits::Notifier;
use crate::error::Result;

/// Writes notifications to the log under a fixed channel name
#[derive(Debug, Clone)]
pub struct LogNotifier {
    channel: String,
}

impl LogNotifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new("qtrade")
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!(channel = %self.channel, "{}", message);
        Ok(())
    }
}
