//! Notifier boundary
//!
//! Abstract "send message" capability consumed by SendMessage and
//! NotifyManager actions. Concrete messenger/email/SMS integrations live
//! outside the kernel.

use async_trait::async_trait;
use parking_lot::Mutex;

use shared::error::CoreResult;

/// A message sent through the notifier, recorded for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: String,
    pub template_id: String,
    pub ticket_id: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &str, template_id: &str, ticket_id: &str) -> CoreResult<()>;
}

/// In-process notifier that records every send. Supports scripted failures
/// so retry behavior can be exercised.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentMessage>>,
    /// Number of sends to fail before succeeding
    fail_next: Mutex<u32>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with a transient error.
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock() = count;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, channel: &str, template_id: &str, ticket_id: &str) -> CoreResult<()> {
        {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(shared::error::CoreError::Notify(format!(
                    "transient send failure on channel {}",
                    channel
                )));
            }
        }
        self.sent.lock().push(SentMessage {
            channel: channel.to_string(),
            template_id: template_id.to_string(),
            ticket_id: ticket_id.to_string(),
        });
        Ok(())
    }
}
