use crate::common::Result;
use crate::core::access::{DoorCommand, NotificationSink};

/// Sink used when no broker is configured: notifications only reach the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn publish_door_state(&self, state: DoorCommand) -> Result<()> {
        tracing::info!("[NOTIFY] Door state: {}", state);
        Ok(())
    }

    fn publish_unauthorized_alert(&self, identity: &str) -> Result<()> {
        tracing::warn!("[NOTIFY] Unauthorized access alert: {}", identity);
        Ok(())
    }
}
