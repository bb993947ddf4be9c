use crewgrid_sync::{ChangeEvent, ChangeFeed};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Delay before listening again after the notification connection fails
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Fans row-change notifications out to every subscriber
pub struct ChangeHub {
    events: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { events }
    }

    /// Broadcast a change to all subscribers
    pub fn publish(&self, event: ChangeEvent) {
        // Ignore errors if no receivers
        let _ = self.events.send(event);
    }

    /// Decode one NOTIFY payload and publish it
    pub fn publish_payload(&self, payload: &str) -> Result<(), serde_json::Error> {
        let event: ChangeEvent = serde_json::from_str(payload)?;
        tracing::debug!("{:?} on {}", event.operation, event.table);
        self.publish(event);
        Ok(())
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Forward notifications from a Postgres channel until the hub is dropped
    pub fn listen(self: &Arc<Self>, pool: PgPool, channel: String) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = hub.forward(&pool, &channel).await {
                    tracing::error!("Change listener on {} failed: {}", channel, e);
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    async fn forward(&self, pool: &PgPool, channel: &str) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        tracing::info!("Listening for changes on {}", channel);

        loop {
            let notification = listener.recv().await?;
            if let Err(e) = self.publish_payload(notification.payload()) {
                tracing::warn!("Dropping malformed change payload: {}", e);
            }
        }
    }
}

impl ChangeFeed for ChangeHub {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}
