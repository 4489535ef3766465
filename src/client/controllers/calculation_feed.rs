use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::client::services::realtime::RealtimeConnector;

/// How many calculation events the feed retains.
pub const FEED_CAP: usize = 20;

const CALCULATION_EVENT: &str = "calculation.performed";

#[derive(Debug, Clone)]
pub struct CalculationEvent {
    pub id: String,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

/// Live feed of sample calculation events from the configured broadcast
/// channel. Keeps the newest [`FEED_CAP`] entries, newest first.
pub struct CalculationFeed {
    realtime: Arc<dyn RealtimeConnector>,
    channel: String,
    events: Mutex<VecDeque<CalculationEvent>>,
    connected: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CalculationFeed {
    pub fn new(realtime: Arc<dyn RealtimeConnector>, channel: impl Into<String>) -> Self {
        Self {
            realtime,
            channel: channel.into(),
            events: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut subscription = self.realtime.subscribe(&self.channel).await?;
        self.connected.store(true, Ordering::SeqCst);

        let feed = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                if envelope.event != CALCULATION_EVENT {
                    continue;
                }
                let event = CalculationEvent {
                    id: uuid::Uuid::new_v4().to_string(),
                    payload: envelope.payload,
                    recorded_at: envelope.timestamp.unwrap_or_else(Utc::now),
                };
                let mut events = feed.events.lock().unwrap();
                events.push_front(event);
                events.truncate(FEED_CAP);
            }
            feed.connected.store(false, Ordering::SeqCst);
        });
        *self.task.lock().unwrap() = Some(task);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<CalculationEvent> {
        self.events.lock().unwrap().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::services::realtime::RealtimeEnvelope;
    use crate::client::test_support::FakeRealtimeConnector;
    use serde_json::json;

    #[tokio::test]
    async fn retains_the_newest_events_up_to_the_cap() {
        let realtime = Arc::new(FakeRealtimeConnector::default());
        let feed = Arc::new(CalculationFeed::new(realtime.clone(), "calculations"));
        feed.start().await.unwrap();
        assert!(feed.is_connected());

        for i in 0..(FEED_CAP + 5) {
            realtime.emit(
                "calculations",
                RealtimeEnvelope {
                    event: "calculation.performed".to_string(),
                    payload: json!({ "result": i }),
                    timestamp: None,
                },
            );
        }
        // Unrelated events are ignored.
        realtime.emit(
            "calculations",
            RealtimeEnvelope {
                event: "something.else".to_string(),
                payload: json!({}),
                timestamp: None,
            },
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let events = feed.events();
        assert_eq!(events.len(), FEED_CAP);
        assert_eq!(events[0].payload["result"], json!(FEED_CAP + 4));
        feed.stop();
        assert!(!feed.is_connected());
    }
}
