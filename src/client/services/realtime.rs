use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Envelope delivered on every pub/sub topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireFrame {
    #[serde(default)]
    topic: Option<String>,
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Cancellable handle on one topic subscription. Dropping it (or calling
/// [`RealtimeSubscription::unsubscribe`]) tears the underlying socket task
/// down; the receiver then drains and closes.
pub struct RealtimeSubscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<RealtimeEnvelope>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Builds a subscription around an existing channel. In-memory connectors
    /// (tests, replays) use this directly.
    pub fn new(
        topic: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<RealtimeEnvelope>,
    ) -> Self {
        Self {
            topic: topic.into(),
            receiver,
            task: None,
        }
    }

    fn with_task(
        topic: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<RealtimeEnvelope>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            topic: topic.into(),
            receiver,
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<RealtimeEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RealtimeEnvelope> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Produces topic subscriptions. The websocket client is the production
/// implementation; controllers only see this trait.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn subscribe(&self, topic: &str) -> anyhow::Result<RealtimeSubscription>;
}

/// One websocket connection per subscription: connect, announce the topic
/// with a join frame, then forward every matching broadcast frame into the
/// subscription channel.
pub struct WebsocketRealtimeClient {
    ws_url: String,
}

impl WebsocketRealtimeClient {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
        }
    }
}

#[async_trait]
impl RealtimeConnector for WebsocketRealtimeClient {
    async fn subscribe(&self, topic: &str) -> anyhow::Result<RealtimeSubscription> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| anyhow::anyhow!("realtime connection failed: {}", e))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let join = serde_json::json!({
            "topic": topic,
            "event": "phx_join",
            "payload": {},
            "ref": uuid::Uuid::new_v4().to_string(),
        });
        ws_sender
            .send(Message::Text(join.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("realtime join failed: {}", e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let topic_owned = topic.to_string();
        let task = tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let frame: WireFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                log::warn!("[REALTIME] unparseable frame on {}: {}", topic_owned, e);
                                continue;
                            }
                        };
                        if frame.topic.as_deref() != Some(topic_owned.as_str()) {
                            continue;
                        }
                        // Protocol frames (join acks, heartbeats) are not
                        // application events.
                        if frame.event.starts_with("phx_") {
                            continue;
                        }
                        let envelope = RealtimeEnvelope {
                            event: frame.event,
                            payload: frame.payload,
                            timestamp: frame.timestamp,
                        };
                        if tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if ws_sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("[REALTIME] server closed channel {}", topic_owned);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("[REALTIME] channel {} failed: {}", topic_owned, e);
                        break;
                    }
                }
            }
        });

        Ok(RealtimeSubscription::with_task(topic, rx, task))
    }
}
