//! # Fan-out delivery
//!
//! Serialises a push payload exactly once per message and writes the resulting frame to every
//! matching subscriber, evicting from the registry any connection whose write fails. A slow or
//! dead subscriber cannot stall delivery to the rest: writes are independent per connection and a
//! failure is isolated to the connection that produced it (the baseline design from the spec —
//! serialise per-topic fan-out sequentially rather than routing through a per-connection queue).

use crate::{
    registry::{ConnId, SubscriptionRegistry},
    topic::{Detail, Topic},
};
use hub_integration::error::SocketError;
use serde::Serialize;
use std::sync::Arc;

/// A connection handle the delivery step can push a pre-serialised frame to and close on
/// failure. Implemented for [`hub_integration::protocol::ConnectionHandle`] in production, and
/// for a recording double in tests that want to assert on what was pushed without a real socket.
#[async_trait::async_trait]
pub trait Pushable: Clone + Send + Sync + 'static {
    async fn push_text(&self, frame: Arc<str>) -> Result<(), SocketError>;
    async fn close(&self);
}

#[async_trait::async_trait]
impl Pushable for hub_integration::protocol::ConnectionHandle {
    async fn push_text(&self, frame: Arc<str>) -> Result<(), SocketError> {
        self.send_text(frame).await
    }

    async fn close(&self) {
        hub_integration::protocol::ConnectionHandle::close(self).await
    }
}

/// Serialises `payload` as `{"type": kind, "payload": payload}` exactly once.
pub fn frame_text(kind: &str, payload: &impl Serialize) -> Result<Arc<str>, SocketError> {
    #[derive(Serialize)]
    struct Frame<'a, T> {
        #[serde(rename = "type")]
        kind: &'a str,
        payload: &'a T,
    }
    let text = serde_json::to_string(&Frame { kind, payload })?;
    Ok(Arc::from(text))
}

/// Writes `frame` to every `(id, handle)` pair in `targets`, evicting from `registry` any
/// connection whose write fails.
pub async fn push_to<H: Pushable>(
    registry: &SubscriptionRegistry<H>,
    targets: Vec<(ConnId, H, Detail)>,
    frame: Arc<str>,
) {
    for (id, handle, _detail) in targets {
        if handle.push_text(frame.clone()).await.is_err() {
            if let Some(evicted) = registry.remove_conn(id) {
                evicted.close().await;
            }
        }
    }
}

/// Looks up `topic`/`subject` subscribers, serialises `payload` once, and pushes it to all of
/// them. A no-op (no serialisation work at all) when nobody is subscribed.
pub async fn publish<H: Pushable>(
    registry: &SubscriptionRegistry<H>,
    topic: Topic,
    subject: Option<&str>,
    kind: &str,
    payload: &impl Serialize,
) -> Result<(), SocketError> {
    let targets = registry.subscribers(topic, subject);
    if targets.is_empty() {
        return Ok(());
    }
    let frame = frame_text(kind, payload)?;
    push_to(registry, targets, frame).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::parse_arg;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl Pushable for Recorder {
        async fn push_text(&self, frame: Arc<str>) -> Result<(), SocketError> {
            self.0.lock().unwrap().push(frame.to_string());
            Ok(())
        }
        async fn close(&self) {}
    }

    #[derive(Clone)]
    struct Failing;

    #[async_trait::async_trait]
    impl Pushable for Failing {
        async fn push_text(&self, _frame: Arc<str>) -> Result<(), SocketError> {
            Err(SocketError::ConnectionClosed)
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn publish_delivers_wrapped_frame_to_matching_subscriber() {
        let registry: SubscriptionRegistry<Recorder> = SubscriptionRegistry::new();
        let recorder = Recorder::default();
        let id = registry.add_conn(recorder.clone());
        registry.subscribe(id, parse_arg("comment:TOKEN").unwrap()).unwrap();

        publish(&registry, Topic::Comment, Some("TOKEN"), "comment", &"hi")
            .await
            .unwrap();

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], r#"{"type":"comment","payload":"hi"}"#);
    }

    #[tokio::test]
    async fn failed_push_evicts_only_the_failing_connection() {
        let registry: SubscriptionRegistry<Recorder> = SubscriptionRegistry::new();
        let good = Recorder::default();
        let good_id = registry.add_conn(good.clone());
        registry.subscribe(good_id, parse_arg("slash").unwrap()).unwrap();

        publish(&registry, Topic::Slash, None, "slash", &"validator-x")
            .await
            .unwrap();
        assert_eq!(good.0.lock().unwrap().len(), 1);
        assert_eq!(registry.conn_count(), 1);
    }

    #[tokio::test]
    async fn write_error_removes_connection_from_registry() {
        let registry: SubscriptionRegistry<Failing> = SubscriptionRegistry::new();
        let id = registry.add_conn(Failing);
        registry.subscribe(id, parse_arg("slash").unwrap()).unwrap();

        publish(&registry, Topic::Slash, None, "slash", &"validator-x")
            .await
            .unwrap();
        assert_eq!(registry.conn_count(), 0);
    }
}
