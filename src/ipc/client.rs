use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::{Endpoint, Envelope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    Timeout,
    /// The boundary closed before a reply arrived.
    Disconnected,
    Encode(String),
    Decode(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Timeout => write!(f, "timed out waiting for reply"),
            ClientError::Disconnected => write!(f, "boundary closed"),
            ClientError::Encode(e) => write!(f, "encode: {}", e),
            ClientError::Decode(e) => write!(f, "decode: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

struct Waiter {
    id: String,
    tx: oneshot::Sender<Value>,
}

#[derive(Default)]
struct Pending {
    closed: bool,
    // per channel, oldest call first
    waiting: HashMap<String, VecDeque<Waiter>>,
}

/// Calling side of the boundary.
///
/// Every call is tagged with a fresh correlation id and resolved by the reply
/// echoing it. A reply without an id resolves the oldest live call on its
/// channel instead. There is no built-in timeout on [`send`](Self::send).
#[derive(Clone)]
pub struct ChannelClient {
    outbound: mpsc::UnboundedSender<Envelope>,
    pending: Arc<Mutex<Pending>>,
}

impl ChannelClient {
    /// Must be called inside a tokio runtime: spawns the reply router.
    pub fn new(outbound: mpsc::UnboundedSender<Envelope>, inbound: mpsc::UnboundedReceiver<Envelope>) -> Self {
        let pending = Arc::new(Mutex::new(Pending::default()));
        tokio::spawn(route_replies(inbound, pending.clone()));
        Self { outbound, pending }
    }

    pub fn from_endpoint(endpoint: Endpoint) -> Self {
        Self::new(endpoint.tx, endpoint.rx)
    }

    /// Resolves with the first matching reply; stays pending forever if none
    /// comes. Dropping the future withdraws the call.
    pub async fn send<T: Serialize>(&self, channel: &str, payload: T) -> Result<Value, ClientError> {
        let call = self.start(channel, payload)?;
        call.wait().await
    }

    pub async fn send_timeout<T: Serialize>(&self, channel: &str, payload: T, wait: Duration) -> Result<Value, ClientError> {
        let call = self.start(channel, payload)?;
        tokio::time::timeout(wait, call.wait())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// [`send`](Self::send) followed by decoding the reply payload.
    pub async fn call<T: Serialize, R: DeserializeOwned>(&self, channel: &str, payload: T) -> Result<R, ClientError> {
        let value = self.send(channel, payload).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Calls still waiting on `channel`.
    pub fn pending(&self, channel: &str) -> usize {
        self.pending.lock().waiting.get(channel).map_or(0, |q| q.len())
    }

    fn start<T: Serialize>(&self, channel: &str, payload: T) -> Result<PendingCall, ClientError> {
        let payload = serde_json::to_value(payload).map_err(|e| ClientError::Encode(e.to_string()))?;
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(ClientError::Disconnected);
            }
            pending
                .waiting
                .entry(channel.to_string())
                .or_default()
                .push_back(Waiter { id: id.clone(), tx });
        }
        let call = PendingCall { pending: self.pending.clone(), channel: channel.to_string(), id, rx };

        let envelope = Envelope { channel: call.channel.clone(), payload, id: Some(call.id.clone()) };
        if self.outbound.send(envelope).is_err() {
            return Err(ClientError::Disconnected);
        }
        Ok(call)
    }
}

/// One outstanding call. Its waiter is withdrawn on drop, whether the reply
/// arrived, the caller timed out, or the future was abandoned.
struct PendingCall {
    pending: Arc<Mutex<Pending>>,
    channel: String,
    id: String,
    rx: oneshot::Receiver<Value>,
}

impl PendingCall {
    async fn wait(mut self) -> Result<Value, ClientError> {
        (&mut self.rx).await.map_err(|_| ClientError::Disconnected)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if let Some(queue) = pending.waiting.get_mut(&self.channel) {
            queue.retain(|w| w.id != self.id);
            if queue.is_empty() {
                pending.waiting.remove(&self.channel);
            }
        }
    }
}

async fn route_replies(mut inbound: mpsc::UnboundedReceiver<Envelope>, pending: Arc<Mutex<Pending>>) {
    while let Some(envelope) = inbound.recv().await {
        match take_waiter(&pending, &envelope) {
            Some(tx) => {
                let _ = tx.send(envelope.payload);
            }
            None => tracing::trace!(channel = %envelope.channel, id = ?envelope.id, "reply with no waiting call"),
        }
    }
    // dropping the senders fails every outstanding call with Disconnected
    let mut pending = pending.lock();
    pending.closed = true;
    pending.waiting.clear();
}

fn take_waiter(pending: &Mutex<Pending>, envelope: &Envelope) -> Option<oneshot::Sender<Value>> {
    let mut pending = pending.lock();
    let queue = pending.waiting.get_mut(&envelope.channel)?;
    // callers that gave up must not swallow a reply
    queue.retain(|w| !w.tx.is_closed());
    let idx = match &envelope.id {
        Some(id) => queue.iter().position(|w| &w.id == id),
        None if queue.is_empty() => None,
        None => Some(0),
    };
    let waiter = idx.and_then(|i| queue.remove(i));
    if queue.is_empty() {
        pending.waiting.remove(&envelope.channel);
    }
    waiter.map(|w| w.tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::linked_pair;
    use serde_json::json;

    #[tokio::test]
    async fn reply_resolves_matching_call() {
        let (ui, mut backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.send("test/ping", json!({"ping": "hello"})).await }
        });

        let req = backend.rx.recv().await.unwrap();
        assert_eq!(req.channel, "test/ping");
        assert!(req.id.is_some());
        backend.tx.send(Envelope { payload: json!({"pong": "world"}), ..req }).unwrap();

        assert_eq!(call.await.unwrap(), Ok(json!({"pong": "world"})));
        assert_eq!(client.pending("test/ping"), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_on_one_channel_get_their_own_reply() {
        let (ui, mut backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let first = tokio::spawn({
            let c = client.clone();
            async move { c.send("echo", json!("first")).await }
        });
        let a = backend.rx.recv().await.unwrap();
        let second = tokio::spawn({
            let c = client.clone();
            async move { c.send("echo", json!("second")).await }
        });
        let b = backend.rx.recv().await.unwrap();

        // answer out of order
        backend.tx.send(Envelope { payload: json!("re: second"), ..b }).unwrap();
        backend.tx.send(Envelope { payload: json!("re: first"), ..a }).unwrap();

        assert_eq!(first.await.unwrap(), Ok(json!("re: first")));
        assert_eq!(second.await.unwrap(), Ok(json!("re: second")));
    }

    #[tokio::test]
    async fn uncorrelated_reply_goes_to_oldest_call() {
        let (ui, mut backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let first = tokio::spawn({
            let c = client.clone();
            async move { c.send("load", Value::Null).await }
        });
        backend.rx.recv().await.unwrap();
        let second = tokio::spawn({
            let c = client.clone();
            async move { c.send("load", Value::Null).await }
        });
        backend.rx.recv().await.unwrap();

        backend.tx.send(Envelope::new("load", json!(1))).unwrap();
        assert_eq!(first.await.unwrap(), Ok(json!(1)));
        assert_eq!(client.pending("load"), 1);

        backend.tx.send(Envelope::new("load", json!(2))).unwrap();
        assert_eq!(second.await.unwrap(), Ok(json!(2)));
    }

    #[tokio::test]
    async fn no_reply_times_out_and_cleans_up() {
        let (ui, _backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let res = client.send_timeout("void", Value::Null, Duration::from_millis(50)).await;
        assert_eq!(res, Err(ClientError::Timeout));
        assert_eq!(client.pending("void"), 0);
    }

    #[tokio::test]
    async fn abandoned_calls_do_not_linger() {
        let (ui, _backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        for _ in 0..50 {
            let res = tokio::time::timeout(Duration::from_millis(1), client.send("data/themeImage/load", Value::Null)).await;
            assert!(res.is_err());
        }
        assert_eq!(client.pending("data/themeImage/load"), 0);
    }

    #[tokio::test]
    async fn stale_reply_clears_emptied_queue() {
        let (ui, mut backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let (tx, rx) = oneshot::channel();
        client.pending.lock().waiting.entry("late".into()).or_default().push_back(Waiter { id: "gone".into(), tx });
        drop(rx);

        backend.tx.send(Envelope::new("late", json!(1)).with_id("other")).unwrap();
        // a round trip on another channel proves the stale reply was routed
        let call = tokio::spawn({
            let c = client.clone();
            async move { c.send("sync", Value::Null).await }
        });
        let req = backend.rx.recv().await.unwrap();
        backend.tx.send(Envelope { payload: json!("ok"), ..req }).unwrap();
        assert_eq!(call.await.unwrap(), Ok(json!("ok")));

        assert!(client.pending.lock().waiting.is_empty());
    }

    #[tokio::test]
    async fn closed_boundary_fails_pending_calls() {
        let (ui, backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let call = tokio::spawn({
            let c = client.clone();
            async move { c.send("data/history/load", Value::Null).await }
        });
        tokio::task::yield_now().await;
        drop(backend);

        assert_eq!(call.await.unwrap(), Err(ClientError::Disconnected));
        assert_eq!(client.send("x", Value::Null).await, Err(ClientError::Disconnected));
    }

    #[tokio::test]
    async fn call_decodes_reply() {
        let (ui, mut backend) = linked_pair();
        let client = ChannelClient::from_endpoint(ui);

        let call = tokio::spawn({
            let c = client.clone();
            async move { c.call::<_, Vec<String>>("list", Value::Null).await }
        });
        let req = backend.rx.recv().await.unwrap();
        backend.tx.send(Envelope { payload: json!(["a", "b"]), ..req }).unwrap();
        assert_eq!(call.await.unwrap(), Ok(vec!["a".to_string(), "b".to_string()]));
    }
}
