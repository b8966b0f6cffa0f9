//! Request/response plumbing across the UI ↔ backend process boundary.
//!
//! Both directions carry the same [`Envelope`]. The backend side runs a
//! [`Dispatcher`] over a [`Registry`] of channel handlers; the calling side
//! uses a [`ChannelClient`]. Bytes on the real boundary are framed by
//! [`transport`]; in-process users and tests connect the two ends with
//! [`linked_pair`].

pub mod client;
pub mod dispatcher;
pub mod registry;
pub mod transport;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use client::{ChannelClient, ClientError};
pub use dispatcher::{Dispatcher, Reply};
pub use registry::{Handler, Registry, RegistryError, Route};

/// `{ channel, payload, id? }`. A reply reuses the request's channel and id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
    /// Per-call correlation id. Senders that omit it get first-come matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self { channel: channel.into(), payload, id: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// One side of a connected boundary.
pub struct Endpoint {
    pub tx: mpsc::UnboundedSender<Envelope>,
    pub rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Two endpoints wired back to back: what one sends, the other receives.
pub fn linked_pair() -> (Endpoint, Endpoint) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (Endpoint { tx: a_tx, rx: a_rx }, Endpoint { tx: b_tx, rx: b_rx })
}
