use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::registry::Registry;
use super::Envelope;

/// Addressing for an answer to one inbound request. Handlers may drop it
/// without replying.
#[derive(Clone)]
pub struct Reply {
    channel: String,
    id: Option<String>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl Reply {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Send `payload` back on the request's channel. `false` when it could not
    /// be serialized or the boundary is gone.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "reply not serializable");
                return false;
            }
        };
        let envelope = Envelope { channel: self.channel.clone(), payload, id: self.id.clone() };
        self.outbound.send(envelope).is_ok()
    }
}

/// Resolves inbound envelopes against a [`Registry`] and calls the matched
/// handler in place. Requests on unknown channels are dropped.
///
/// A handler's store mutations are visible as soon as `dispatch` returns, so
/// two requests dispatched in order apply in that order. Handlers that await
/// (favicon I/O) spawn their own task and answer from it.
pub struct Dispatcher<C> {
    registry: Arc<Registry<C>>,
    ctx: Arc<C>,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl<C> Dispatcher<C> {
    pub fn new(registry: Arc<Registry<C>>, ctx: Arc<C>, outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { registry, ctx, outbound }
    }

    /// Run the handler for `envelope`. Returns whether one was registered.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        let Some(handler) = self.registry.lookup(&envelope.channel) else {
            tracing::debug!(channel = %envelope.channel, "no handler, request dropped");
            return false;
        };
        tracing::trace!(channel = %envelope.channel, id = ?envelope.id, "dispatch");
        let reply = Reply { channel: envelope.channel, id: envelope.id, outbound: self.outbound.clone() };
        handler(self.ctx.clone(), envelope.payload, reply);
        true
    }

    /// Dispatch everything from `inbound` until it closes. Tasks spawned by
    /// handlers keep their `Reply`, so the outbound side stays open until the
    /// last of them has answered or given up.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<Envelope>) {
        let mut served = 0usize;
        while let Some(envelope) = inbound.recv().await {
            if self.dispatch(envelope) {
                served += 1;
            }
        }
        tracing::debug!(served, "inbound closed");
    }
}
