//! Channel definitions. Each submodule lists its routes; [`build_registry`]
//! collects all of them once at startup.

pub mod data;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::ipc::{Registry, RegistryError, Reply, Route};
use crate::store::StoreError;
use crate::AppContext;

pub const COMPLETE: &str = "complete";
pub const FAILURE: &str = "failure";

pub type RouteList = fn() -> Vec<Route<AppContext>>;

/// Every route-definition module served by the backend.
pub const ROUTE_MODULES: &[RouteList] = &[test::routes, data::routes];

pub fn build_registry() -> Result<Registry<AppContext>, RegistryError> {
    let registry = Registry::from_routes(ROUTE_MODULES.iter().flat_map(|routes| routes()))?;
    tracing::debug!(channels = registry.len(), "registry built");
    Ok(registry)
}

/// Decode a request payload, logging what the caller got wrong.
pub(crate) fn parse<T: DeserializeOwned>(reply: &Reply, payload: Value) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(channel = reply.channel(), error = %e, "bad payload");
            None
        }
    }
}

/// Answer with `"complete"` / `"failure"`.
pub(crate) fn send_status(reply: &Reply, result: Result<(), StoreError>) {
    let status = match result {
        Ok(()) => COMPLETE,
        Err(e) => {
            tracing::warn!(channel = reply.channel(), error = %e, "request failed");
            FAILURE
        }
    };
    reply.send(status);
}

#[cfg(test)]
pub(crate) mod harness {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::sync::mpsc;

    use crate::ipc::{linked_pair, ChannelClient, Dispatcher, Envelope};
    use crate::store::test_util::{cleanup, temp_dir};
    use crate::store::{FaviconFetcher, FaviconStore, Store};
    use crate::AppContext;

    pub const WAIT: Duration = Duration::from_secs(2);

    pub fn context(dir: &Path, fetcher: Arc<dyn FaviconFetcher>) -> Arc<AppContext> {
        Arc::new(AppContext {
            store: Store::open(dir.join("database.json")),
            favicons: FaviconStore::new(dir.join("favicon"), fetcher),
        })
    }

    /// Dispatcher over every route; its replies land on the returned receiver.
    pub fn direct(ctx: Arc<AppContext>) -> (Dispatcher<AppContext>, mpsc::UnboundedReceiver<Envelope>) {
        let registry = Arc::new(super::build_registry().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        (Dispatcher::new(registry, ctx, tx), rx)
    }

    /// Backend wired to a client through an in-process boundary.
    pub struct Harness {
        pub dir: PathBuf,
        pub ctx: Arc<AppContext>,
        pub client: ChannelClient,
    }

    impl Harness {
        pub fn start(fetcher: Arc<dyn FaviconFetcher>) -> Self {
            let dir = temp_dir("routes");
            let ctx = context(&dir, fetcher);
            let registry = Arc::new(super::build_registry().unwrap());
            let (ui, backend) = linked_pair();
            let dispatcher = Dispatcher::new(registry, ctx.clone(), backend.tx);
            tokio::spawn(dispatcher.run(backend.rx));
            Harness { dir, ctx, client: ChannelClient::from_endpoint(ui) }
        }

        pub async fn send(&self, channel: &str, payload: Value) -> Value {
            self.client.send_timeout(channel, payload, WAIT).await.unwrap()
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            cleanup(&self.dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declared_channel_is_registered_once() {
        let registry = build_registry().unwrap();
        for channel in [
            "test/ping",
            "data/history/load",
            "data/history/add",
            "data/history/remove",
            "data/bookmarks/load",
            "data/bookmarks/add",
            "data/bookmarks/remove",
            "data/themeImage/load",
            "data/themeImage/set",
        ] {
            assert!(registry.lookup(channel).is_some(), "{} missing", channel);
        }
        let total: usize = ROUTE_MODULES.iter().map(|routes| routes().len()).sum();
        assert_eq!(registry.len(), total);
    }
}
