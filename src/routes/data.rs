//! `data/*` channels: browsing state held by the document store.
//!
//! Mutations only touch memory; the UI calls `data/save` (and the backend
//! saves on shutdown) to make them durable.

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{parse, send_status};
use crate::ipc::{Reply, Route};
use crate::store::{BookmarkEntry, SearchHistoryEntry, Settings, StoreError, VisitHistoryEntry};
use crate::AppContext;

pub const HISTORY_LOAD: &str = "data/history/load";
pub const HISTORY_ADD: &str = "data/history/add";
pub const HISTORY_UPDATE: &str = "data/history/update";
pub const HISTORY_REMOVE: &str = "data/history/remove";
pub const BOOKMARKS_LOAD: &str = "data/bookmarks/load";
pub const BOOKMARKS_ADD: &str = "data/bookmarks/add";
pub const BOOKMARKS_UPDATE: &str = "data/bookmarks/update";
pub const BOOKMARKS_REMOVE: &str = "data/bookmarks/remove";
pub const SEARCH_HISTORY_LOAD: &str = "data/searchHistory/load";
pub const SEARCH_HISTORY_ADD: &str = "data/searchHistory/add";
pub const SEARCH_HISTORY_REMOVE: &str = "data/searchHistory/remove";
pub const SETTINGS_LOAD: &str = "data/settings/load";
pub const SETTINGS_SET: &str = "data/settings/set";
pub const FAVICON_SAVE: &str = "data/favicon/save";
pub const FAVICON_LOAD: &str = "data/favicon/load";
pub const THEME_IMAGE_LOAD: &str = "data/themeImage/load";
pub const THEME_IMAGE_SET: &str = "data/themeImage/set";
pub const SAVE: &str = "data/save";

#[derive(Debug, Deserialize)]
struct UpdateRequest<T> {
    id: String,
    entry: T,
}

pub fn routes() -> Vec<Route<AppContext>> {
    vec![
        Route { channel: HISTORY_LOAD, handler: history_load },
        Route { channel: HISTORY_ADD, handler: history_add },
        Route { channel: HISTORY_UPDATE, handler: history_update },
        Route { channel: HISTORY_REMOVE, handler: history_remove },
        Route { channel: BOOKMARKS_LOAD, handler: bookmarks_load },
        Route { channel: BOOKMARKS_ADD, handler: bookmarks_add },
        Route { channel: BOOKMARKS_UPDATE, handler: bookmarks_update },
        Route { channel: BOOKMARKS_REMOVE, handler: bookmarks_remove },
        Route { channel: SEARCH_HISTORY_LOAD, handler: search_history_load },
        Route { channel: SEARCH_HISTORY_ADD, handler: search_history_add },
        Route { channel: SEARCH_HISTORY_REMOVE, handler: search_history_remove },
        Route { channel: SETTINGS_LOAD, handler: settings_load },
        Route { channel: SETTINGS_SET, handler: settings_set },
        Route { channel: FAVICON_SAVE, handler: favicon_save },
        Route { channel: FAVICON_LOAD, handler: favicon_load },
        Route { channel: THEME_IMAGE_LOAD, handler: theme_image },
        Route { channel: THEME_IMAGE_SET, handler: theme_image },
        Route { channel: SAVE, handler: save },
    ]
}

fn bad_payload() -> Result<(), StoreError> {
    Err(StoreError::Invalid("payload".into()))
}

// ── history ──

fn history_load(ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    let history = ctx.store.visit_history().all();
    tracing::debug!(count = history.len(), "history load");
    reply.send(&history);
}

fn history_add(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<VisitHistoryEntry>(&reply, payload) {
        Some(entry) => ctx.store.visit_history().add(entry),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

fn history_update(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<UpdateRequest<VisitHistoryEntry>>(&reply, payload) {
        Some(req) => ctx.store.visit_history().update(req.entry, &req.id),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

fn history_remove(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<String>(&reply, payload) {
        Some(id) => ctx.store.visit_history().remove(&id),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

// ── bookmarks ──

fn bookmarks_load(ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    reply.send(&ctx.store.bookmarks().all());
}

fn bookmarks_add(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<BookmarkEntry>(&reply, payload) {
        Some(entry) => ctx.store.bookmarks().add(entry),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

fn bookmarks_update(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<UpdateRequest<BookmarkEntry>>(&reply, payload) {
        Some(req) => ctx.store.bookmarks().update(req.entry, &req.id),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

fn bookmarks_remove(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<String>(&reply, payload) {
        Some(id) => ctx.store.bookmarks().remove(&id),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

// ── search history ──

fn search_history_load(ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    reply.send(&ctx.store.search_history().all());
}

fn search_history_add(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<SearchHistoryEntry>(&reply, payload) {
        Some(entry) => ctx.store.search_history().add(entry),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

fn search_history_remove(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<usize>(&reply, payload) {
        Some(index) => ctx.store.search_history().remove(index),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

// ── settings ──

fn settings_load(ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    reply.send(&ctx.store.settings().get());
}

fn settings_set(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let result = match parse::<Settings>(&reply, payload) {
        Some(settings) => ctx.store.settings().set(settings),
        None => bad_payload(),
    };
    send_status(&reply, result);
}

// ── favicons ──

// replies with the new asset id, or null
fn favicon_save(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let Some(url) = parse::<String>(&reply, payload) else {
        reply.send(&Value::Null);
        return;
    };
    tokio::spawn(async move {
        let id = ctx.favicons.save(&url).await;
        reply.send(&id);
    });
}

// replies with base64 bytes, or null
fn favicon_load(ctx: Arc<AppContext>, payload: Value, reply: Reply) {
    let Some(id) = parse::<String>(&reply, payload) else {
        reply.send(&Value::Null);
        return;
    };
    tokio::spawn(async move {
        let data = ctx.favicons.load(&id).await;
        let encoded = data.map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));
        reply.send(&encoded);
    });
}

// ── misc ──

// TODO: theme images need an asset slot next to favicons before these can answer
fn theme_image(_ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    tracing::warn!(channel = reply.channel(), "not implemented, no reply sent");
}

fn save(ctx: Arc<AppContext>, _payload: Value, reply: Reply) {
    send_status(&reply, ctx.store.save());
}

#[cfg(test)]
mod tests {
    use super::super::harness::{context, direct, Harness};
    use super::super::{COMPLETE, FAILURE};
    use super::*;
    use crate::ipc::{ClientError, Envelope};
    use crate::store::test_util::{cleanup, temp_dir};
    use crate::store::{FaviconFetcher, HttpFetcher, Store};
    use futures_util::future::BoxFuture;
    use serde_json::json;
    use std::time::Duration;

    struct OneIcon;

    impl FaviconFetcher for OneIcon {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, String>> {
            Box::pin(async move {
                if url == "https://rust-lang.org/favicon.ico" {
                    Ok(vec![0, 159, 146, 150, 255])
                } else {
                    Err("unreachable".to_string())
                }
            })
        }
    }

    fn harness() -> Harness {
        Harness::start(Arc::new(HttpFetcher::new()))
    }

    fn visit(id: &str) -> Value {
        json!({"id": id, "url": format!("https://{}.example", id), "title": id, "timestamp": 1_700_000_000_000i64})
    }

    #[tokio::test]
    async fn history_add_load_remove() {
        let h = harness();
        assert_eq!(h.send(HISTORY_LOAD, Value::Null).await, json!([]));

        assert_eq!(h.send(HISTORY_ADD, visit("h1")).await, json!(COMPLETE));
        assert_eq!(h.send(HISTORY_ADD, visit("h2")).await, json!(COMPLETE));
        assert_eq!(h.send(HISTORY_LOAD, Value::Null).await, json!([visit("h1"), visit("h2")]));

        assert_eq!(h.send(HISTORY_REMOVE, json!("h1")).await, json!(COMPLETE));
        assert_eq!(h.send(HISTORY_REMOVE, json!("h1")).await, json!(FAILURE));
        assert_eq!(h.send(HISTORY_LOAD, Value::Null).await, json!([visit("h2")]));
    }

    #[test]
    fn mutations_land_before_dispatch_returns() {
        let dir = temp_dir("routes");
        let ctx = context(&dir, Arc::new(HttpFetcher::new()));
        let (dispatcher, mut out) = direct(ctx.clone());

        assert!(dispatcher.dispatch(Envelope::new(HISTORY_ADD, visit("h1"))));
        assert_eq!(ctx.store.visit_history().all().len(), 1);
        assert!(dispatcher.dispatch(Envelope::new(HISTORY_REMOVE, json!("h1"))));
        assert!(ctx.store.visit_history().all().is_empty());

        assert_eq!(out.try_recv().unwrap().payload, json!(COMPLETE));
        assert_eq!(out.try_recv().unwrap().payload, json!(COMPLETE));
        cleanup(&dir);
    }

    #[tokio::test]
    async fn bookmarks_add_update_remove() {
        let h = harness();
        let bookmark = json!({"id": "b1", "url": "https://tauri.app", "title": "Tauri", "timestamp": 1, "folderId": "root"});

        assert_eq!(h.send(BOOKMARKS_ADD, bookmark.clone()).await, json!(COMPLETE));
        assert_eq!(h.send(BOOKMARKS_LOAD, Value::Null).await, json!([bookmark]));

        let renamed = json!({"id": "b1", "url": "https://tauri.app", "title": "Tauri 2", "timestamp": 2});
        assert_eq!(h.send(BOOKMARKS_UPDATE, json!({"id": "b1", "entry": renamed})).await, json!(COMPLETE));
        assert_eq!(h.send(BOOKMARKS_UPDATE, json!({"id": "nope", "entry": renamed})).await, json!(FAILURE));
        assert_eq!(h.ctx.store.bookmarks().find_by_id("b1").unwrap().title, "Tauri 2");

        assert_eq!(h.send(BOOKMARKS_REMOVE, json!("b1")).await, json!(COMPLETE));
        assert_eq!(h.send(BOOKMARKS_LOAD, Value::Null).await, json!([]));
    }

    #[tokio::test]
    async fn malformed_payload_is_failure() {
        let h = harness();
        assert_eq!(h.send(BOOKMARKS_ADD, json!({"title": "no id"})).await, json!(FAILURE));
        assert_eq!(h.send(HISTORY_REMOVE, json!(42)).await, json!(FAILURE));
        assert!(h.ctx.store.bookmarks().all().is_empty());
    }

    #[tokio::test]
    async fn search_history_and_settings() {
        let h = harness();
        let search = json!({"text": "rust", "link": "https://duckduckgo.com/?q=rust"});
        assert_eq!(h.send(SEARCH_HISTORY_ADD, search.clone()).await, json!(COMPLETE));
        assert_eq!(h.send(SEARCH_HISTORY_LOAD, Value::Null).await, json!([search]));
        assert_eq!(h.send(SEARCH_HISTORY_REMOVE, json!(3)).await, json!(FAILURE));
        assert_eq!(h.send(SEARCH_HISTORY_REMOVE, json!(0)).await, json!(COMPLETE));

        assert_eq!(h.send(SETTINGS_LOAD, Value::Null).await, json!({}));
        let settings = json!({"searchEngine": "Google", "compactMode": true});
        assert_eq!(h.send(SETTINGS_SET, settings.clone()).await, json!(COMPLETE));
        assert_eq!(h.send(SETTINGS_LOAD, Value::Null).await, settings);
    }

    #[tokio::test]
    async fn save_persists_document() {
        let h = harness();
        h.send(HISTORY_ADD, visit("h1")).await;
        assert!(!h.ctx.store.path().exists());

        assert_eq!(h.send(SAVE, Value::Null).await, json!(COMPLETE));
        let reopened = Store::open(h.ctx.store.path());
        assert_eq!(reopened.document(), h.ctx.store.document());
    }

    #[tokio::test]
    async fn favicon_save_and_load() {
        let h = Harness::start(Arc::new(OneIcon));

        let id = h.send(FAVICON_SAVE, json!("https://rust-lang.org/favicon.ico")).await;
        let id = id.as_str().unwrap().to_string();
        assert_eq!(id.len(), 64);

        let data = h.send(FAVICON_LOAD, json!(id)).await;
        let bytes = base64::engine::general_purpose::STANDARD.decode(data.as_str().unwrap()).unwrap();
        assert_eq!(bytes, vec![0, 159, 146, 150, 255]);

        assert_eq!(h.send(FAVICON_SAVE, json!("https://offline.example/x.ico")).await, Value::Null);
        assert_eq!(h.send(FAVICON_LOAD, json!("0".repeat(64))).await, Value::Null);
    }

    #[tokio::test]
    async fn theme_image_channels_stay_silent() {
        let h = harness();
        for channel in [THEME_IMAGE_LOAD, THEME_IMAGE_SET] {
            let res = h.client.send_timeout(channel, Value::Null, Duration::from_millis(100)).await;
            assert_eq!(res, Err(ClientError::Timeout));
        }
    }
}
