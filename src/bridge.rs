//! Tauri front door: the webview calls `plugin:browser-ipc|ipc_send` and
//! gets its reply as an event on the request's channel.

use std::sync::Arc;

use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Emitter, Manager, RunEvent, Runtime, State};
use tokio::sync::mpsc;

use crate::ipc::{Dispatcher, Envelope};
use crate::{routes, AppContext};

const WINDOW: &str = "main";

pub struct BridgeState {
    dispatcher: Dispatcher<AppContext>,
}

#[tauri::command]
async fn ipc_send(state: State<'_, BridgeState>, envelope: Envelope) -> Result<bool, String> {
    Ok(state.dispatcher.dispatch(envelope))
}

pub fn init<R: Runtime>(ctx: Arc<AppContext>) -> Result<TauriPlugin<R>, String> {
    let registry = Arc::new(routes::build_registry().map_err(|e| format!("registry: {}", e))?);
    let exit_ctx = ctx.clone();

    Ok(Builder::new("browser-ipc")
        .invoke_handler(tauri::generate_handler![ipc_send])
        .setup(move |app, _api| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
            app.manage(BridgeState { dispatcher: Dispatcher::new(registry, ctx, tx) });

            let handle = app.clone();
            tauri::async_runtime::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    if let Err(e) = handle.emit_to(WINDOW, &envelope.channel, envelope.clone()) {
                        tracing::warn!(channel = %envelope.channel, error = %e, "reply emit failed");
                    }
                }
            });
            Ok(())
        })
        .on_event(move |_app, event| save_on_exit(&exit_ctx, event))
        .build())
}

fn save_on_exit(ctx: &AppContext, event: &RunEvent) {
    if let RunEvent::Exit = event {
        if let Err(e) = ctx.store.save() {
            tracing::error!(error = %e, "save on exit failed");
        }
    }
}
