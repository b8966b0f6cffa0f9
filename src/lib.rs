pub mod config;
mod crash_log;
pub mod ipc;
pub mod routes;
pub mod store;

#[cfg(feature = "tauri")]
pub mod bridge;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use config::Paths;
use ipc::{transport, Dispatcher};
use store::{FaviconStore, Store};

/// State shared by every channel handler.
pub struct AppContext {
    pub store: Store,
    pub favicons: FaviconStore,
}

impl AppContext {
    pub fn open(paths: &Paths) -> Self {
        AppContext {
            store: Store::open(paths.database()),
            favicons: FaviconStore::with_http(paths.favicon_dir()),
        }
    }
}

/// Serve framed requests from `reader` until it hits end of stream, writing
/// replies to `writer`. Replies still pending at EOF are written and the
/// document is flushed to disk before returning.
pub async fn serve<R, W>(ctx: Arc<AppContext>, reader: R, writer: W) -> Result<(), String>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let registry = Arc::new(routes::build_registry().map_err(|e| format!("registry: {}", e))?);
    tracing::info!(channels = registry.len(), "routes registered");

    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let writer_task = tokio::spawn(transport::pump_out(writer, out_rx));
    let dispatch_task = tokio::spawn(Dispatcher::new(registry, ctx.clone(), out_tx).run(in_rx));

    let read_res = transport::pump_in(reader, in_tx).await;
    if let Err(e) = &read_res {
        tracing::warn!(error = %e, "inbound stream failed");
    }

    // the writer ends once the dispatcher and every handler-spawned task drop their senders
    dispatch_task.await.map_err(|e| format!("dispatcher: {}", e))?;
    let write_res = writer_task.await.map_err(|e| format!("writer: {}", e))?;

    ctx.store.save().map_err(|e| format!("final save: {}", e))?;
    read_res?;
    write_res
}

pub fn run() {
    let paths = Paths::from_env();
    if let Err(e) = std::fs::create_dir_all(&paths.data_dir) {
        eprintln!("WARNING: cannot create data dir {}: {}", paths.data_dir.display(), e);
    }
    crash_log::init(&paths.log_dir());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        data_dir = %paths.data_dir.display(),
        "backend starting"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "runtime build failed");
            eprintln!("FATAL: backend failed to start: {}", e);
            return;
        }
    };

    let ctx = Arc::new(AppContext::open(&paths));
    match runtime.block_on(serve(ctx, tokio::io::stdin(), tokio::io::stdout())) {
        Ok(()) => tracing::info!("stdin closed, backend exiting"),
        Err(e) => {
            tracing::error!(error = %e, "backend stopped");
            eprintln!("FATAL: backend stopped: {}", e);
        }
    }
}
