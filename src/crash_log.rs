use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

const CRASH_FILE: &str = "crash.log";
const ROTATE_BYTES: u64 = 2 * 1024 * 1024;
const KEEP_LOGS: usize = 5;

/// Install the panic hook and the tracing subscriber.
/// Must be called early in `run()` before any async work.
pub fn init(log_dir: &Path) {
    let _ = fs::create_dir_all(log_dir);

    rotate_logs(log_dir);
    init_tracing();

    std::panic::set_hook(crash_hook(log_dir.join(CRASH_FILE), std::panic::take_hook()));
}

// writes the report to the crash file only; `next` (the default hook) owns stderr
fn crash_hook(crash_file: PathBuf, next: PanicHook) -> PanicHook {
    Box::new(move |info| {
        append(&crash_file, &format_panic(info));
        next(info);
    })
}

/// stdout carries IPC frames, so every log line goes to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn append(path: &Path, msg: &str) {
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = f.write_all(msg.as_bytes());
        let _ = f.write_all(b"\n");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

// one report per panic; the backtrace goes last since it is the long part
fn format_panic(info: &PanicHookInfo) -> String {
    let at = info
        .location()
        .map_or_else(|| "?".to_string(), |l| format!("{}:{}", l.file(), l.line()));
    let thread = std::thread::current();

    format!(
        "--- panic {} ---\n\
         backend {} pid {} thread {}\n\
         at {}: {}\n\
         {}\n",
        chrono::Local::now().to_rfc3339(),
        env!("CARGO_PKG_VERSION"),
        std::process::id(),
        thread.name().unwrap_or("<unnamed>"),
        at,
        panic_message(info.payload()),
        std::backtrace::Backtrace::force_capture()
    )
}

// crash.log → crash.1.log → … → crash.5.log once it passes 2MB
fn rotate_logs(log_dir: &Path) {
    let crash_log = log_dir.join(CRASH_FILE);
    let Ok(meta) = fs::metadata(&crash_log) else {
        return;
    };
    if meta.len() <= ROTATE_BYTES {
        return;
    }
    for i in (1..KEEP_LOGS).rev() {
        let from = log_dir.join(format!("crash.{}.log", i));
        let to = log_dir.join(format!("crash.{}.log", i + 1));
        let _ = fs::rename(&from, &to);
    }
    let _ = fs::rename(&crash_log, log_dir.join("crash.1.log"));
}
