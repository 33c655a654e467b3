//! Shared tokio runtime for the blocking entry points.
//!
//! Async callers never touch this; it only backs [`Client::call_blocking`]
//! and friends for code that lives outside a runtime.
//!
//! [`Client::call_blocking`]: crate::client::Client::call_blocking

use std::sync::OnceLock;

use tokio::runtime::Runtime;

/// Environment variable overriding the worker thread count.
pub const THREADS_ENV: &str = "RSEDIS_RUNTIME_THREADS";

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn worker_threads() -> Option<usize> {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

/// The process-wide runtime, built on first use.
pub fn get_runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("rsedis-rt");
        if let Some(n) = worker_threads() {
            builder.worker_threads(n);
        }
        match builder.build() {
            Ok(rt) => rt,
            // Thread spawn failure (ulimit, OOM) leaves nothing to run on.
            Err(e) => panic!("rsedis: failed to create tokio runtime: {e}"),
        }
    })
}

/// Drive `future` to completion on the shared runtime.
///
/// Panics when called from inside an async context.
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    get_runtime().block_on(future)
}

// ── Tests ──────────────────────────────────────────────────────────
