//! Request correlation IDs and global tracing setup.
//!
//! A `TraceContext` travels with each in-flight request through task-local
//! storage, so problem+json responses can echo the same trace ID the logs
//! carry without threading it through every call.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::AppConfig;

/// Correlation metadata for one in-flight request.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static REQUEST_TRACE: TraceContext;
}

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the global tracing subscriber once per process, bridging legacy
/// `log::` macros into the tracing pipeline.
///
/// Repeat calls and pre-existing subscribers (tests, embedding binaries) are
/// tolerated: whatever is already installed stays in effect.
pub fn init_tracing(config: &AppConfig) {
    if SUBSCRIBER_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        eprintln!(
            "Warning: log bridge not installed ({}); `log::` macros will bypass tracing",
            err
        );
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let output = if config.log_format == "pretty" {
        fmt::layer().pretty().boxed()
    } else {
        fmt::layer().json().boxed()
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
    {
        eprintln!(
            "Warning: tracing subscriber not installed ({}); keeping the existing one",
            err
        );
    }
}

/// Runs `future` with `context` visible to [`current_trace_id`] for its
/// whole duration.
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    REQUEST_TRACE.scope(context, future).await
}

/// Trace ID of the running request, if one is in scope.
pub fn current_trace_id() -> Option<String> {
    REQUEST_TRACE.try_with(|ctx| ctx.trace_id.clone()).ok()
}
