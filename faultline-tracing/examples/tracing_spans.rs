//! Span context on dispatched failures.
//!
//! This example shows the debugger forwarding a failure to `tracing` and
//! recording the spans that were active when it happened. If you currently
//! use `tracing_subscriber::fmt::init()`, this shows how to expand that setup
//! to add `FaultlineLayer`.

use std::sync::Arc;

use faultline::{Debugger, compat::IntoFailure, host::ProcessHost, mode::ModeSetting};
use faultline_tracing::{FaultlineLayer, SpanContextCollector, TracingForwarder, TracingSink};
use tracing::instrument;
use tracing_subscriber::{Registry, layer::SubscriberExt};

#[derive(Debug, thiserror::Error)]
#[error("database query failed")]
struct DatabaseError(#[source] std::io::Error);

#[instrument]
fn query_database(table: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    Err(DatabaseError(std::io::Error::other("connection reset")).into())
}

#[instrument(skip(debugger))]
fn handle_api_request(debugger: &Debugger, request_id: &str) {
    if let Err(failure) = query_database("users").into_failure() {
        debugger.handle_exception(failure, false);
    }
}

fn main() {
    let subscriber = Registry::default()
        .with(FaultlineLayer)
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");

    let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
        .mode(ModeSetting::Development)
        .console(TracingForwarder)
        .logger(TracingSink)
        .context_collector(SpanContextCollector)
        .build();

    handle_api_request(&debugger, "req-7f3a");
}
