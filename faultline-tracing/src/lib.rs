#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Tracing integration for the faultline failure handler.
//!
//! This crate connects a [`Debugger`](faultline::Debugger) to the
//! [`tracing`] ecosystem in both directions:
//!
//! - [`TracingForwarder`] and [`TracingSink`] turn dispatched failures and
//!   log entries into `tracing` events, so they show up wherever your
//!   subscriber sends its output;
//! - [`SpanContextCollector`] records which spans were active when a failure
//!   was dispatched and attaches them as failure context.
//!
//! # How It Works
//!
//! You add [`FaultlineLayer`] to your tracing subscriber alongside your
//! existing layers. While your other layers do their work, `FaultlineLayer`
//! quietly captures span field values for use in failure context.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use faultline::{Debugger, host::ProcessHost};
//! use faultline_tracing::{FaultlineLayer, SpanContextCollector, TracingForwarder};
//! use tracing_subscriber::{Registry, layer::SubscriberExt};
//!
//! // 1. Set up tracing with FaultlineLayer (required for span context)
//! let subscriber = Registry::default()
//!     .with(FaultlineLayer) // Captures span field values for failure context
//!     .with(tracing_subscriber::fmt::layer()); // Your normal console output
//! tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
//!
//! // 2. Wire the debugger to tracing
//! let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
//!     .mode(false)
//!     .console(TracingForwarder)
//!     .context_collector(SpanContextCollector)
//!     .build();
//!
//! // 3. Failures dispatched inside a span carry it as context
//! #[tracing::instrument(fields(order_id = 42))]
//! fn checkout(debugger: &Debugger) {
//!     debugger.handle_exception(faultline::failure!("payment declined"), false);
//! }
//! checkout(&debugger);
//! ```
//!
//! The failure then carries a `spans` context entry:
//!
//! ```text
//! checkout{order_id=42}
//! ```

use std::fmt::{self, Write};

use faultline::{
    config::ContextCollector,
    failure::FailureContext,
    severity::LogLevel,
    sink::{ConsoleForwarder, LogEntry, LogError, LogReference, LogSink},
};
use tracing::{
    Level, Span,
    field::{Field, Visit},
};

/// Target of the events emitted by this crate.
pub const TARGET: &str = "faultline";

/// Context key under which [`SpanContextCollector`] stores the span stack.
pub const SPANS_KEY: &str = "spans";

/// Captured field values for a span.
#[derive(Clone, Debug, Default)]
struct CapturedFields(String);

struct FieldVisitor<'a> {
    output: &'a mut String,
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if !self.output.is_empty() {
            self.output.push(' ');
        }
        let _ = write!(self.output, "{}={:?}", field.name(), value);
    }
}

/// A tracing layer that captures span field values for failure context.
///
/// **Required for [`SpanContextCollector`].** Add this to your subscriber
/// alongside your other layers. It runs in the background, capturing span
/// field values without affecting your other layers.
///
/// # Examples
///
/// ```
/// use faultline_tracing::FaultlineLayer;
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default()
///     .with(FaultlineLayer) // Captures span data for failure context
///     .with(tracing_subscriber::fmt::layer()); // Example: console output
///
/// tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct FaultlineLayer;

impl<S> tracing_subscriber::Layer<S> for FaultlineLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut fields = CapturedFields::default();
        attrs.record(&mut FieldVisitor {
            output: &mut fields.0,
        });
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<CapturedFields>() {
            Some(fields) => values.record(&mut FieldVisitor {
                output: &mut fields.0,
            }),
            None => {
                let mut fields = CapturedFields::default();
                values.record(&mut FieldVisitor {
                    output: &mut fields.0,
                });
                extensions.insert(fields);
            }
        }
    }
}

/// Renders the span stack of `span`, innermost first, one span per line.
///
/// Returns `None` when the span is disabled or the subscriber has no
/// registry.
pub fn render_span_stack(span: &Span) -> Option<String> {
    use tracing_subscriber::registry::LookupSpan;

    span.with_subscriber(|(span_id, dispatch)| {
        let registry = dispatch.downcast_ref::<tracing_subscriber::Registry>()?;
        let span_ref = registry.span(span_id)?;

        let mut out = String::new();
        for ancestor in span_ref.scope() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(ancestor.name());

            let extensions = ancestor.extensions();
            if let Some(fields) = extensions.get::<CapturedFields>() {
                if !fields.0.is_empty() {
                    let _ = write!(out, "{{{}}}", fields.0);
                }
            } else {
                let names: Vec<_> = ancestor.fields().iter().map(|field| field.name()).collect();
                if !names.is_empty() {
                    let _ = write!(out, "{{{}}}", names.join(" "));
                }
            }
        }
        Some(out)
    })
    .flatten()
}

/// [`ContextCollector`] recording the active spans under [`SPANS_KEY`].
///
/// Needs [`FaultlineLayer`] in the subscriber to show field values; without
/// it only field names are shown.
#[derive(Copy, Clone, Debug, Default)]
pub struct SpanContextCollector;

impl ContextCollector for SpanContextCollector {
    fn collect(&self) -> FailureContext {
        let mut context = FailureContext::new();
        let span = Span::current();
        if !span.is_none()
            && let Some(stack) = render_span_stack(&span)
        {
            context.insert(SPANS_KEY, stack);
        }
        context
    }
}

/// [`ConsoleForwarder`] emitting each entry as a `tracing` event.
///
/// Failures become `ERROR` events carrying the failure's class; messages
/// become `INFO` events. An entry counts as delivered when an event at its
/// level is enabled.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingForwarder;

impl ConsoleForwarder for TracingForwarder {
    fn send(&self, entry: LogEntry<'_>) -> bool {
        match entry {
            LogEntry::Message(message) => {
                let enabled = tracing::enabled!(target: TARGET, Level::INFO);
                tracing::info!(target: TARGET, "{message}");
                enabled
            }
            LogEntry::Failure(failure) => {
                let enabled = tracing::enabled!(target: TARGET, Level::ERROR);
                tracing::error!(target: TARGET, class = failure.class(), "{failure}");
                enabled
            }
        }
    }
}

macro_rules! emit {
    ($level:expr, $entry:expr, $log_level:expr) => {
        match $entry {
            LogEntry::Message(message) => {
                tracing::event!(target: TARGET, $level, log_level = %$log_level, "{message}")
            }
            LogEntry::Failure(failure) => tracing::event!(
                target: TARGET,
                $level,
                log_level = %$log_level,
                class = failure.class(),
                "{}",
                failure.summary()
            ),
        }
    };
}

/// [`LogSink`] emitting each entry as a `tracing` event instead of writing
/// files.
///
/// The [`LogLevel`] maps onto the closest tracing level and is kept as the
/// `log_level` field. Failures are emitted with their full summary. There is
/// nothing to refer back to, so no reference is returned.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use faultline::{Debugger, host::ProcessHost, severity::LogLevel};
/// use faultline_tracing::TracingSink;
///
/// let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
///     .logger(TracingSink)
///     .build();
///
/// assert_eq!(debugger.log("cache warmed", LogLevel::Info).unwrap(), None);
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, entry: LogEntry<'_>, level: LogLevel) -> Result<Option<LogReference>, LogError> {
        match level {
            LogLevel::Debug => emit!(Level::DEBUG, entry, level),
            LogLevel::Info => emit!(Level::INFO, entry, level),
            LogLevel::Warning => emit!(Level::WARN, entry, level),
            LogLevel::Error | LogLevel::Exception | LogLevel::Critical => {
                emit!(Level::ERROR, entry, level)
            }
        }
        Ok(None)
    }
}
