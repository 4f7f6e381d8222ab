//! Debugger configuration and the extension traits it holds.

use core::fmt;
use std::{path::PathBuf, sync::Arc};

use crate::{
    failure::{CapturedFailure, FailureContext, Frame},
    mode::ModeSetting,
    render::{
        CustomAssets, DebugInspector, DumpOptions, Inspector, PlainRenderer, PlainToolbar,
        Renderer, ToolbarRenderer,
    },
    severity::{SeverityMask, StrictMode},
    sink::{ConsoleForwarder, LogSink, Notifier, NullForwarder},
};

/// Called after a failure was fully dispatched on the exception path.
///
/// Returning an error, or panicking, does not disturb the dispatch: the
/// error is logged as a separate failure and the next callback runs.
///
/// Implemented for every `Fn(&CapturedFailure) -> Result<(), CapturedFailure>`.
pub trait FatalCallback: Send + Sync {
    /// Reacts to `failure`.
    fn on_fatal_error(&self, failure: &CapturedFailure) -> Result<(), CapturedFailure>;
}

impl<F> FatalCallback for F
where
    F: Fn(&CapturedFailure) -> Result<(), CapturedFailure> + Send + Sync,
{
    fn on_fatal_error(&self, failure: &CapturedFailure) -> Result<(), CapturedFailure> {
        self(failure)
    }
}

/// Supplies request context for failures being dispatched.
///
/// Implemented for every `Fn() -> FailureContext`.
pub trait ContextCollector: Send + Sync {
    /// The current context.
    fn collect(&self) -> FailureContext;
}

impl<F> ContextCollector for F
where
    F: Fn() -> FailureContext + Send + Sync,
{
    fn collect(&self) -> FailureContext {
        self()
    }
}

/// Captures the current call stack.
pub trait StackCapture: Send + Sync {
    /// The frames of the calling thread, innermost first.
    fn capture(&self) -> Vec<Frame>;
}

/// Everything about a [`Debugger`](crate::Debugger) that can be changed
/// after it was built.
///
/// The fields are read at the moment they are needed, so changes made
/// through [`Debugger::configure`](crate::Debugger::configure) apply to the
/// next dispatched failure.
#[derive(Clone)]
pub struct Config {
    /// How to decide the operating mode. Only read until the mode is first
    /// resolved.
    pub mode: ModeSetting,
    /// Where the default log sink writes. Cleared when invalid.
    pub log_directory: Option<PathBuf>,
    /// Who the default log sink notifies about errors.
    pub emails: Vec<String>,
    /// How the default log sink notifies.
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Which warnings become hard failures in development.
    pub strict_mode: StrictMode,
    /// Report every severity, even where the application silenced some.
    pub scream: bool,
    /// Bounds for dumps.
    pub dump: DumpOptions,
    /// Warnings logged in production even though they are not displayed.
    pub log_severity: SeverityMask,
    /// Whether the debug toolbar is shown in development.
    pub show_bar: bool,
    /// Command run with the log reference of a console failure, e.g. a
    /// viewer.
    pub viewer: Option<String>,
    /// Extra assets for the diagnostic screen and the toolbar.
    pub assets: CustomAssets,
    /// Page shown instead of the generic failure page in production.
    pub error_template: Option<PathBuf>,
    /// Renders diagnostic screens and failure pages.
    pub renderer: Arc<dyn Renderer>,
    /// Renders the toolbar.
    pub toolbar: Arc<dyn ToolbarRenderer>,
    /// Renders dumps.
    pub inspector: Arc<dyn Inspector>,
    /// Forwards to a live log console.
    pub console: Arc<dyn ConsoleForwarder>,
    pub(crate) logger: Option<Arc<dyn LogSink>>,
    pub(crate) fatal_callbacks: Vec<Arc<dyn FatalCallback>>,
    pub(crate) context_collectors: Vec<Arc<dyn ContextCollector>>,
    pub(crate) stack_capture: Option<Arc<dyn StackCapture>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ModeSetting::default(),
            log_directory: None,
            emails: Vec::new(),
            notifier: None,
            strict_mode: StrictMode::Off,
            scream: false,
            dump: DumpOptions::default(),
            log_severity: SeverityMask::NONE,
            show_bar: true,
            viewer: None,
            assets: CustomAssets::default(),
            error_template: None,
            renderer: Arc::new(PlainRenderer),
            toolbar: Arc::new(PlainToolbar::from_env()),
            inspector: Arc::new(DebugInspector),
            console: Arc::new(NullForwarder),
            logger: None,
            fatal_callbacks: Vec::new(),
            context_collectors: Vec::new(),
            stack_capture: None,
        }
    }
}

impl Config {
    /// Appends a fatal-error callback. Callbacks run in registration order.
    pub fn on_fatal_error(&mut self, callback: impl FatalCallback + 'static) {
        self.fatal_callbacks.push(Arc::new(callback));
    }

    /// Appends a context collector.
    pub fn add_context_collector(&mut self, collector: impl ContextCollector + 'static) {
        self.context_collectors.push(Arc::new(collector));
    }

    /// Sets the stack capture used for failures that arrive without frames.
    pub fn set_stack_capture(&mut self, capture: impl StackCapture + 'static) {
        self.stack_capture = Some(Arc::new(capture));
    }

    /// Number of registered fatal-error callbacks.
    pub fn fatal_callback_count(&self) -> usize {
        self.fatal_callbacks.len()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("mode", &self.mode)
            .field("log_directory", &self.log_directory)
            .field("emails", &self.emails)
            .field("strict_mode", &self.strict_mode)
            .field("scream", &self.scream)
            .field("dump", &self.dump)
            .field("log_severity", &self.log_severity)
            .field("show_bar", &self.show_bar)
            .field("viewer", &self.viewer)
            .field("assets", &self.assets)
            .field("error_template", &self.error_template)
            .field("custom_logger", &self.logger.is_some())
            .field("fatal_callbacks", &self.fatal_callbacks.len())
            .field("context_collectors", &self.context_collectors.len())
            .field("stack_capture", &self.stack_capture.is_some())
            .finish_non_exhaustive()
    }
}
