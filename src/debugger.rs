//! Installation of the three hooks and the dispatch of everything they
//! capture.
//!
//! A [`Debugger`] owns the state that has to survive between hook
//! invocations: the resolved operating mode, the buffer mark, the reserved
//! slack and the toolbar data. The hooks registered on the [`Host`] only
//! hold a weak reference to it, so dropping the last [`Arc<Debugger>`]
//! turns them into no-ops.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use faultline::{
//!     Debugger, Disposition,
//!     failure::CapturedFailure,
//!     host::ProcessHost,
//!     mode::ModeSetting,
//! };
//!
//! let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
//!     .mode(ModeSetting::Development)
//!     .build();
//!
//! let disposition = debugger.handle_exception(CapturedFailure::exception("db timeout"), false);
//! assert_eq!(disposition, Disposition::Console { reference: None });
//! ```

use core::{fmt, time::Duration};
use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{Arc, OnceLock, Weak},
    time::Instant,
};

use hashbrown::HashMap;
use regex::Regex;
use rustc_hash::FxBuildHasher;

use crate::{
    bar::DebugBar,
    buffer::{self, BufferMark},
    config::{Config, ContextCollector, FatalCallback, StackCapture},
    dedup::DedupKey,
    event::{ErrorEvent, ErrorOutcome},
    failure::{self, CapturedFailure, FailureContext, FailureKind, SourceLocation},
    host::{Host, OutputContext, RuntimeSettings},
    mode::{self, ModeSetting, OperatingMode},
    render::{CustomAssets, DumpOptions, Inspector, Renderer, ToolbarRenderer},
    reserve::{ReservedSlack, SLACK_SIZE},
    severity::{LogLevel, SeverityMask, StrictMode},
    sink::{ConsoleForwarder, FileLogSink, LogEntry, LogError, LogReference, LogSink, Notifier},
};

/// Response header carrying the log reference of a failure.
pub const ERROR_LOG_HEADER: &str = "X-Faultline-Error-Log";

/// Exit status after a fatal failure.
pub const FATAL_EXIT_CODE: i32 = 255;

/// Line written to the error stream of a console in production.
const CONSOLE_NOTICE: &str = "ERROR: application encountered an error and can not continue. ";

/// Result of [`Debugger::enable`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Enabled {
    /// The hooks were registered.
    Installed,
    /// The hooks were registered by an earlier call; only the settings were
    /// refreshed.
    AlreadyEnabled,
    /// The hooks were registered and the request was answered with a toolbar
    /// asset. The application should stop processing it.
    AssetServed,
}

/// What the exception path did with a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The failure was already being handled; nothing happened.
    Duplicate,
    /// Production: the failure was logged (or not) and a generic message
    /// shown.
    Production {
        /// Whether logging succeeded.
        logged: bool,
    },
    /// Development: the diagnostic screen was shown.
    Diagnostic,
    /// Development without a page to render into: a summary was printed.
    Console {
        /// Where the failure was logged, if it was.
        reference: Option<LogReference>,
    },
}

/// The process-wide failure handler.
///
/// Build one with [`Debugger::builder`], then call
/// [`enable`](Self::enable) to take over the host's error handling.
pub struct Debugger {
    this: Weak<Debugger>,
    host: Arc<dyn Host>,
    config: spin::RwLock<Config>,
    mode: spin::Once<OperatingMode>,
    mark: spin::Once<BufferMark>,
    slack: ReservedSlack,
    enabled: core::sync::atomic::AtomicBool,
    bar: spin::Mutex<DebugBar>,
    timers: spin::Mutex<HashMap<String, Instant, FxBuildHasher>>,
}

impl Debugger {
    /// Starts building a debugger for `host`.
    pub fn builder(host: Arc<dyn Host>) -> DebuggerBuilder {
        DebuggerBuilder {
            host,
            config: Config::default(),
        }
    }

    /// The host the debugger is installed into.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// Changes the configuration.
    ///
    /// `f` works on a copy that replaces the configuration once it returns.
    /// If `f` panics the configuration is left as it was.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use faultline::{Debugger, host::ProcessHost, severity::StrictMode};
    ///
    /// let debugger = Debugger::builder(Arc::new(ProcessHost::console())).build();
    /// debugger.configure(|config| config.strict_mode = StrictMode::All);
    /// assert_eq!(debugger.config().strict_mode, StrictMode::All);
    /// ```
    pub fn configure<R>(&self, f: impl FnOnce(&mut Config) -> R) -> R {
        let mut config = self.config();
        let result = f(&mut config);
        *self.config.write() = config;
        result
    }

    /// A snapshot of the configuration.
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// The operating mode, resolved on first use and fixed afterwards.
    pub fn mode(&self) -> OperatingMode {
        *self.mode.call_once(|| {
            let setting = self.config.read().mode.clone();
            let mode = mode::resolve(&setting, &self.host.origin());
            tracing::debug!(?mode, "operating mode resolved");
            mode
        })
    }

    /// Whether failures are hidden from whoever triggered them.
    pub fn is_production(&self) -> bool {
        self.mode().is_production()
    }

    /// Whether the hooks are registered.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(core::sync::atomic::Ordering::Acquire)
    }

    /// The buffer depth recorded by the first [`enable`](Self::enable).
    pub fn buffer_mark(&self) -> Option<BufferMark> {
        self.mark.get().copied()
    }

    /// Whether the reserved slack is still held, i.e. no failure was handled
    /// yet.
    pub fn holds_slack(&self) -> bool {
        self.slack.is_held()
    }

    /// Takes over the host's error handling.
    ///
    /// Resolves the mode, records the buffer mark and reserves the slack
    /// (each only once), checks the log directory, adjusts the host's error
    /// settings and reporting mask, and registers the shutdown, exception and
    /// error hooks. Calling it again repeats the checks and settings but
    /// never registers the hooks twice.
    ///
    /// An invalid log directory is cleared and reported through the
    /// exception path. A host refusing the settings is reported the same way.
    pub fn enable(&self) -> Enabled {
        use core::sync::atomic::Ordering;

        let mode = self.mode();
        self.mark.call_once(|| {
            let mut mark = BufferMark::new(0);
            self.host.with_buffers(&mut |stack| mark = buffer::mark(stack));
            mark
        });
        if self.slack.arm() {
            tracing::debug!(bytes = SLACK_SIZE, "slack reserved");
        }
        self.bar.lock().start(Instant::now());

        self.validate_log_directory();

        let settings = RuntimeSettings {
            display_errors: mode.is_development(),
            html_errors: false,
            log_errors: false,
        };
        if let Err(error) = self.host.apply_settings(settings) {
            tracing::warn!(%error, "host refused error settings");
            self.handle_exception(
                runtime_exception(format!("Unable to apply error settings: {error}.")),
                true,
            );
        }
        self.host.set_reporting_mask(SeverityMask::ALL);

        if self.enabled.swap(true, Ordering::AcqRel) {
            return Enabled::AlreadyEnabled;
        }
        self.register_hooks();
        tracing::debug!(?mode, "debugger enabled");

        if mode.is_development() && self.host.output_context() != OutputContext::Console {
            if self.host.headers_sent() {
                tracing::warn!("output started before the debugger was enabled");
                self.handle_exception(
                    CapturedFailure::new(
                        FailureKind::Exception,
                        "LogicException",
                        "Debugger::enable() called after some output has been sent.",
                    ),
                    true,
                );
            } else {
                let toolbar = self.config.read().toolbar.clone();
                if toolbar.dispatch_assets(&*self.host) {
                    return Enabled::AssetServed;
                }
            }
        }
        Enabled::Installed
    }

    fn validate_log_directory(&self) {
        let Some(directory) = self.config.read().log_directory.clone() else {
            return;
        };

        let message = if !is_absolute(&directory) {
            String::from("Logging directory must be absolute path.")
        } else if !directory.is_dir() {
            format!("Logging directory '{}' is not found.", directory.display())
        } else {
            return;
        };

        self.config.write().log_directory = None;
        tracing::warn!(directory = %directory.display(), "log directory rejected");
        self.handle_exception(runtime_exception(message), true);
    }

    fn register_hooks(&self) {
        let this = self.this.clone();
        self.host.register_shutdown(Box::new(move || {
            if let Some(debugger) = this.upgrade() {
                debugger.handle_shutdown();
            }
        }));

        let this = self.this.clone();
        self.host.register_exception(Box::new(move |failure| {
            if let Some(debugger) = this.upgrade() {
                debugger.handle_exception(failure, true);
            }
        }));

        let this = self.this.clone();
        self.host
            .register_error(Box::new(move |event| match this.upgrade() {
                Some(debugger) => debugger.handle_error(event),
                None => Ok(ErrorOutcome::DeferToDefault),
            }));
    }

    /// The shutdown hook.
    ///
    /// Acts only while the slack is held, so it never runs after the
    /// exception path already handled a failure. A fatal last error is
    /// dispatched as a `FatalError` failure without exiting again; otherwise,
    /// in development, the buffers are flushed and the toolbar is shown.
    pub fn handle_shutdown(&self) {
        if !self.slack.release() {
            return;
        }

        if let Some(error) = self.host.last_error().filter(|error| error.severity.is_fatal()) {
            let failure =
                CapturedFailure::runtime_error(error.severity, error.message, error.location)
                    .with_class("FatalError");
            self.dispatch(failure, false, FailureContext::new());
            return;
        }

        let config = self.config();
        if config.show_bar && self.mode().is_development() {
            self.unwind_buffers(true);
            if self.host.output_context().is_renderable() {
                self.write_toolbar(&config);
            }
        }
    }

    /// The exception hook.
    ///
    /// Handles a failure nobody caught, then exits with
    /// [`FATAL_EXIT_CODE`] when `exit` is set. With `exit` set, a failure
    /// arriving after another one was handled is a duplicate and ignored.
    pub fn handle_exception(&self, failure: CapturedFailure, exit: bool) -> Disposition {
        self.dispatch(failure, exit, FailureContext::new())
    }

    fn dispatch(
        &self,
        mut failure: CapturedFailure,
        exit: bool,
        context: FailureContext,
    ) -> Disposition {
        if !self.slack.release() && exit {
            tracing::trace!(%failure, "failure already handled");
            return Disposition::Duplicate;
        }

        let config = self.config();
        let output = self.host.output_context();

        if !self.host.headers_sent() {
            let legacy = self
                .host
                .user_agent()
                .is_some_and(|agent| agent.contains("MSIE "));
            self.host.set_status(if legacy { 503 } else { 500 });
            if output == OutputContext::Html {
                self.host
                    .set_header("Content-Type", "text/html; charset=UTF-8");
            }
        }

        enrich(&mut failure, &config, context);
        self.unwind_buffers(false);

        let disposition = if self.mode().is_production() {
            let logged = match self.write_log(&config, LogEntry::Failure(&failure), LogLevel::Exception)
            {
                Ok(_) => true,
                Err(error) => {
                    tracing::warn!(%error, "unable to log failure");
                    false
                }
            };
            match output {
                OutputContext::Html => self.host.write_output(&failure_page(&config, logged)),
                OutputContext::Console => self.host.write_error(&format!(
                    "{CONSOLE_NOTICE}{}\n",
                    if logged {
                        "Error was logged."
                    } else {
                        "Unable to log error."
                    }
                )),
                OutputContext::Ajax => {}
            }
            Disposition::Production { logged }
        } else if output.is_renderable() && !self.host.connection_aborted() {
            self.host
                .write_output(&config.renderer.render_diagnostic(&failure, &config.assets));
            if config.show_bar {
                self.write_toolbar(&config);
            }
            Disposition::Diagnostic
        } else {
            config.console.send(LogEntry::Failure(&failure));
            let summary = failure.summary();
            match self.write_log(&config, LogEntry::Failure(&failure), LogLevel::Exception) {
                Ok(reference) => {
                    let mut text = format!("{summary}\n");
                    if let Some(reference) = &reference {
                        if !self.host.headers_sent() {
                            self.host.set_header(ERROR_LOG_HEADER, reference.as_str());
                        }
                        text.push_str(&format!("(stored in {reference})\n"));
                    }
                    self.host.write_output(&text);

                    if let (Some(reference), Some(viewer)) = (&reference, &config.viewer)
                        && let Err(error) = self.host.launch(viewer, reference.as_str())
                    {
                        tracing::warn!(%error, viewer = %viewer, "unable to launch viewer");
                    }
                    Disposition::Console { reference }
                }
                Err(error) => {
                    self.host
                        .write_output(&format!("{summary}\nUnable to log error: {error}\n"));
                    Disposition::Console { reference: None }
                }
            }
        };

        self.run_fatal_callbacks(&config, &failure);

        if exit {
            self.host.exit(FATAL_EXIT_CODE);
        }
        disposition
    }

    fn run_fatal_callbacks(&self, config: &Config, failure: &CapturedFailure) {
        for callback in &config.fatal_callbacks {
            let secondary =
                match panic::catch_unwind(AssertUnwindSafe(|| callback.on_fatal_error(failure))) {
                    Ok(Ok(())) => continue,
                    Ok(Err(secondary)) => secondary,
                    Err(payload) => CapturedFailure::new(
                        FailureKind::Exception,
                        "panic",
                        failure::payload_message(&*payload),
                    ),
                };

            tracing::warn!(failure = %secondary, "fatal-error callback failed");
            if let Err(error) =
                self.write_log(config, LogEntry::Failure(&secondary), LogLevel::Exception)
            {
                tracing::warn!(%error, "unable to log fatal-error callback failure");
            }
        }
    }

    /// The error hook.
    ///
    /// Recoverable fatal errors come back as `Err` for the caller to handle;
    /// when raised during value formatting they are dispatched through the
    /// exception path first. Everything else is filtered by the reporting
    /// mask, logged in production, escalated by strict mode in development,
    /// and otherwise deduplicated: only the first occurrence of a warning at a
    /// given place is logged (production) or forwarded to the console
    /// (development).
    pub fn handle_error(&self, event: ErrorEvent) -> Result<ErrorOutcome, CapturedFailure> {
        let config = self.config();
        if config.scream {
            self.host.set_reporting_mask(SeverityMask::ALL);
        }

        let ErrorEvent {
            severity,
            message,
            location,
            context,
            previous,
            in_string_conversion,
        } = event;

        if severity.is_recoverable_fatal() {
            if in_string_conversion {
                let failure =
                    CapturedFailure::runtime_error(severity, message.clone(), location.clone())
                        .into_exception()
                        .with_shared_previous(previous);
                self.dispatch(failure, true, context.clone());
            }
            let failure = CapturedFailure::runtime_error(severity, message, location).into_exception();
            attach(&failure, context);
            return Err(failure);
        }

        if !self.host.reporting_mask().contains(severity) {
            return Ok(ErrorOutcome::DeferToDefault);
        }

        let mode = self.mode();
        if mode.is_production() && config.log_severity.contains(severity) {
            let failure = CapturedFailure::runtime_error(severity, message, location);
            attach(&failure, context);
            if let Err(error) = self.write_log(&config, LogEntry::Failure(&failure), LogLevel::Error) {
                tracing::warn!(%error, "unable to log error");
            }
            return Ok(ErrorOutcome::Handled);
        }

        if mode.is_development()
            && config.strict_mode.applies_to(severity)
            && !self.host.skip_error_requested()
        {
            let failure =
                CapturedFailure::runtime_error(severity, message.clone(), location.clone())
                    .into_exception()
                    .skippable();
            if self.dispatch(failure, true, context) != Disposition::Duplicate {
                return Ok(ErrorOutcome::Handled);
            }
        }

        let message = format!("{}: {message}", severity.name());
        let key = DedupKey::new(location.file.clone(), location.line, message.clone());
        if !self.bar.lock().record_error(&key) {
            tracing::trace!(%key, "repeated error suppressed");
            return Ok(ErrorOutcome::Handled);
        }

        if mode.is_production() {
            let line = format!("{message} in {location}");
            if let Err(error) = self.write_log(&config, LogEntry::Message(&line), LogLevel::Error) {
                tracing::warn!(%error, "unable to log error");
            }
            Ok(ErrorOutcome::Handled)
        } else {
            let failure = CapturedFailure::runtime_error(severity, message, location);
            config.console.send(LogEntry::Failure(&failure));
            if self.host.output_context().is_renderable() {
                Ok(ErrorOutcome::Handled)
            } else {
                Ok(ErrorOutcome::DeferToDefault)
            }
        }
    }

    fn unwind_buffers(&self, flush: bool) {
        let mark = self.buffer_mark().unwrap_or(BufferMark::new(0));
        self.host.with_buffers(&mut |stack| {
            let closed = buffer::unwind(stack, mark, flush);
            if closed > 0 {
                tracing::trace!(closed, flush, "output buffers unwound");
            }
        });
    }

    fn write_toolbar(&self, config: &Config) {
        let bar = self.bar.lock().clone();
        self.host
            .write_output(&config.toolbar.render(&bar, &config.assets));
    }

    fn write_log(
        &self,
        config: &Config,
        entry: LogEntry<'_>,
        level: LogLevel,
    ) -> Result<Option<LogReference>, LogError> {
        sink_for(config).write(entry, level)
    }

    /// The sink [`log`](Self::log) writes to: the one set with
    /// [`set_logger`](Self::set_logger), or a [`FileLogSink`] for the
    /// current log directory and notification addresses.
    pub fn logger(&self) -> Arc<dyn LogSink> {
        sink_for(&self.config.read())
    }

    /// Replaces the log sink.
    pub fn set_logger(&self, sink: impl LogSink + 'static) {
        self.config.write().logger = Some(Arc::new(sink));
    }

    /// Logs a message or failure.
    pub fn log<'a>(
        &self,
        entry: impl Into<LogEntry<'a>>,
        level: LogLevel,
    ) -> Result<Option<LogReference>, LogError> {
        self.logger().write(entry.into(), level)
    }

    /// Sends a message or failure to the live log console. Does nothing in
    /// production.
    pub fn fire_log<'a>(&self, entry: impl Into<LogEntry<'a>>) -> bool {
        if self.is_production() {
            return false;
        }
        let console = self.config.read().console.clone();
        console.send(entry.into())
    }

    /// Prints a dump of `value` in development and returns the value.
    ///
    /// The dump is HTML when the host renders pages, text otherwise.
    #[track_caller]
    pub fn dump<T: fmt::Debug>(&self, value: T) -> T {
        if self.mode().is_development() {
            let location = SourceLocation::caller();
            let (inspector, options) = self.inspector();
            let rendered = if self.host.output_context() == OutputContext::Html {
                inspector.to_html(&value, &options, &location)
            } else {
                inspector.to_text(&value, &options, &location)
            };
            self.host.write_output(&rendered);
        }
        value
    }

    /// The text dump of `value`, in any mode.
    #[track_caller]
    pub fn dump_to_string<T: fmt::Debug>(&self, value: &T) -> String {
        let location = SourceLocation::caller();
        let (inspector, options) = self.inspector();
        inspector.to_text(value, &options, &location)
    }

    /// Adds a dump of `value` to the toolbar in development and returns the
    /// value.
    #[track_caller]
    pub fn bar_dump<T: fmt::Debug>(&self, value: T, title: Option<&str>) -> T {
        if self.mode().is_development() {
            let location = SourceLocation::caller();
            let (inspector, options) = self.inspector();
            let html = inspector.to_html(&value, &options, &location);
            self.bar.lock().add_dump(title.map(str::to_owned), html);
        }
        value
    }

    fn inspector(&self) -> (Arc<dyn Inspector>, DumpOptions) {
        let config = self.config.read();
        (config.inspector.clone(), config.dump)
    }

    /// Time since the previous call with the same name; zero on the first.
    pub fn timer(&self, name: &str) -> Duration {
        let now = Instant::now();
        let previous = self.timers.lock().insert(name.to_owned(), now);
        previous.map_or(Duration::ZERO, |start| now.duration_since(start))
    }

    /// Markup loading the toolbar, in development.
    pub fn render_loader(&self) -> Option<String> {
        if self.is_production() {
            return None;
        }
        let toolbar = self.config.read().toolbar.clone();
        Some(toolbar.render_loader())
    }

    /// A snapshot of the toolbar data.
    pub fn bar(&self) -> DebugBar {
        self.bar.lock().clone()
    }

    /// Clears the toolbar data, for hosts serving several requests.
    pub fn reset_bar(&self) {
        self.bar.lock().reset();
    }
}

impl fmt::Debug for Debugger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger")
            .field("config", &*self.config.read())
            .field("mode", &self.mode.get())
            .field("mark", &self.mark.get())
            .field("slack", &self.slack.is_held())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

fn runtime_exception(message: impl Into<String>) -> CapturedFailure {
    CapturedFailure::new(FailureKind::Exception, "RuntimeException", message)
}

fn attach(failure: &CapturedFailure, context: FailureContext) {
    if !context.is_empty() {
        let _ = failure.attach_context(context);
    }
}

fn enrich(failure: &mut CapturedFailure, config: &Config, mut context: FailureContext) {
    if let Some(capture) = &config.stack_capture {
        failure.fill_frames(|| capture.capture());
    }
    for collector in &config.context_collectors {
        context.extend(collector.collect());
    }
    if !context.is_empty() && failure.attach_context(context).is_err() {
        tracing::trace!("failure already carries context");
    }
}

fn failure_page(config: &Config, logged: bool) -> String {
    config
        .error_template
        .as_deref()
        .and_then(|path| fs::read_to_string(path).ok())
        .unwrap_or_else(|| config.renderer.render_failure_page(logged))
}

fn sink_for(config: &Config) -> Arc<dyn LogSink> {
    if let Some(logger) = &config.logger {
        return logger.clone();
    }
    let sink = FileLogSink::new(config.log_directory.clone());
    match &config.notifier {
        Some(notifier) => Arc::new(sink.with_notifier(config.emails.clone(), notifier.clone())),
        None => Arc::new(sink),
    }
}

fn is_absolute(directory: &Path) -> bool {
    static ABSOLUTE: OnceLock<Regex> = OnceLock::new();
    ABSOLUTE
        .get_or_init(|| {
            Regex::new(r"(?i)^([a-z]+:)?[/\\]")
                .expect("built-in absolute path pattern should be valid")
        })
        .is_match(&directory.to_string_lossy())
}

/// Builder for a [`Debugger`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use faultline::{Debugger, failure::CapturedFailure, host::ProcessHost, severity::LogLevel};
///
/// let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
///     .mode(true)
///     .log_directory(std::env::temp_dir())
///     .on_fatal_error(|failure: &CapturedFailure| -> Result<(), CapturedFailure> {
///         eprintln!("going down: {failure}");
///         Ok(())
///     })
///     .build();
///
/// assert!(debugger.is_production());
/// ```
#[must_use]
pub struct DebuggerBuilder {
    host: Arc<dyn Host>,
    config: Config,
}

impl DebuggerBuilder {
    /// How to decide the operating mode.
    pub fn mode(mut self, mode: impl Into<ModeSetting>) -> Self {
        self.config.mode = mode.into();
        self
    }

    /// Where the default log sink writes. Must be an existing absolute
    /// directory.
    pub fn log_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.log_directory = Some(directory.into());
        self
    }

    /// Addresses notified about errors, and how.
    pub fn notify(mut self, emails: Vec<String>, notifier: impl Notifier + 'static) -> Self {
        self.config.emails = emails;
        self.config.notifier = Some(Arc::new(notifier));
        self
    }

    /// Which warnings become hard failures in development.
    pub fn strict_mode(mut self, strict: impl Into<StrictMode>) -> Self {
        self.config.strict_mode = strict.into();
        self
    }

    /// Reports every severity, even where the application silenced some.
    pub fn scream(mut self, scream: bool) -> Self {
        self.config.scream = scream;
        self
    }

    /// Warnings logged in production.
    pub fn log_severity(mut self, mask: SeverityMask) -> Self {
        self.config.log_severity = mask;
        self
    }

    /// Whether the debug toolbar is shown.
    pub fn show_bar(mut self, show: bool) -> Self {
        self.config.show_bar = show;
        self
    }

    /// Bounds for dumps.
    pub fn dump_options(mut self, options: DumpOptions) -> Self {
        self.config.dump = options;
        self
    }

    /// Command started with the log reference of a console failure.
    pub fn viewer(mut self, command: impl Into<String>) -> Self {
        self.config.viewer = Some(command.into());
        self
    }

    /// Extra assets for the diagnostic screen and the toolbar.
    pub fn assets(mut self, assets: CustomAssets) -> Self {
        self.config.assets = assets;
        self
    }

    /// Page shown instead of the generic failure page.
    pub fn error_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.error_template = Some(path.into());
        self
    }

    /// Renders diagnostic screens and failure pages.
    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.config.renderer = Arc::new(renderer);
        self
    }

    /// Renders the toolbar.
    pub fn toolbar(mut self, toolbar: impl ToolbarRenderer + 'static) -> Self {
        self.config.toolbar = Arc::new(toolbar);
        self
    }

    /// Renders dumps.
    pub fn inspector(mut self, inspector: impl Inspector + 'static) -> Self {
        self.config.inspector = Arc::new(inspector);
        self
    }

    /// Forwards to a live log console.
    pub fn console(mut self, console: impl ConsoleForwarder + 'static) -> Self {
        self.config.console = Arc::new(console);
        self
    }

    /// Replaces the default log sink.
    pub fn logger(mut self, sink: impl LogSink + 'static) -> Self {
        self.config.logger = Some(Arc::new(sink));
        self
    }

    /// Appends a fatal-error callback.
    pub fn on_fatal_error(mut self, callback: impl FatalCallback + 'static) -> Self {
        self.config.on_fatal_error(callback);
        self
    }

    /// Appends a context collector.
    pub fn context_collector(mut self, collector: impl ContextCollector + 'static) -> Self {
        self.config.add_context_collector(collector);
        self
    }

    /// Sets the stack capture.
    pub fn stack_capture(mut self, capture: impl StackCapture + 'static) -> Self {
        self.config.set_stack_capture(capture);
        self
    }

    /// Builds the debugger. Nothing is installed until
    /// [`Debugger::enable`] is called.
    pub fn build(self) -> Arc<Debugger> {
        Arc::new_cyclic(|this| Debugger {
            this: this.clone(),
            host: self.host,
            config: spin::RwLock::new(self.config),
            mode: spin::Once::new(),
            mark: spin::Once::new(),
            slack: ReservedSlack::new(),
            enabled: core::sync::atomic::AtomicBool::new(false),
            bar: spin::Mutex::new(DebugBar::default()),
            timers: spin::Mutex::new(HashMap::with_hasher(FxBuildHasher)),
        })
    }
}

impl fmt::Debug for DebuggerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
