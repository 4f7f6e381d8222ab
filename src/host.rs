//! The runtime the debugger is installed into.
//!
//! The dispatcher never touches the process directly. Everything it needs
//! from its surroundings (response headers, output buffers, the runtime's
//! error settings, the extension points the three hooks are registered on)
//! goes through the [`Host`] trait. Tests drive the dispatcher with a
//! recording host; Rust binaries use [`ProcessHost`].

use alloc::borrow::Cow;
use core::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::{
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    process::Command,
    sync::{Arc, Once},
};

use crate::{
    buffer::{BufferStack, CloseAction, MemoryBuffers},
    config::StackCapture,
    event::{ErrorEvent, ErrorOutcome},
    failure::{self, CapturedFailure, FailureKind, SourceLocation},
    mode::RequestOrigin,
    severity::{ErrorSeverity, SeverityMask},
};

/// Runs when the process is about to terminate.
pub type ShutdownHook = Box<dyn Fn() + Send + Sync>;

/// Receives failures nobody caught.
pub type ExceptionHook = Box<dyn Fn(CapturedFailure) + Send + Sync>;

/// Receives runtime errors and warnings.
pub type ErrorHook = Box<dyn Fn(ErrorEvent) -> Result<ErrorOutcome, CapturedFailure> + Send + Sync>;

/// What kind of output the current request expects.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputContext {
    /// A browser page.
    Html,
    /// A background request from a page's scripts.
    Ajax,
    /// A terminal or any other non-HTML consumer.
    Console,
}

impl OutputContext {
    /// Whether a diagnostic screen can be shown.
    pub const fn is_renderable(self) -> bool {
        matches!(self, Self::Html | Self::Ajax)
    }
}

/// Error settings of the host runtime that the debugger takes over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Whether the runtime prints errors itself.
    pub display_errors: bool,
    /// Whether the runtime formats the errors it prints as HTML.
    pub html_errors: bool,
    /// Whether the runtime logs errors itself.
    pub log_errors: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            display_errors: true,
            html_errors: false,
            log_errors: false,
        }
    }
}

/// The last error the runtime handled by itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastError {
    /// Its severity.
    pub severity: ErrorSeverity,
    /// Its message.
    pub message: String,
    /// Where it was raised.
    pub location: SourceLocation,
}

impl From<&ErrorEvent> for LastError {
    fn from(event: &ErrorEvent) -> Self {
        Self {
            severity: event.severity,
            message: event.message.clone(),
            location: event.location.clone(),
        }
    }
}

/// The host refused an operation.
#[derive(Debug)]
pub enum HostError {
    /// A runtime setting cannot be changed.
    Refused {
        /// Name of the setting.
        setting: Cow<'static, str>,
    },
    /// An external command was empty.
    EmptyCommand,
    /// An I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused { setting } => write!(f, "unable to set '{setting}'"),
            Self::EmptyCommand => f.write_str("command is empty"),
            Self::Io(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl core::error::Error for HostError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for HostError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

/// The runtime environment seen by the debugger.
pub trait Host: Send + Sync {
    /// Who is asking, for mode detection.
    fn origin(&self) -> RequestOrigin;

    /// What kind of output the request expects.
    fn output_context(&self) -> OutputContext;

    /// Whether the client went away.
    fn connection_aborted(&self) -> bool {
        false
    }

    /// Whether the developer asked to continue past a skippable failure.
    fn skip_error_requested(&self) -> bool {
        false
    }

    /// The client's user agent, if any.
    fn user_agent(&self) -> Option<String>;

    /// Whether the response headers are already committed.
    fn headers_sent(&self) -> bool;

    /// Sets the response status.
    fn set_status(&self, code: u16);

    /// Sets a response header.
    fn set_header(&self, name: &str, value: &str);

    /// Writes to the response body (standard output for a console).
    fn write_output(&self, text: &str);

    /// Writes to the error stream.
    fn write_error(&self, text: &str);

    /// Gives `f` the output buffer stack.
    fn with_buffers(&self, f: &mut dyn FnMut(&mut dyn BufferStack));

    /// Applies error settings.
    fn apply_settings(&self, settings: RuntimeSettings) -> Result<(), HostError>;

    /// Severities the runtime reports.
    fn reporting_mask(&self) -> SeverityMask;

    /// Changes the severities the runtime reports.
    fn set_reporting_mask(&self, mask: SeverityMask);

    /// The last error the runtime handled itself.
    fn last_error(&self) -> Option<LastError>;

    /// Registers a hook to run at shutdown.
    fn register_shutdown(&self, hook: ShutdownHook);

    /// Registers the handler for uncaught failures.
    fn register_exception(&self, hook: ExceptionHook);

    /// Registers the handler for runtime errors.
    fn register_error(&self, hook: ErrorHook);

    /// Starts `command` with `argument` appended, without waiting for it.
    fn launch(&self, command: &str, argument: &str) -> Result<(), HostError>;

    /// Terminates the process with `code`.
    fn exit(&self, code: i32);
}

struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    sent: bool,
}

type SharedErrorHook = Arc<dyn Fn(ErrorEvent) -> Result<ErrorOutcome, CapturedFailure> + Send + Sync>;

type SharedExceptionHook = Arc<dyn Fn(CapturedFailure) + Send + Sync>;

std::thread_local! {
    static RECORDED_PANIC: RefCell<Option<CapturedFailure>> = const { RefCell::new(None) };
}

static PANIC_RECORDER: Once = Once::new();
static PANIC_CAPTURE: spin::RwLock<Option<Arc<dyn StackCapture>>> = spin::RwLock::new(None);

/// Installs, once per process, a panic hook that keeps the failure of the
/// latest panic on the panicking thread and then runs the previous hook.
fn install_panic_recorder() {
    PANIC_RECORDER.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let mut failure = CapturedFailure::from_panic(info);
            if let Some(capture) = PANIC_CAPTURE.read().clone() {
                failure.fill_frames(|| capture.capture());
            }
            let _ = RECORDED_PANIC.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(failure);
                }
            });
            previous(info);
        }));
    });
}

fn take_recorded_panic() -> Option<CapturedFailure> {
    RECORDED_PANIC
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
}

/// A [`Host`] for Rust binaries, either run from a terminal or as a CGI
/// program.
///
/// - panics escaping [`run`](Self::run) are reported as uncaught failures;
///   panics caught by the application are left alone;
/// - runtime warnings are raised with [`raise`](Self::raise) or the
///   [`warning!`](crate::warning) macro;
/// - shutdown hooks run from [`shutdown`](Self::shutdown), from the guard
///   returned by [`guard`](Self::guard), or from [`Host::exit`].
///
/// As a CGI program the status line and headers are printed in front of the
/// first output.
///
/// # Examples
///
/// ```
/// use faultline::{
///     event::ErrorEvent,
///     host::{Host, ProcessHost},
///     severity::ErrorSeverity,
/// };
///
/// let host = ProcessHost::console();
/// host.raise(ErrorEvent::new(ErrorSeverity::Notice, "cache miss"))
///     .unwrap();
///
/// let last = host.last_error().unwrap();
/// assert_eq!(last.message, "cache miss");
/// ```
pub struct ProcessHost {
    context: OutputContext,
    origin: RequestOrigin,
    user_agent: Option<String>,
    skip_error: bool,
    cgi: bool,
    settings: spin::RwLock<RuntimeSettings>,
    reporting: AtomicU32,
    last_error: spin::Mutex<Option<LastError>>,
    buffers: spin::Mutex<MemoryBuffers>,
    response: spin::Mutex<Response>,
    shutdown_hooks: spin::Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    exception_hook: spin::RwLock<Option<SharedExceptionHook>>,
    error_hook: spin::RwLock<Option<SharedErrorHook>>,
    stack_capture: Option<Arc<dyn StackCapture>>,
    shut_down: AtomicBool,
}

impl ProcessHost {
    /// A host for the given output context and origin.
    pub fn new(context: OutputContext, origin: RequestOrigin) -> Self {
        Self {
            context,
            origin,
            user_agent: None,
            skip_error: false,
            cgi: false,
            settings: spin::RwLock::new(RuntimeSettings::default()),
            reporting: AtomicU32::new(SeverityMask::ALL.bits()),
            last_error: spin::Mutex::new(None),
            buffers: spin::Mutex::new(MemoryBuffers::new()),
            response: spin::Mutex::new(Response {
                status: 200,
                headers: Vec::new(),
                sent: false,
            }),
            shutdown_hooks: spin::Mutex::new(Vec::new()),
            exception_hook: spin::RwLock::new(None),
            error_hook: spin::RwLock::new(None),
            stack_capture: None,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Captures the call stack of every panic, so failures reported by
    /// [`run`](Self::run) carry the frames of the panic site.
    ///
    /// The capture is shared by the whole process and takes effect when the
    /// exception hook is registered.
    pub fn with_stack_capture(mut self, capture: impl StackCapture + 'static) -> Self {
        self.stack_capture = Some(Arc::new(capture));
        self
    }

    /// A host for a command-line program.
    pub fn console() -> Self {
        Self::new(OutputContext::Console, RequestOrigin::from_env())
    }

    /// A host configured from the environment.
    ///
    /// With `GATEWAY_INTERFACE` set the program is treated as a CGI script:
    /// the output context is HTML (or AJAX when `HTTP_X_REQUESTED_WITH` is
    /// `XMLHttpRequest`), headers are printed, and `HTTP_USER_AGENT` and
    /// `QUERY_STRING` are honored.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

        let cgi = var("GATEWAY_INTERFACE").is_some();
        let context = match (cgi, var("HTTP_X_REQUESTED_WITH").as_deref()) {
            (false, _) => OutputContext::Console,
            (true, Some("XMLHttpRequest")) => OutputContext::Ajax,
            (true, _) => OutputContext::Html,
        };

        let mut host = Self::new(context, RequestOrigin::from_env());
        host.cgi = cgi;
        host.user_agent = var("HTTP_USER_AGENT");
        host.skip_error = var("QUERY_STRING").is_some_and(|query| {
            query
                .split('&')
                .any(|pair| pair.split('=').next() == Some("_faultline_skip_error"))
        });
        host
    }

    /// The output buffers, for the application to open levels on.
    pub fn buffers(&self) -> spin::MutexGuard<'_, MemoryBuffers> {
        self.buffers.lock()
    }

    /// Prints output that has made it past every buffer level.
    pub fn flush_output(&self) {
        let output = self.buffers.lock().take_output();
        if output.is_empty() {
            return;
        }
        self.send_headers();
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(output.as_bytes());
        let _ = stdout.flush();
    }

    fn send_headers(&self) {
        let head = {
            let mut response = self.response.lock();
            if response.sent {
                return;
            }
            response.sent = true;
            if !self.cgi {
                return;
            }
            let mut head = format!("Status: {}\r\n", response.status);
            for (name, value) in &response.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            head
        };
        let _ = io::stdout().lock().write_all(head.as_bytes());
    }

    /// Raises a runtime error.
    ///
    /// The registered error hook decides what happens; without one, or when
    /// the hook defers, the default handler prints
    /// `<Severity>: <message> in <file> on line <n>` (if errors are displayed)
    /// and records the error as the last error. Fatal errors bypass the hook
    /// and terminate the process with status 255 after shutdown.
    ///
    /// A recoverable fatal error comes back as `Err` for the caller to
    /// handle.
    pub fn raise(&self, event: ErrorEvent) -> Result<(), CapturedFailure> {
        let hard_fatal = event.severity.is_fatal() && !event.severity.is_recoverable_fatal();
        let hook = if hard_fatal {
            None
        } else {
            self.error_hook.read().clone()
        };

        match hook {
            Some(hook) => {
                if hook(event.clone())? == ErrorOutcome::DeferToDefault {
                    self.default_handler(&event);
                }
            }
            None => {
                self.default_handler(&event);
                if event.severity.is_fatal() {
                    self.exit(255);
                }
            }
        }
        Ok(())
    }

    fn default_handler(&self, event: &ErrorEvent) {
        if self.reporting_mask().contains(event.severity) && self.settings.read().display_errors {
            self.write_error(&format!(
                "{}: {} in {} on line {}\n",
                event.severity.name(),
                event.message,
                event.location.file,
                event.location.line
            ));
        }
        *self.last_error.lock() = Some(LastError::from(event));
    }

    /// Runs the shutdown hooks, then flushes every buffer level. Only the
    /// first call does anything.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let hooks = self.shutdown_hooks.lock().clone();
        for hook in hooks {
            hook();
        }

        {
            let mut buffers = self.buffers.lock();
            while buffers.depth() > 0 && buffers.close_top(CloseAction::Flush).is_ok() {}
        }
        self.flush_output();
    }

    /// Runs `f` as the body of the program.
    ///
    /// A panic escaping `f` is handed to the registered exception hook, which
    /// normally ends the process. Without a hook, or when the hook returns,
    /// the panic keeps unwinding.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use faultline::{Debugger, host::ProcessHost};
    ///
    /// let host = Arc::new(ProcessHost::console());
    /// let debugger = Debugger::builder(host.clone()).mode(true).build();
    /// debugger.enable();
    ///
    /// let _guard = host.guard();
    /// let answer = host.run(|| {
    ///     let caught = std::panic::catch_unwind(|| panic!("retried"));
    ///     assert!(caught.is_err());
    ///     42
    /// });
    /// assert_eq!(answer, 42);
    /// ```
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        take_recorded_panic();
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                let failure = take_recorded_panic().unwrap_or_else(|| {
                    CapturedFailure::new(
                        FailureKind::Exception,
                        "panic",
                        failure::payload_message(&*payload),
                    )
                });
                let hook = self.exception_hook.read().clone();
                if let Some(hook) = hook {
                    hook(failure);
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// A guard that calls [`shutdown`](Self::shutdown) when dropped.
    pub fn guard(self: &Arc<Self>) -> ShutdownGuard {
        ShutdownGuard(self.clone())
    }
}

impl fmt::Debug for ProcessHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHost")
            .field("context", &self.context)
            .field("origin", &self.origin)
            .field("cgi", &self.cgi)
            .field("settings", &*self.settings.read())
            .field("reporting", &self.reporting_mask())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Host for ProcessHost {
    fn origin(&self) -> RequestOrigin {
        self.origin.clone()
    }

    fn output_context(&self) -> OutputContext {
        self.context
    }

    fn skip_error_requested(&self) -> bool {
        self.skip_error
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn headers_sent(&self) -> bool {
        self.response.lock().sent
    }

    fn set_status(&self, code: u16) {
        let mut response = self.response.lock();
        if !response.sent {
            response.status = code;
        }
    }

    fn set_header(&self, name: &str, value: &str) {
        let mut response = self.response.lock();
        if response.sent {
            return;
        }
        response.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        response.headers.push((name.to_owned(), value.to_owned()));
    }

    fn write_output(&self, text: &str) {
        self.buffers.lock().write(text);
        self.flush_output();
    }

    fn write_error(&self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }

    fn with_buffers(&self, f: &mut dyn FnMut(&mut dyn BufferStack)) {
        {
            let mut buffers = self.buffers.lock();
            f(&mut *buffers);
        }
        self.flush_output();
    }

    fn apply_settings(&self, settings: RuntimeSettings) -> Result<(), HostError> {
        *self.settings.write() = settings;
        Ok(())
    }

    fn reporting_mask(&self) -> SeverityMask {
        SeverityMask::from_bits(self.reporting.load(Ordering::Acquire))
    }

    fn set_reporting_mask(&self, mask: SeverityMask) {
        self.reporting.store(mask.bits(), Ordering::Release);
    }

    fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().clone()
    }

    fn register_shutdown(&self, hook: ShutdownHook) {
        self.shutdown_hooks.lock().push(Arc::from(hook));
    }

    fn register_exception(&self, hook: ExceptionHook) {
        if let Some(capture) = &self.stack_capture {
            *PANIC_CAPTURE.write() = Some(capture.clone());
        }
        install_panic_recorder();
        *self.exception_hook.write() = Some(Arc::from(hook));
    }

    fn register_error(&self, hook: ErrorHook) {
        *self.error_hook.write() = Some(Arc::from(hook));
    }

    fn launch(&self, command: &str, argument: &str) -> Result<(), HostError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or(HostError::EmptyCommand)?;
        Command::new(program).args(parts).arg(argument).spawn()?;
        Ok(())
    }

    fn exit(&self, code: i32) {
        self.shutdown();
        std::process::exit(code)
    }
}

/// Calls [`ProcessHost::shutdown`] when dropped.
#[derive(Debug)]
#[must_use = "shutdown runs when the guard is dropped"]
pub struct ShutdownGuard(Arc<ProcessHost>);

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}
