//! A host and collaborators that record what the debugger does to them.

#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicU32, Ordering},
};

use faultline::{
    buffer::{BufferStack, MemoryBuffers},
    event::{ErrorEvent, ErrorOutcome},
    failure::CapturedFailure,
    host::{
        ErrorHook, ExceptionHook, Host, HostError, LastError, OutputContext, RuntimeSettings,
        ShutdownHook,
    },
    mode::RequestOrigin,
    severity::{LogLevel, SeverityMask},
    sink::{ConsoleForwarder, LogEntry, LogError, LogReference, LogSink},
};

pub struct RecordingHost {
    pub context: OutputContext,
    pub origin: RequestOrigin,
    pub user_agent: Option<String>,
    pub skip_error: bool,
    pub refuse_settings: bool,
    pub aborted: AtomicBool,
    pub headers_sent: AtomicBool,
    pub status: Mutex<Option<u16>>,
    pub headers: Mutex<Vec<(String, String)>>,
    pub output: Mutex<String>,
    pub errors: Mutex<String>,
    pub buffers: Mutex<MemoryBuffers>,
    pub settings: Mutex<Option<RuntimeSettings>>,
    pub mask: AtomicU32,
    pub last_error: Mutex<Option<LastError>>,
    pub shutdown_hooks: Mutex<Vec<Arc<dyn Fn() + Send + Sync>>>,
    pub exception_hooks: Mutex<Vec<Arc<dyn Fn(CapturedFailure) + Send + Sync>>>,
    pub error_hooks: Mutex<Vec<ErrorHook>>,
    pub launched: Mutex<Vec<(String, String)>>,
    pub exits: Mutex<Vec<i32>>,
}

impl RecordingHost {
    pub fn new(context: OutputContext) -> Self {
        Self {
            context,
            origin: RequestOrigin {
                remote_addr: Some(String::from("203.0.113.9")),
                host_name: String::from("web-1"),
                secret: None,
                forwarded: false,
            },
            user_agent: None,
            skip_error: false,
            refuse_settings: false,
            aborted: AtomicBool::new(false),
            headers_sent: AtomicBool::new(false),
            status: Mutex::new(None),
            headers: Mutex::new(Vec::new()),
            output: Mutex::new(String::new()),
            errors: Mutex::new(String::new()),
            buffers: Mutex::new(MemoryBuffers::new()),
            settings: Mutex::new(None),
            mask: AtomicU32::new(SeverityMask::ALL.bits()),
            last_error: Mutex::new(None),
            shutdown_hooks: Mutex::new(Vec::new()),
            exception_hooks: Mutex::new(Vec::new()),
            error_hooks: Mutex::new(Vec::new()),
            launched: Mutex::new(Vec::new()),
            exits: Mutex::new(Vec::new()),
        }
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn errors(&self) -> String {
        self.errors.lock().unwrap().clone()
    }

    pub fn status(&self) -> Option<u16> {
        *self.status.lock().unwrap()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap()
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> (usize, usize, usize) {
        (
            self.shutdown_hooks.lock().unwrap().len(),
            self.exception_hooks.lock().unwrap().len(),
            self.error_hooks.lock().unwrap().len(),
        )
    }

    /// Raises `event` through the most recently registered error hook.
    pub fn raise(&self, event: ErrorEvent) -> Result<ErrorOutcome, CapturedFailure> {
        let hooks = self.error_hooks.lock().unwrap();
        let hook = hooks.last().expect("no error hook registered");
        hook(event)
    }

    pub fn throw(&self, failure: CapturedFailure) {
        let hook = self
            .exception_hooks
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no exception hook registered");
        hook(failure);
    }

    pub fn shut_down(&self) {
        let hooks = self.shutdown_hooks.lock().unwrap().clone();
        for hook in hooks {
            hook();
        }
    }
}

impl Host for RecordingHost {
    fn origin(&self) -> RequestOrigin {
        self.origin.clone()
    }

    fn output_context(&self) -> OutputContext {
        self.context
    }

    fn connection_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn skip_error_requested(&self) -> bool {
        self.skip_error
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn headers_sent(&self) -> bool {
        self.headers_sent.load(Ordering::SeqCst)
    }

    fn set_status(&self, code: u16) {
        *self.status.lock().unwrap() = Some(code);
    }

    fn set_header(&self, name: &str, value: &str) {
        self.headers
            .lock()
            .unwrap()
            .push((name.to_owned(), value.to_owned()));
    }

    fn write_output(&self, text: &str) {
        self.output.lock().unwrap().push_str(text);
    }

    fn write_error(&self, text: &str) {
        self.errors.lock().unwrap().push_str(text);
    }

    fn with_buffers(&self, f: &mut dyn FnMut(&mut dyn BufferStack)) {
        let mut buffers = self.buffers.lock().unwrap();
        f(&mut *buffers);
        let flushed = buffers.take_output();
        self.output.lock().unwrap().push_str(&flushed);
    }

    fn apply_settings(&self, settings: RuntimeSettings) -> Result<(), HostError> {
        if self.refuse_settings {
            return Err(HostError::Refused {
                setting: "display_errors".into(),
            });
        }
        *self.settings.lock().unwrap() = Some(settings);
        Ok(())
    }

    fn reporting_mask(&self) -> SeverityMask {
        SeverityMask::from_bits(self.mask.load(Ordering::SeqCst))
    }

    fn set_reporting_mask(&self, mask: SeverityMask) {
        self.mask.store(mask.bits(), Ordering::SeqCst);
    }

    fn last_error(&self) -> Option<LastError> {
        self.last_error.lock().unwrap().clone()
    }

    fn register_shutdown(&self, hook: ShutdownHook) {
        self.shutdown_hooks.lock().unwrap().push(Arc::from(hook));
    }

    fn register_exception(&self, hook: ExceptionHook) {
        self.exception_hooks.lock().unwrap().push(Arc::from(hook));
    }

    fn register_error(&self, hook: ErrorHook) {
        self.error_hooks.lock().unwrap().push(hook);
    }

    fn launch(&self, command: &str, argument: &str) -> Result<(), HostError> {
        self.launched
            .lock()
            .unwrap()
            .push((command.to_owned(), argument.to_owned()));
        Ok(())
    }

    fn exit(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

/// A sink keeping every entry as `(text, level)`.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub entries: Arc<Mutex<Vec<(String, LogLevel)>>>,
    pub reference: Option<LogReference>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<(String, LogLevel)> {
        self.entries.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn write(&self, entry: LogEntry<'_>, level: LogLevel) -> Result<Option<LogReference>, LogError> {
        if self.fail {
            return Err(LogError::Rejected(String::from("disk full")));
        }
        self.entries.lock().unwrap().push((entry.to_string(), level));
        Ok(self.reference.clone())
    }
}

/// A console forwarder keeping every entry it was sent.
#[derive(Clone, Default)]
pub struct RecordingConsole {
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingConsole {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl ConsoleForwarder for RecordingConsole {
    fn send(&self, entry: LogEntry<'_>) -> bool {
        self.sent.lock().unwrap().push(entry.to_string());
        true
    }
}
