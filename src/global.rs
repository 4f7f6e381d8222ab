//! The process-wide debugger slot and shortcuts that use it.
//!
//! Code far away from where the [`Debugger`] was built (a helper dumping a
//! value, a library logging a message) reaches it through [`current`]. The
//! shortcuts in this module do nothing, or return the neutral value, when no
//! debugger is installed.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use faultline::{Debugger, global, host::ProcessHost};
//!
//! let debugger = Debugger::builder(Arc::new(ProcessHost::console())).mode(true).build();
//! global::install_global(debugger).expect("no debugger installed yet");
//!
//! assert!(global::current().is_some_and(|debugger| debugger.is_production()));
//! assert!(global::install_global(Debugger::builder(Arc::new(ProcessHost::console())).build()).is_err());
//! ```

use core::{fmt, time::Duration};
use std::sync::Arc;

use crate::{
    Debugger,
    severity::LogLevel,
    sink::{LogEntry, LogError, LogReference},
};

struct Slot<T: 'static + Send + Sync>(spin::RwLock<Option<T>>);

impl<T: 'static + Send + Sync + Clone> Slot<T> {
    const fn new() -> Self {
        Self(spin::RwLock::new(None))
    }

    fn get(&'static self) -> Option<T> {
        self.0.read().clone()
    }

    fn install(&'static self, value: T) -> Result<(), T> {
        let mut slot = self.0.write();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        Ok(())
    }

    fn replace(&'static self, value: T) -> Option<T> {
        self.0.write().replace(value)
    }
}

static GLOBAL: Slot<Arc<Debugger>> = Slot::new();

/// Error returned by [`install_global`] when a debugger is already installed.
///
/// Contains the debugger that was not installed.
pub struct AlreadyInstalledError(pub Arc<Debugger>);

impl fmt::Debug for AlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlreadyInstalledError").finish()
    }
}

impl fmt::Display for AlreadyInstalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a debugger is already installed globally")
    }
}

impl core::error::Error for AlreadyInstalledError {}

/// Makes `debugger` the process-wide debugger.
pub fn install_global(debugger: Arc<Debugger>) -> Result<(), AlreadyInstalledError> {
    GLOBAL.install(debugger).map_err(AlreadyInstalledError)
}

/// Makes `debugger` the process-wide debugger, returning the previous one.
pub fn replace_global(debugger: Arc<Debugger>) -> Option<Arc<Debugger>> {
    GLOBAL.replace(debugger)
}

/// The process-wide debugger, if one is installed.
pub fn current() -> Option<Arc<Debugger>> {
    GLOBAL.get()
}

/// [`Debugger::dump`] on the process-wide debugger.
#[track_caller]
pub fn dump<T: fmt::Debug>(value: T) -> T {
    match current() {
        Some(debugger) => debugger.dump(value),
        None => value,
    }
}

/// [`Debugger::bar_dump`] on the process-wide debugger.
#[track_caller]
pub fn bar_dump<T: fmt::Debug>(value: T, title: Option<&str>) -> T {
    match current() {
        Some(debugger) => debugger.bar_dump(value, title),
        None => value,
    }
}

/// [`Debugger::timer`] on the process-wide debugger.
pub fn timer(name: &str) -> Duration {
    current().map_or(Duration::ZERO, |debugger| debugger.timer(name))
}

/// [`Debugger::log`] on the process-wide debugger. Fails with
/// [`LogError::NoDirectory`] when none is installed.
pub fn log<'a>(
    entry: impl Into<LogEntry<'a>>,
    level: LogLevel,
) -> Result<Option<LogReference>, LogError> {
    match current() {
        Some(debugger) => debugger.log(entry, level),
        None => Err(LogError::NoDirectory),
    }
}

/// [`Debugger::fire_log`] on the process-wide debugger.
pub fn fire_log<'a>(entry: impl Into<LogEntry<'a>>) -> bool {
    current().is_some_and(|debugger| debugger.fire_log(entry))
}
