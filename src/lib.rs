#![deny(
    missing_docs,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
#![forbid(unsafe_code)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process failure capture and dispatch for web application runtimes.
//!
//! ## Overview
//!
//! faultline takes over the unhandled-failure path of one process. It
//! installs three hooks into the runtime it runs in (an uncaught-exception
//! hook, an error/warning hook and a shutdown hook) and routes everything
//! they capture according to the operating mode:
//!
//! - in **development** a failure is shown on an interactive diagnostic
//!   screen, or printed as a summary when there is no page to render into;
//! - in **production** it is written to the log directory and the client
//!   only sees a generic failure page.
//!
//! Repeated warnings are deduplicated, output buffers opened by the
//! application are unwound before anything is written, and a small block
//! of memory is held in reserve until the first failure so the handler
//! still has room to work when the process ran out.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use faultline::{Debugger, Enabled, host::ProcessHost, severity::StrictMode};
//!
//! let host = Arc::new(ProcessHost::from_env());
//! let debugger = Debugger::builder(host.clone())
//!     .mode(true)
//!     .strict_mode(StrictMode::All)
//!     .build();
//!
//! assert_eq!(debugger.enable(), Enabled::Installed);
//! assert_eq!(debugger.enable(), Enabled::AlreadyEnabled);
//! ```
//!
//! ## Core Concepts
//!
//! The runtime is reached through the [`Host`](host::Host) trait: response
//! headers, output buffers, error settings and the registration of hooks
//! all go through it. [`ProcessHost`](host::ProcessHost) is the host for
//! Rust binaries run from a terminal or as CGI programs; tests and
//! embedders provide their own.
//!
//! Everything that is captured becomes a
//! [`CapturedFailure`](failure::CapturedFailure): a class, a message, an
//! optional location and stack, and an optional chained cause. Runtime
//! warnings arrive as [`ErrorEvent`](event::ErrorEvent)s and are only
//! turned into failures when they have to be shown or logged.
//!
//! Presentation is delegated to small traits with plain implementations:
//! [`Renderer`](render::Renderer) draws the diagnostic screen and the
//! failure page, [`ToolbarRenderer`](render::ToolbarRenderer) the debug
//! toolbar, [`Inspector`](render::Inspector) value dumps,
//! [`LogSink`](sink::LogSink) persists failures and
//! [`ConsoleForwarder`](sink::ConsoleForwarder) streams them to a live
//! console.
//!
//! ## Ecosystem
//!
//! - **[`faultline-backtrace`]** - stack capture with crate-aware frame
//!   filtering, plugged in with
//!   [`DebuggerBuilder::stack_capture`].
//! - **[`faultline-tracing`]** - forwards failures to `tracing` and records
//!   the active spans as failure context.
//!
//! [`faultline-backtrace`]: https://docs.rs/faultline-backtrace
//! [`faultline-tracing`]: https://docs.rs/faultline-tracing

extern crate alloc;

#[macro_use]
mod macros;

pub mod bar;
pub mod buffer;
pub mod compat;
pub mod config;
pub mod dedup;
pub mod event;
pub mod failure;
pub mod global;
pub mod host;
pub mod mode;
pub mod prelude;
pub mod render;
pub mod reserve;
pub mod severity;
pub mod sink;

mod debugger;

pub use self::debugger::{
    Debugger, DebuggerBuilder, Disposition, ERROR_LOG_HEADER, Enabled, FATAL_EXIT_CODE,
};

#[doc(hidden)]
pub mod __private {
    // Used by faultline-backtrace
    pub const FAULTLINE_LOCATION: &core::panic::Location = core::panic::Location::caller();

    #[doc(hidden)]
    pub use alloc::format;
    #[doc(hidden)]
    pub use core::result::Result::Err;
}
