#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Stack capture for the faultline failure handler.
//!
//! Failures that reach the debugger without a stack trace (panics, runtime
//! errors, failures built by hand) get one from the configured
//! [`StackCapture`]. [`BacktraceCapture`] walks the stack with the
//! [`backtrace`] crate, drops the handler's own frames, collapses runs of
//! framework frames and shortens well-known paths.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use faultline::{Debugger, host::ProcessHost};
//! use faultline_backtrace::BacktraceCapture;
//!
//! let debugger = Debugger::builder(Arc::new(ProcessHost::console()))
//!     .stack_capture(BacktraceCapture::new_from_env())
//!     .build();
//! ```
//!
//! The diagnostic screen and the log reports then list frames such as:
//!
//! ```text
//! Exception: db timeout in src/orders.rs:41
//! Stack trace:
//! #0 app::orders::checkout at /build/src/orders.rs:41
//! #1 [4 frame(s) from 'tokio']
//! #2 app::main at /build/src/main.rs:12
//! #3 {main}
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_BACKTRACE=full` - Keeps every frame and shows full paths
//! - `FAULTLINE_BACKTRACE` - Comma-separated options:
//!   - `full_paths` - Show full file paths in stack traces
//!
//! # Path privacy
//!
//! Registry and standard library paths are shortened to `[..]/<crate>/...`,
//! but paths of your own sources are kept as the compiler recorded them.
//! Production reports end up in log files and notification mails, so
//! consider the `--remap-path-prefix` option of `rustc`:
//!
//! ```sh
//! export RUSTFLAGS="--remap-path-prefix=$HOME=/home/user --remap-path-prefix=$PWD=/build"
//! ```

use std::{borrow::Cow, panic::Location, sync::OnceLock};

use faultline::{config::StackCapture, failure::Frame};
use regex::Regex;

/// [`StackCapture`] backed by the [`backtrace`] crate.
///
/// # Examples
///
/// ```rust
/// use faultline::config::StackCapture;
/// use faultline_backtrace::{BacktraceCapture, FrameFilter};
///
/// let capture = BacktraceCapture {
///     filter: FrameFilter {
///         collapse: &["tokio", "hyper", "tower"],
///         max_frames: 10,
///         ..FrameFilter::DEFAULT
///     },
/// };
///
/// // One extra frame may report what the limit cut off.
/// assert!(capture.capture().len() <= 11);
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct BacktraceCapture {
    /// Which frames to keep and how to show their paths.
    pub filter: FrameFilter,
}

impl BacktraceCapture {
    /// Creates a [`BacktraceCapture`] configured from the environment.
    ///
    /// The variables are read once per process.
    pub fn new_from_env() -> Self {
        let options = EnvOptions::get();
        let filter = if options.rust_backtrace_full {
            FrameFilter::UNFILTERED
        } else {
            FrameFilter::DEFAULT
        };

        Self {
            filter: FrameFilter {
                full_paths: options.full_paths,
                ..filter
            },
        }
    }
}

impl StackCapture for BacktraceCapture {
    fn capture(&self) -> Vec<Frame> {
        let mut walker = StackWalker::new(&self.filter);

        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                let (Some(name), Some(file)) = (symbol.name(), symbol.filename_raw()) else {
                    return;
                };
                let path = SourcePath::parse(file.to_string());
                walker.visit(
                    path.crate_name.clone(),
                    Frame {
                        function: Some(format!("{name:#}")),
                        file: Some(path.display(self.filter.full_paths)),
                        line: symbol.lineno(),
                        args: None,
                    },
                );
            });
            true
        });

        walker.finish()
    }
}

/// Which frames a [`BacktraceCapture`] keeps.
///
/// Crates are named as they appear in paths: `std`, `core` and `alloc` for
/// the standard library, the package name for registry crates, and
/// `faultline` / `faultline-backtrace` for the handler itself.
#[derive(Copy, Clone, Debug)]
pub struct FrameFilter {
    /// Crates dropped while they make up the innermost frames: the capture
    /// machinery and the handler.
    pub skip_innermost: &'static [&'static str],
    /// Crates whose consecutive frames are reported as a single frame.
    pub collapse: &'static [&'static str],
    /// Crates dropped while they make up the outermost frames: the runtime
    /// start-up code.
    pub skip_outermost: &'static [&'static str],
    /// Maximum number of frames kept.
    pub max_frames: usize,
    /// Whether to keep full file paths.
    pub full_paths: bool,
}

impl FrameFilter {
    /// The filter used unless `RUST_BACKTRACE=full` is set.
    pub const DEFAULT: Self = Self {
        skip_innermost: &[
            "backtrace",
            "faultline",
            "faultline-backtrace",
            "core",
            "std",
            "alloc",
        ],
        collapse: &["std", "core", "alloc", "tokio"],
        skip_outermost: &["std", "core", "alloc", "tokio"],
        max_frames: 20,
        full_paths: false,
    };

    /// Keeps every frame.
    pub const UNFILTERED: Self = Self {
        skip_innermost: &[],
        collapse: &[],
        skip_outermost: &[],
        max_frames: usize::MAX,
        full_paths: true,
    };
}

impl Default for FrameFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct EnvOptions {
    rust_backtrace_full: bool,
    full_paths: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static OPTIONS: OnceLock<EnvOptions> = OnceLock::new();

        OPTIONS.get_or_init(|| {
            let rust_backtrace_full =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            let full_paths = rust_backtrace_full
                || std::env::var_os("FAULTLINE_BACKTRACE").is_some_and(|var| {
                    var.to_string_lossy()
                        .split(',')
                        .any(|option| option.trim().eq_ignore_ascii_case("full_paths"))
                });
            EnvOptions {
                rust_backtrace_full,
                full_paths,
            }
        })
    }
}

/// Process start-up symbols that are never worth showing.
const START_SYMBOLS: &[&str] = &["__libc_start_call_main", "__libc_start_main_impl"];

struct Entry {
    crate_name: Option<Cow<'static, str>>,
    frame: Frame,
}

/// A run of frames from one collapsed crate. A run of one is shown as the
/// frame itself.
struct Run {
    crate_name: &'static str,
    first: Frame,
    count: usize,
}

/// Applies a [`FrameFilter`] to frames visited innermost first.
struct StackWalker<'a> {
    filter: &'a FrameFilter,
    entries: Vec<Entry>,
    skipping_innermost: bool,
    run: Option<Run>,
    truncated: usize,
}

impl<'a> StackWalker<'a> {
    fn new(filter: &'a FrameFilter) -> Self {
        Self {
            filter,
            entries: Vec::new(),
            skipping_innermost: true,
            run: None,
            truncated: 0,
        }
    }

    fn visit(&mut self, crate_name: Option<Cow<'static, str>>, frame: Frame) {
        if self.entries.len() >= self.filter.max_frames {
            self.truncated += 1;
            return;
        }

        let listed = |list: &'static [&'static str]| {
            crate_name
                .as_deref()
                .and_then(|name| list.iter().copied().find(|listed| *listed == name))
        };

        if self.skipping_innermost {
            if listed(self.filter.skip_innermost).is_some() {
                return;
            }
            self.skipping_innermost = false;
        }

        if let Some(run) = &mut self.run
            && crate_name.as_deref() == Some(run.crate_name)
        {
            run.count += 1;
            return;
        }
        self.end_run();

        match listed(self.filter.collapse) {
            Some(collapsed) => {
                self.run = Some(Run {
                    crate_name: collapsed,
                    first: frame,
                    count: 1,
                });
            }
            None => self.entries.push(Entry { crate_name, frame }),
        }
    }

    fn end_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        let frame = if run.count == 1 {
            run.first
        } else {
            Frame {
                function: Some(format!("[{} frame(s) from '{}']", run.count, run.crate_name)),
                ..Frame::default()
            }
        };
        self.entries.push(Entry {
            crate_name: Some(Cow::Borrowed(run.crate_name)),
            frame,
        });
    }

    fn finish(mut self) -> Vec<Frame> {
        self.end_run();

        while let Some(last) = self.entries.last() {
            let outer_crate = last
                .crate_name
                .as_deref()
                .is_some_and(|name| self.filter.skip_outermost.contains(&name));
            let start_symbol = last
                .frame
                .function
                .as_deref()
                .is_some_and(|function| START_SYMBOLS.contains(&function));
            if !outer_crate && !start_symbol {
                break;
            }
            self.entries.pop();
        }

        let mut frames: Vec<Frame> = self.entries.into_iter().map(|entry| entry.frame).collect();
        if self.truncated > 0 {
            frames.push(Frame {
                function: Some(format!("[{} more frame(s)]", self.truncated)),
                ..Frame::default()
            });
        }
        frames
    }
}

/// Where a source path comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PathOrigin {
    RustSrc,
    Registry,
    Faultline,
    Unknown,
}

/// A source path with the crate it belongs to, when recognizable.
#[derive(Debug)]
struct SourcePath {
    raw: String,
    origin: PathOrigin,
    crate_name: Option<Cow<'static, str>>,
    /// Byte offset where the path becomes crate relative.
    relative_from: Option<usize>,
}

const fn crate_root_matcher(location: &'static Location<'static>) -> Option<(&'static str, usize)> {
    let file = location.file();
    let Some(root_len) = file.len().checked_sub("/src/lib.rs".len()) else {
        return None;
    };

    // `<root>/src` matches the crate's sources; shortened paths start at the
    // crate directory itself.
    let (with_src, _) = file.split_at(root_len + 4);
    let bytes = file.as_bytes();
    let mut start = root_len;
    while start > 0 && bytes[start - 1] != std::path::MAIN_SEPARATOR as u8 {
        start -= 1;
    }
    Some((with_src, start))
}

const FAULTLINE_ROOT: Option<(&str, usize)> =
    crate_root_matcher(faultline::__private::FAULTLINE_LOCATION);
const BACKTRACE_ROOT: Option<(&str, usize)> = crate_root_matcher(Location::caller());

impl SourcePath {
    fn parse(raw: String) -> Self {
        static PATTERNS: OnceLock<[(PathOrigin, Regex); 2]> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            [
                // <sysroot>/lib/rustlib/src/rust/library/std/src/...
                // /rustc/<commit>/library/core/src/...
                (
                    PathOrigin::RustSrc,
                    Regex::new(
                        r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/(std|core|alloc)/src/.*$",
                    )
                    .expect("built-in standard library path pattern should be valid"),
                ),
                // ~/.cargo/registry/src/<index>-<hash>/<crate>-<version>/src/...
                (
                    PathOrigin::Registry,
                    Regex::new(
                        r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^./]+)-[0-9]+\.[^/]*/src/.*$",
                    )
                    .expect("built-in cargo registry path pattern should be valid"),
                ),
            ]
        });

        for (origin, pattern) in patterns {
            if let Some(name) = pattern.captures(&raw).and_then(|captures| captures.get(1)) {
                return Self {
                    crate_name: Some(Cow::Owned(name.as_str().to_owned())),
                    relative_from: Some(name.start()),
                    origin: *origin,
                    raw,
                };
            }
        }

        for (root, name) in [(FAULTLINE_ROOT, "faultline"), (BACKTRACE_ROOT, "faultline-backtrace")] {
            if let Some((with_src, start)) = root
                && raw.starts_with(with_src)
            {
                return Self {
                    crate_name: Some(Cow::Borrowed(name)),
                    relative_from: Some(start),
                    origin: PathOrigin::Faultline,
                    raw,
                };
            }
        }

        Self {
            raw,
            origin: PathOrigin::Unknown,
            crate_name: None,
            relative_from: None,
        }
    }

    fn display(&self, full_paths: bool) -> String {
        match self.relative_from {
            Some(start) if !full_paths => format!("[..]/{}", &self.raw[start..]),
            _ => self.raw.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(function: &str) -> Frame {
        Frame {
            function: Some(function.to_owned()),
            ..Frame::default()
        }
    }

    fn walk(filter: &FrameFilter, stack: &[(Option<&'static str>, &str)]) -> Vec<String> {
        let mut walker = StackWalker::new(filter);
        for (crate_name, function) in stack {
            walker.visit(crate_name.map(Cow::Borrowed), frame(function));
        }
        walker
            .finish()
            .into_iter()
            .map(|frame| frame.to_string())
            .collect()
    }

    #[test]
    fn test_registry_path() {
        let path = SourcePath::parse(String::from(
            "/home/user/.cargo/registry/src/index.crates.io-1949cf8c6b5b557f/indexmap-2.12.1/src/map/core/entry.rs",
        ));
        assert_eq!(path.origin, PathOrigin::Registry);
        assert_eq!(path.crate_name.as_deref(), Some("indexmap"));
        assert_eq!(path.display(false), "[..]/indexmap-2.12.1/src/map/core/entry.rs");
        assert_eq!(path.display(true), path.raw);
    }

    #[test]
    fn test_std_path() {
        let path = SourcePath::parse(String::from(
            "/rustc/0123456789abcdef0123456789abcdef01234567/library/std/src/panicking.rs",
        ));
        assert_eq!(path.origin, PathOrigin::RustSrc);
        assert_eq!(path.crate_name.as_deref(), Some("std"));
        assert_eq!(path.display(false), "[..]/std/src/panicking.rs");
    }

    #[test]
    fn test_own_sources_are_recognized() {
        let path = SourcePath::parse(String::from(file!()));
        if BACKTRACE_ROOT.is_some_and(|(with_src, _)| file!().starts_with(with_src)) {
            assert_eq!(path.origin, PathOrigin::Faultline);
            assert_eq!(path.crate_name.as_deref(), Some("faultline-backtrace"));
            assert_eq!(path.display(false), "[..]/faultline-backtrace/src/lib.rs");
        }
    }

    #[test]
    fn test_unknown_path_is_kept() {
        let path = SourcePath::parse(String::from("/build/src/orders.rs"));
        assert_eq!(path.origin, PathOrigin::Unknown);
        assert!(path.crate_name.is_none());
        assert_eq!(path.display(false), "/build/src/orders.rs");
    }

    #[test]
    fn test_walker_trims_both_ends() {
        let frames = walk(
            &FrameFilter::DEFAULT,
            &[
                (Some("backtrace"), "backtrace::trace"),
                (Some("faultline"), "faultline::Debugger::dispatch"),
                (None, "app::orders::checkout"),
                (None, "app::main"),
                (Some("std"), "std::rt::lang_start"),
                (None, "__libc_start_main_impl"),
            ],
        );
        assert_eq!(frames, ["app::orders::checkout", "app::main"]);
    }

    #[test]
    fn test_walker_collapses_runs() {
        let frames = walk(
            &FrameFilter::DEFAULT,
            &[
                (None, "app::orders::checkout"),
                (Some("tokio"), "tokio::runtime::poll"),
                (Some("tokio"), "tokio::runtime::run"),
                (Some("tokio"), "tokio::task::spawn"),
                (None, "app::serve"),
                (Some("core"), "core::ops::function::call"),
                (None, "app::main"),
            ],
        );
        assert_eq!(
            frames,
            [
                "app::orders::checkout",
                "[3 frame(s) from 'tokio']",
                "app::serve",
                "core::ops::function::call",
                "app::main",
            ]
        );
    }

    #[test]
    fn test_walker_reports_truncation() {
        let filter = FrameFilter {
            max_frames: 2,
            ..FrameFilter::UNFILTERED
        };
        let frames = walk(
            &filter,
            &[(None, "a"), (None, "b"), (None, "c"), (None, "d")],
        );
        assert_eq!(frames, ["a", "b", "[2 more frame(s)]"]);
    }

    #[test]
    fn test_capture_respects_limit() {
        let capture = BacktraceCapture {
            filter: FrameFilter {
                max_frames: 2,
                ..FrameFilter::DEFAULT
            },
        };
        assert!(capture.capture().len() <= 3);
    }
}
