//! Safe unwinding of nested output buffers during failure handling.
//!
//! Hosts usually capture response output in a stack of buffers. When a
//! failure must print something instead of the half-built response, the
//! buffers opened by the application have to go: discarded when the output
//! is being replaced, flushed when it is merely being appended to.
//!
//! [`mark`] records the depth at install time. [`unwind`] only ever closes
//! levels strictly above that mark, stops at compression levels (closing them
//! corrupts the compressed stream) and gives up silently on the first level
//! that refuses to close. Cleanup during failure handling must never raise a
//! new failure.

use alloc::borrow::Cow;
use core::fmt;

/// Buffer nesting depth recorded when the hooks were installed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferMark(usize);

impl BufferMark {
    /// A mark at `depth`.
    pub const fn new(depth: usize) -> Self {
        Self(depth)
    }

    /// The recorded depth.
    pub const fn depth(self) -> usize {
        self.0
    }
}

/// What to do with the content of a closed level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CloseAction {
    /// Pass the content down to the next level.
    Flush,
    /// Drop the content.
    Discard,
}

/// Description of the innermost buffer level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelStatus {
    /// Name of the level's handler.
    pub name: Cow<'static, str>,
    /// Internal chunk size; zero means the level cannot discard its content.
    pub chunk_size: usize,
    /// Whether the level is a compression filter that must stay open.
    pub protected: bool,
}

/// A level could not be closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferError {
    /// Depth of the level that refused to close.
    pub depth: usize,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output buffer at depth {} could not be closed", self.depth)
    }
}

impl core::error::Error for BufferError {}

/// A stack of output buffers owned by the host.
pub trait BufferStack {
    /// Current nesting depth; zero when nothing is buffered.
    fn depth(&self) -> usize;

    /// Status of the innermost level, if any.
    fn top_status(&self) -> Option<LevelStatus>;

    /// Closes the innermost level.
    fn close_top(&mut self, action: CloseAction) -> Result<(), BufferError>;

    /// Whether the innermost level must not be force-closed.
    fn top_is_protected(&self) -> bool {
        self.top_status().is_some_and(|status| status.protected)
    }
}

/// Records the current depth of `stack`.
pub fn mark(stack: &dyn BufferStack) -> BufferMark {
    BufferMark(stack.depth())
}

/// Closes every level above `mark`, innermost first, and returns how many were
/// closed.
///
/// A level is flushed when `flush` is set or when its chunk size is zero, and
/// discarded otherwise. The walk stops at a protected level or at the first
/// level that fails to close.
pub fn unwind(stack: &mut dyn BufferStack, mark: BufferMark, flush: bool) -> usize {
    let mut closed = 0;
    while stack.depth() > mark.depth() {
        let Some(status) = stack.top_status() else {
            break;
        };
        if status.protected {
            break;
        }

        let action = if flush || status.chunk_size == 0 {
            CloseAction::Flush
        } else {
            CloseAction::Discard
        };
        if stack.close_top(action).is_err() {
            break;
        }
        closed += 1;
    }
    closed
}

/// Names of compression handlers that are treated as protected.
pub const COMPRESSION_HANDLERS: &[&str] = &["gzip", "zlib output compression"];

#[derive(Debug)]
struct Level {
    name: Cow<'static, str>,
    chunk_size: usize,
    removable: bool,
    content: String,
}

/// An in-memory [`BufferStack`].
///
/// Writes go to the innermost level, or straight to the base output when
/// nothing is buffered. Hosts drain the base output with
/// [`take_output`](Self::take_output).
///
/// # Examples
///
/// ```
/// use faultline::buffer::{self, MemoryBuffers};
///
/// let mut buffers = MemoryBuffers::new();
/// let mark = buffer::mark(&buffers);
///
/// buffers.push("page", 4096);
/// buffers.write("<html>half a page");
/// assert_eq!(buffer::unwind(&mut buffers, mark, false), 1);
///
/// // The half-built page was discarded.
/// assert_eq!(buffers.take_output(), "");
/// ```
#[derive(Debug, Default)]
pub struct MemoryBuffers {
    levels: Vec<Level>,
    output: String,
}

impl MemoryBuffers {
    /// Creates a stack with nothing buffered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a level. Names listed in [`COMPRESSION_HANDLERS`] are protected.
    pub fn push(&mut self, name: impl Into<Cow<'static, str>>, chunk_size: usize) {
        self.levels.push(Level {
            name: name.into(),
            chunk_size,
            removable: true,
            content: String::new(),
        });
    }

    /// Opens a level that refuses to be closed.
    pub fn push_unremovable(&mut self, name: impl Into<Cow<'static, str>>, chunk_size: usize) {
        self.push(name, chunk_size);
        if let Some(level) = self.levels.last_mut() {
            level.removable = false;
        }
    }

    /// Appends to the innermost level.
    pub fn write(&mut self, text: &str) {
        match self.levels.last_mut() {
            Some(level) => level.content.push_str(text),
            None => self.output.push_str(text),
        }
    }

    /// Content of the level at `depth` (one-based), if open.
    pub fn content(&self, depth: usize) -> Option<&str> {
        depth
            .checked_sub(1)
            .and_then(|index| self.levels.get(index))
            .map(|level| level.content.as_str())
    }

    /// Takes everything flushed past the outermost level.
    pub fn take_output(&mut self) -> String {
        core::mem::take(&mut self.output)
    }
}

impl BufferStack for MemoryBuffers {
    fn depth(&self) -> usize {
        self.levels.len()
    }

    fn top_status(&self) -> Option<LevelStatus> {
        self.levels.last().map(|level| LevelStatus {
            name: level.name.clone(),
            chunk_size: level.chunk_size,
            protected: COMPRESSION_HANDLERS.contains(&&*level.name),
        })
    }

    fn close_top(&mut self, action: CloseAction) -> Result<(), BufferError> {
        let depth = self.levels.len();
        match self.levels.last() {
            Some(level) if level.removable => {}
            _ => return Err(BufferError { depth }),
        }

        let Some(level) = self.levels.pop() else {
            return Err(BufferError { depth });
        };
        if action == CloseAction::Flush {
            self.write(&level.content);
        }
        Ok(())
    }
}
