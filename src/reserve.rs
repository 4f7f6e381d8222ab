//! Memory held back for the failure path.
//!
//! An out-of-memory failure leaves the handler with nothing to allocate
//! with. The [`ReservedSlack`] holds a block from install time and frees it
//! as the very first step of failure handling. Whether the block is still
//! held doubles as the "not handled yet" flag of the shutdown and exception
//! paths.

/// Size of the reserved block in bytes.
pub const SLACK_SIZE: usize = 30_000;

/// A block of memory released once, right before failure handling.
#[derive(Debug, Default)]
pub struct ReservedSlack {
    block: spin::Mutex<Option<Box<[u8]>>>,
    armed: core::sync::atomic::AtomicBool,
}

impl ReservedSlack {
    /// Creates an unarmed reservation.
    pub const fn new() -> Self {
        Self {
            block: spin::Mutex::new(None),
            armed: core::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Allocates the block.
    ///
    /// Only the first call allocates; a reservation that was released is not
    /// re-acquired. Returns whether this call allocated.
    pub fn arm(&self) -> bool {
        use core::sync::atomic::Ordering;

        if self.armed.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.block.lock() = Some(vec![b't'; SLACK_SIZE].into_boxed_slice());
        true
    }

    /// Whether the block is currently held.
    pub fn is_held(&self) -> bool {
        self.block.lock().is_some()
    }

    /// Frees the block. Returns whether it was held, i.e. whether this is the
    /// first release.
    pub fn release(&self) -> bool {
        let block = self.block.lock().take();
        block.is_some()
    }
}
