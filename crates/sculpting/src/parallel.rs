//! Fork-join evaluation over spatial tree leaves.
//!
//! Kernels run once per leaf and return the writes they want to make; the
//! caller applies the results after every leaf has finished. A
//! [`CancelToken`] is checked before each leaf starts, so a cancelled step
//! produces no results at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chisel_config::ThreadingSettings;
use rayon::prelude::*;
use tracing::trace;

use crate::error::{SculptError, SculptResult};
use crate::spatial::LeafId;

/// Cooperative cancellation flag shared between the caller and running
/// kernels.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a leaf loop is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelSettings {
    pub use_threading: bool,
    /// Fewer leaves than this run on the calling thread
    pub min_leaves: usize,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self::from(&ThreadingSettings::default())
    }
}

impl From<&ThreadingSettings> for ParallelSettings {
    fn from(settings: &ThreadingSettings) -> Self {
        Self {
            use_threading: settings.enabled,
            min_leaves: settings.min_leaves,
        }
    }
}

impl ParallelSettings {
    /// Force evaluation onto the calling thread.
    pub fn single_threaded() -> Self {
        Self {
            use_threading: false,
            min_leaves: usize::MAX,
        }
    }

    pub fn is_threaded(&self, leaf_count: usize) -> bool {
        self.use_threading && leaf_count >= self.min_leaves.max(1)
    }
}

/// Values one leaf wants written back, keyed by vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafWrites<T> {
    pub leaf: LeafId,
    pub values: Vec<(u32, T)>,
}

impl<T> LeafWrites<T> {
    pub fn new(leaf: LeafId) -> Self {
        Self {
            leaf,
            values: Vec::new(),
        }
    }

    pub fn push(&mut self, vert: u32, value: T) {
        self.values.push((vert, value));
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Run `kernel` on every leaf and collect the results in leaf order.
pub fn map_leaves<T, F>(
    leaves: &[LeafId],
    settings: ParallelSettings,
    cancel: &CancelToken,
    kernel: F,
) -> SculptResult<Vec<T>>
where
    T: Send,
    F: Fn(LeafId) -> T + Sync,
{
    let run = |leaf: LeafId| {
        if cancel.is_cancelled() {
            return Err(SculptError::Cancelled);
        }
        Ok(kernel(leaf))
    };

    if settings.is_threaded(leaves.len()) {
        trace!("Evaluating {} leaves on the thread pool", leaves.len());
        leaves.par_iter().map(|&leaf| run(leaf)).collect()
    } else {
        leaves.iter().map(|&leaf| run(leaf)).collect()
    }
}
