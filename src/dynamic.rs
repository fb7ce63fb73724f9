//! Shared handle for settings that change while requests are in flight.
//!
//! The middleware keeps its [`WindowLimits`](crate::WindowLimits) here, so an
//! operator can raise or lower thresholds without rebuilding the service
//! stack. Each request takes one snapshot and checks every window against it.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// A value published to every clone at once.
///
/// Readers never block writers: [`snapshot`](Self::get) hands out the
/// currently published `Arc`, and a concurrent [`set`](Self::set) only affects
/// later snapshots.
#[derive(Debug)]
pub struct DynamicConfig<T> {
    current: Arc<ArcSwap<T>>,
}

impl<T> Clone for DynamicConfig<T> {
    fn clone(&self) -> Self {
        Self { current: Arc::clone(&self.current) }
    }
}

impl<T> DynamicConfig<T> {
    pub fn new(value: T) -> Self {
        Self { current: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// The value in effect right now. Holding the snapshot does not delay
    /// updates.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Publish `value` to every holder of this handle.
    pub fn set(&self, value: T) {
        self.current.store(Arc::new(value));
    }

    /// Publish a value derived from the current one.
    ///
    /// `f` is retried against the newer value if another writer publishes in
    /// between, so no update is lost.
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> T,
    {
        self.current.rcu(|current| f(current));
    }
}
