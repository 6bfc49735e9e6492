//! Output sinks for VWAP updates
//!
//! A [`VwapCalculator`](crate::algorithms::VwapCalculator) emits one
//! [`VwapUpdate`] per applied tick while holding its own lock, so `emit` must
//! return quickly: log it, hand it off over a channel, or broadcast it.

pub mod broadcaster;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::algorithms::vwap::VwapUpdate;

pub use broadcaster::VwapBroadcaster;

/// Destination for VWAP updates
pub trait VwapSink: Send + Sync {
    fn emit(&self, update: &VwapUpdate);
}

impl<S: VwapSink + ?Sized> VwapSink for Arc<S> {
    fn emit(&self, update: &VwapUpdate) {
        (**self).emit(update)
    }
}

/// Writes every update to the log at `info` level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl VwapSink for TracingSink {
    fn emit(&self, update: &VwapUpdate) {
        tracing::info!(
            instrument = %update.instrument,
            market_place = %update.market_place,
            bid_vwap = update.bid_vwap,
            ask_vwap = update.ask_vwap,
            "{}",
            update
        );
    }
}

/// Non-blocking handoff of updates to an async consumer
///
/// Once the receiver is dropped updates are discarded; the first discard is
/// logged.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<VwapUpdate>,
    closed_logged: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiver its updates arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<VwapUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            closed_logged: AtomicBool::new(false),
        };
        (sink, rx)
    }
}

impl VwapSink for ChannelSink {
    fn emit(&self, update: &VwapUpdate) {
        if self.tx.send(update.clone()).is_err() && !self.closed_logged.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                instrument = %update.instrument,
                "VWAP channel receiver dropped, discarding updates"
            );
        }
    }
}

/// Forwards each update to several sinks, in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn VwapSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn VwapSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl VwapSink for FanoutSink {
    fn emit(&self, update: &VwapUpdate) {
        for sink in &self.sinks {
            sink.emit(update);
        }
    }
}

/// Keeps every update in memory. Meant for tests and diagnostics.
#[derive(Default)]
pub struct MemorySink {
    updates: Mutex<Vec<VwapUpdate>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<VwapUpdate> {
        self.updates.lock().clone()
    }

    pub fn last(&self) -> Option<VwapUpdate> {
        self.updates.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }
}

impl VwapSink for MemorySink {
    fn emit(&self, update: &VwapUpdate) {
        self.updates.lock().push(update.clone());
    }
}
