use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::VwapSink;
use crate::algorithms::vwap::VwapUpdate;

/// Topic carrying updates for every instrument
pub const ALL_INSTRUMENTS: &str = "vwap:*";

fn instrument_topic(instrument: &str) -> String {
    format!("vwap:{}", instrument)
}

/// Pub/sub fan-out of VWAP updates to async subscribers
///
/// Each instrument has its own topic plus the shared [`ALL_INSTRUMENTS`] topic.
/// The most recent update per instrument is retained so a late subscriber can
/// read the current VWAP before its first live update arrives. A topic whose
/// last receiver is gone is dropped on the next emit.
#[derive(Clone)]
pub struct VwapBroadcaster {
    channels: Arc<DashMap<String, broadcast::Sender<VwapUpdate>>>,
    latest: Arc<DashMap<String, VwapUpdate>>,
    capacity: usize,
}

impl VwapBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// `capacity` bounds how far a slow receiver may fall behind before it lags
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            latest: Arc::new(DashMap::new()),
            capacity,
        }
    }

    fn subscribe_topic(&self, topic: String) -> broadcast::Receiver<VwapUpdate> {
        // Subscribing under the entry guard keeps emit from pruning the topic
        // between creation and the first receiver
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Live updates for one instrument
    pub fn subscribe(&self, instrument: &str) -> broadcast::Receiver<VwapUpdate> {
        self.subscribe_topic(instrument_topic(instrument))
    }

    /// Live updates for every instrument, in emission order per instrument
    pub fn subscribe_all(&self) -> broadcast::Receiver<VwapUpdate> {
        self.subscribe_topic(ALL_INSTRUMENTS.to_string())
    }

    /// Last update emitted for `instrument`, if any
    pub fn latest(&self, instrument: &str) -> Option<VwapUpdate> {
        self.latest.get(instrument).map(|update| update.clone())
    }

    pub fn subscriber_count(&self, instrument: &str) -> usize {
        self.channels
            .get(&instrument_topic(instrument))
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of topics with a live channel
    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }

    fn send_to(&self, topic: &str, update: VwapUpdate) {
        let delivered = match self.channels.get(topic) {
            Some(sender) => sender.send(update).is_ok(),
            None => return,
        };

        if !delivered {
            self.channels
                .remove_if(topic, |_, sender| sender.receiver_count() == 0);
            tracing::debug!(topic, "Dropped VWAP topic with no receivers");
        }
    }
}

impl Default for VwapBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl VwapSink for VwapBroadcaster {
    fn emit(&self, update: &VwapUpdate) {
        self.latest.insert(update.instrument.clone(), update.clone());
        self.send_to(&instrument_topic(&update.instrument), update.clone());
        self.send_to(ALL_INSTRUMENTS, update.clone());
    }
}
