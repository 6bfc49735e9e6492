use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::engine::errors::HandlerError;
use crate::market_data::TickHandler;
use crate::models::MarketTick;
use crate::sink::VwapSink;

/// VWAP emitted after every applied tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapUpdate {
    pub instrument: String,
    /// Market place of the tick that triggered this update
    pub market_place: String,
    pub bid_vwap: f64,
    pub ask_vwap: f64,
    pub computed_at: DateTime<Utc>,
}

impl fmt::Display for VwapUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Instrument: {}, Market: {}, Bid VWAP: {:.4}, Ask VWAP: {:.4}",
            self.instrument, self.market_place, self.bid_vwap, self.ask_vwap
        )
    }
}

/// Point-in-time view of a calculator's running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapSnapshot {
    pub instrument: String,
    pub bid_notional_sum: f64,
    pub bid_volume_sum: i128,
    pub ask_notional_sum: f64,
    pub ask_volume_sum: i128,
    pub bid_vwap: f64,
    pub ask_vwap: f64,
    pub update_count: u64,
}

/// Cumulative sums since process start. Never reset.
///
/// Volumes are summed as `i128` so any run of `i64` tick volumes stays exact.
#[derive(Debug, Clone, Copy, Default)]
struct VwapTotals {
    bid_notional: f64,
    bid_volume: i128,
    ask_notional: f64,
    ask_volume: i128,
    updates: u64,
}

impl VwapTotals {
    fn apply(&mut self, tick: &MarketTick) {
        self.bid_notional += tick.bid_notional();
        self.bid_volume += i128::from(tick.bid_volume());

        self.ask_notional += tick.ask_notional();
        self.ask_volume += i128::from(tick.ask_volume());

        self.updates += 1;
    }

    fn bid_vwap(&self) -> f64 {
        vwap(self.bid_notional, self.bid_volume)
    }

    fn ask_vwap(&self) -> f64 {
        vwap(self.ask_notional, self.ask_volume)
    }
}

/// Notional over volume, or 0 when no positive volume has accumulated
fn vwap(notional: f64, volume: i128) -> f64 {
    if volume > 0 {
        notional / volume as f64
    } else {
        0.0
    }
}

/// Running volume-weighted average price for one instrument
///
/// One calculator is created per instrument at startup and subscribed on the
/// [`TickDistributor`](crate::market_data::TickDistributor) under that
/// instrument's key. Publishers on any thread may drive it concurrently: the
/// sums, the VWAP computation and the sink emission all happen under a single
/// lock, so every emitted update reflects exactly one consistent state and
/// emissions follow the order in which updates were applied.
pub struct VwapCalculator {
    instrument: String,
    handler_name: String,
    totals: Mutex<VwapTotals>,
    sink: Arc<dyn VwapSink>,
}

impl VwapCalculator {
    pub fn new(instrument: impl Into<String>, sink: Arc<dyn VwapSink>) -> Self {
        let instrument = instrument.into();
        Self {
            handler_name: format!("vwap:{}", instrument),
            instrument,
            totals: Mutex::new(VwapTotals::default()),
            sink,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Apply a tick and emit the resulting VWAP
    ///
    /// The caller is responsible for routing only this instrument's ticks
    /// here; a mismatching tick is still applied.
    pub fn update(&self, tick: &MarketTick) -> VwapUpdate {
        if tick.instrument() != self.instrument {
            tracing::debug!(
                calculator = %self.instrument,
                tick_instrument = tick.instrument(),
                "Applying tick for a different instrument"
            );
        }
        if tick.has_negative_volume() {
            tracing::warn!(
                instrument = %self.instrument,
                bid_volume = tick.bid_volume(),
                ask_volume = tick.ask_volume(),
                "Applying tick with negative volume"
            );
        }

        let mut totals = self.totals.lock();
        totals.apply(tick);

        let update = VwapUpdate {
            instrument: self.instrument.clone(),
            market_place: tick.market_place().to_string(),
            bid_vwap: totals.bid_vwap(),
            ask_vwap: totals.ask_vwap(),
            computed_at: Utc::now(),
        };

        self.sink.emit(&update);
        update
    }

    /// Current totals and VWAPs without applying anything
    pub fn snapshot(&self) -> VwapSnapshot {
        let totals = *self.totals.lock();

        VwapSnapshot {
            instrument: self.instrument.clone(),
            bid_notional_sum: totals.bid_notional,
            bid_volume_sum: totals.bid_volume,
            ask_notional_sum: totals.ask_notional,
            ask_volume_sum: totals.ask_volume,
            bid_vwap: totals.bid_vwap(),
            ask_vwap: totals.ask_vwap(),
            update_count: totals.updates,
        }
    }
}

impl TickHandler for VwapCalculator {
    fn name(&self) -> &str {
        &self.handler_name
    }

    fn handle(&self, tick: &MarketTick) -> Result<(), HandlerError> {
        self.update(tick);
        Ok(())
    }
}
