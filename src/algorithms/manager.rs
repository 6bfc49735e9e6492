use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::vwap::{VwapCalculator, VwapSnapshot};
use crate::market_data::TickDistributor;
use crate::sink::VwapSink;

/// Owns one VWAP calculator per instrument and wires each onto the distributor
pub struct VwapManager {
    calculators: HashMap<String, Arc<VwapCalculator>>,
}

impl VwapManager {
    /// Create a calculator for every distinct instrument and subscribe it
    /// under that instrument's key. All calculators share `sink`.
    pub fn initialize<I, S>(
        instruments: I,
        distributor: &TickDistributor,
        sink: Arc<dyn VwapSink>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut calculators = HashMap::new();

        for instrument in instruments {
            let instrument = instrument.into();
            if calculators.contains_key(&instrument) {
                continue;
            }

            let calculator = Arc::new(VwapCalculator::new(instrument.clone(), Arc::clone(&sink)));
            distributor.subscribe(instrument.clone(), calculator.clone());
            calculators.insert(instrument, calculator);
        }

        info!(count = calculators.len(), "VWAP calculators initialized");

        Self { calculators }
    }

    pub fn get(&self, instrument: &str) -> Option<Arc<VwapCalculator>> {
        self.calculators.get(instrument).cloned()
    }

    /// Managed instruments, sorted
    pub fn instruments(&self) -> Vec<String> {
        let mut instruments: Vec<String> = self.calculators.keys().cloned().collect();
        instruments.sort();
        instruments
    }

    /// Snapshot of every calculator, sorted by instrument
    pub fn snapshots(&self) -> Vec<VwapSnapshot> {
        let mut snapshots: Vec<VwapSnapshot> =
            self.calculators.values().map(|c| c.snapshot()).collect();
        snapshots.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }
}
