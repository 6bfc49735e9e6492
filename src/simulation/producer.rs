use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::ConfigError;
use crate::engine::errors::TickError;
use crate::market_data::{DispatchSummary, TickDistributor};
use crate::models::MarketTick;

/// Price and volume ranges for generated ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub min_bid_price: f64,
    pub max_bid_price: f64,
    /// Ask is bid plus a spread drawn from this range, so ask > bid always
    pub min_spread: f64,
    pub max_spread: f64,
    pub min_volume: i64,
    pub max_volume: i64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            min_bid_price: 100.0,
            max_bid_price: 150.0,
            min_spread: 0.1,
            max_spread: 5.0,
            min_volume: 100,
            max_volume: 1000,
        }
    }
}

impl ProducerConfig {
    /// Ranges must be non-empty; prices and spreads must be positive
    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_bid_price > 0.0 && self.min_bid_price < self.max_bid_price) {
            return Err(format!(
                "bid price range must be positive and non-empty, got {}..{}",
                self.min_bid_price, self.max_bid_price
            ));
        }
        if !(self.min_spread >= 0.0 && self.min_spread < self.max_spread) {
            return Err(format!(
                "spread range must be non-negative and non-empty, got {}..{}",
                self.min_spread, self.max_spread
            ));
        }
        if self.min_volume >= self.max_volume {
            return Err(format!(
                "volume range must be non-empty, got {}..{}",
                self.min_volume, self.max_volume
            ));
        }
        Ok(())
    }
}

/// Serializable view of producer counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerStats {
    pub ticks_generated: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
}

/// Synthetic tick source
///
/// Generates random ticks for (instrument, market place) pairs and publishes
/// them on the distributor, standing in for a real market-data feed.
pub struct TickProducer {
    distributor: TickDistributor,
    config: ProducerConfig,
    ticks_generated: AtomicU64,
    errors: AtomicU64,
    started_at: DateTime<Utc>,
}

impl TickProducer {
    /// Fails if `config` has an empty or non-positive range
    pub fn new(distributor: TickDistributor, config: ProducerConfig) -> Result<Self, ConfigError> {
        config.validate().map_err(ConfigError::Invalid)?;

        Ok(Self {
            distributor,
            config,
            ticks_generated: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Utc::now(),
        })
    }

    /// Generate a random tick based on configuration
    pub fn generate_tick(&self, instrument: &str, market_place: &str) -> Result<MarketTick, TickError> {
        let mut rng = rand::rng();

        let bid_price = rng.random_range(self.config.min_bid_price..self.config.max_bid_price);
        let ask_price = bid_price + rng.random_range(self.config.min_spread..self.config.max_spread);
        let bid_volume = rng.random_range(self.config.min_volume..self.config.max_volume);
        let ask_volume = rng.random_range(self.config.min_volume..self.config.max_volume);

        MarketTick::new(
            instrument,
            market_place,
            bid_price,
            ask_price,
            bid_volume,
            ask_volume,
        )
    }

    /// Generate one tick and publish it
    pub fn publish_once(&self, instrument: &str, market_place: &str) -> Result<DispatchSummary, TickError> {
        match self.generate_tick(instrument, market_place) {
            Ok(tick) => {
                self.ticks_generated.fetch_add(1, Ordering::Relaxed);
                debug!(%tick, "Publishing generated tick");
                Ok(self.distributor.publish(&tick))
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Spawn one task per (instrument, market place) pair
    ///
    /// Each task publishes a tick immediately and then every `period`, until
    /// `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn(
        self: &Arc<Self>,
        instruments: &[String],
        market_places: &[String],
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(instruments.len() * market_places.len());

        for instrument in instruments {
            for market_place in market_places {
                let producer = Arc::clone(self);
                let instrument = instrument.clone();
                let market_place = market_place.clone();
                let mut shutdown = shutdown.clone();

                handles.push(tokio::spawn(async move {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                if let Err(e) = producer.publish_once(&instrument, &market_place) {
                                    error!(
                                        instrument = %instrument,
                                        market_place = %market_place,
                                        "Error generating market data: {}", e
                                    );
                                }
                            }
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break;
                                }
                            }
                        }
                    }

                    debug!(instrument = %instrument, market_place = %market_place, "Producer task stopped");
                }));
            }
        }

        info!(
            tasks = handles.len(),
            period_ms = period.as_millis() as u64,
            "Tick producers started"
        );

        handles
    }

    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            ticks_generated: self.ticks_generated.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::VwapManager;
    use crate::sink::MemorySink;

    fn producer(distributor: &TickDistributor) -> TickProducer {
        TickProducer::new(distributor.clone(), ProducerConfig::default()).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProducerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        let config = ProducerConfig {
            min_bid_price: 0.0,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProducerConfig {
            min_spread: 5.0,
            max_spread: 5.0,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ProducerConfig {
            min_volume: 10,
            max_volume: 1,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_producer_rejects_empty_ranges() {
        let distributor = TickDistributor::new();
        let config = ProducerConfig {
            min_volume: 500,
            max_volume: 500,
            ..ProducerConfig::default()
        };

        let result = TickProducer::new(distributor, config);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_generated_ticks_respect_ranges() {
        let distributor = TickDistributor::new();
        let producer = producer(&distributor);

        for _ in 0..500 {
            let tick = producer.generate_tick("OIL", "NYSE").unwrap();
            assert!((100.0..150.0).contains(&tick.bid_price()));
            assert!(tick.ask_price() > tick.bid_price());
            assert!(tick.spread() < 5.0 + 1e-9);
            assert!((100..1000).contains(&tick.bid_volume()));
            assert!((100..1000).contains(&tick.ask_volume()));
        }
    }

    #[test]
    fn test_blank_instrument_is_counted_as_error() {
        let distributor = TickDistributor::new();
        let producer = producer(&distributor);

        assert!(producer.publish_once("  ", "NYSE").is_err());
        let stats = producer.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.ticks_generated, 0);
        assert_eq!(distributor.get_stats().total_published, 0);
    }

    #[test]
    fn test_publish_once_reaches_calculator() {
        let distributor = TickDistributor::new();
        let manager = VwapManager::initialize(["OIL"], &distributor, Arc::new(MemorySink::new()));
        let producer = producer(&distributor);

        let summary = producer.publish_once("OIL", "NASDAQ").unwrap();

        assert_eq!(summary.delivered, 1);
        let snapshot = manager.get("OIL").unwrap().snapshot();
        assert_eq!(snapshot.update_count, 1);
        assert!((100.0..150.0).contains(&snapshot.bid_vwap));
    }

    #[tokio::test]
    async fn test_spawned_producers_stop_on_shutdown() {
        let distributor = TickDistributor::new();
        let sink = Arc::new(MemorySink::new());
        let manager = VwapManager::initialize(["OIL", "GOLD"], &distributor, sink.clone());
        let producer = Arc::new(producer(&distributor));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let instruments = vec!["OIL".to_string(), "GOLD".to_string()];
        let markets = vec!["NYSE".to_string(), "AMEX".to_string()];
        let handles = producer.spawn(&instruments, &markets, Duration::from_millis(10), shutdown_rx);
        assert_eq!(handles.len(), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }

        let generated = producer.stats().ticks_generated;
        // Every task publishes at least its immediate first tick
        assert!(generated >= 4);
        assert_eq!(sink.len() as u64, generated);

        let updates: u64 = manager.snapshots().iter().map(|s| s.update_count).sum();
        assert_eq!(updates, generated);
    }
}
