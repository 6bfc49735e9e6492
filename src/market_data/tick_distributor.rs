use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::handler::TickHandler;
use crate::engine::errors::{DispatchError, DistributorError, HandlerError};
use crate::models::MarketTick;

/// Handlers registered under one instrument key, in registration order.
/// Replaced wholesale on every subscribe, never mutated in place.
type HandlerList = Arc<[Arc<dyn TickHandler>]>;

/// Statistics for the tick distributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickDistributorStats {
    /// Number of instrument keys with at least one handler
    pub instrument_count: usize,
    /// Number of registered handlers across all keys
    pub handler_count: usize,
    /// Ticks passed to `publish` (lifetime)
    pub total_published: u64,
    /// Successful handler invocations (lifetime)
    pub total_delivered: u64,
    /// Handler invocations that returned an error or panicked (lifetime)
    pub total_failed: u64,
    /// Ticks published for a key nobody subscribed to
    pub unrouted: u64,
    /// Handler names per instrument key
    pub subscriptions: BTreeMap<String, Vec<String>>,
}

/// Outcome of a single `publish` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchSummary {
    /// True if no handler was registered for the tick's instrument
    pub fn is_noop(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}

/// Routes ticks by instrument key to the handlers subscribed under that key
///
/// The TickDistributor is constructed explicitly and shared (cheaply cloned)
/// with every tick source and with the startup wiring that registers
/// handlers. It holds no aggregation state of its own.
///
/// Features:
/// - Per-instrument routing, handlers invoked in registration order
/// - Failure isolation: an erroring or panicking handler is logged and skipped
/// - Copy-on-write registry: publishers never see a half-built handler list
/// - Optional channel ingress drained by a background task
///
/// # Example
/// ```ignore
/// let distributor = TickDistributor::new();
/// distributor.subscribe("OIL", Arc::new(VwapCalculator::new("OIL", sink)));
///
/// // Synchronous path
/// distributor.publish(&tick);
///
/// // Or hand ticks off to the broadcast loop
/// let tick_tx = distributor.start()?;
/// tick_tx.send(tick).unwrap();
/// ```
pub struct TickDistributor {
    /// Registry of handlers by instrument key
    registry: Arc<RwLock<HashMap<String, HandlerList>>>,

    total_published: Arc<AtomicU64>,
    total_delivered: Arc<AtomicU64>,
    total_failed: Arc<AtomicU64>,
    unrouted: Arc<AtomicU64>,

    /// Handle to the ingress loop, if started
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TickDistributor {
    /// Create a new tick distributor with an empty registry
    pub fn new() -> Self {
        tracing::info!("📡 TickDistributor created");

        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            total_published: Arc::new(AtomicU64::new(0)),
            total_delivered: Arc::new(AtomicU64::new(0)),
            total_failed: Arc::new(AtomicU64::new(0)),
            unrouted: Arc::new(AtomicU64::new(0)),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a handler for every future tick published under `instrument`
    ///
    /// Several handlers may share a key; they are invoked in the order they
    /// were subscribed. Any key is accepted, including ones no tick will ever
    /// carry.
    pub fn subscribe(&self, instrument: impl Into<String>, handler: Arc<dyn TickHandler>) {
        let instrument = instrument.into();
        let handler_name = handler.name().to_string();

        let position = {
            let mut registry = self.registry.write();
            let updated: HandlerList = match registry.get(&instrument) {
                Some(existing) => existing
                    .iter()
                    .cloned()
                    .chain(std::iter::once(handler))
                    .collect(),
                None => Arc::from(vec![handler]),
            };
            let position = updated.len();
            registry.insert(instrument.clone(), updated);
            position
        };

        tracing::info!(
            instrument = %instrument,
            handler = %handler_name,
            position,
            "📡 Handler subscribed"
        );
    }

    /// Deliver `tick` to every handler registered for its instrument
    ///
    /// Publishing for a key with no handlers is a no-op. A handler that
    /// returns an error or panics is reported and counted; the remaining
    /// handlers still receive the tick and nothing is propagated to the caller.
    pub fn publish(&self, tick: &MarketTick) -> DispatchSummary {
        self.total_published.fetch_add(1, Ordering::Relaxed);

        // Clone the list out so no lock is held while handlers run
        let handlers = self.registry.read().get(tick.instrument()).cloned();

        let Some(handlers) = handlers else {
            self.unrouted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(instrument = tick.instrument(), "No handlers for tick");
            return DispatchSummary::default();
        };

        let mut summary = DispatchSummary::default();

        for handler in handlers.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(tick)))
                .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))));

            match outcome {
                Ok(()) => summary.delivered += 1,
                Err(source) => {
                    summary.failed += 1;
                    let err = DispatchError {
                        handler: handler.name().to_string(),
                        instrument: tick.instrument().to_string(),
                        source,
                    };
                    tracing::error!("📡 Error processing market update: {}", err);
                }
            }
        }

        self.total_delivered
            .fetch_add(summary.delivered as u64, Ordering::Relaxed);
        self.total_failed
            .fetch_add(summary.failed as u64, Ordering::Relaxed);

        summary
    }

    /// Start the ingress loop
    ///
    /// Spawns a background task that drains the returned sender and publishes
    /// each tick in arrival order. Must be called from within a tokio runtime.
    /// Only one live loop may exist per distributor (clones included); once
    /// every sender is dropped the loop ends and `start` can be called again.
    pub fn start(&self) -> Result<mpsc::UnboundedSender<MarketTick>, DistributorError> {
        let mut task_handle = self.task_handle.lock();
        // A loop whose senders were all dropped has finished and may be replaced
        if task_handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(DistributorError::AlreadyStarted);
        }

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<MarketTick>();
        let distributor = self.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("📡 TickDistributor ingress loop started");

            while let Some(tick) = tick_rx.recv().await {
                distributor.publish(&tick);
            }

            tracing::warn!("📡 TickDistributor ingress loop ended (sender dropped)");
        });

        *task_handle = Some(handle);

        Ok(tick_tx)
    }

    /// Check if the ingress loop is running
    pub fn is_running(&self) -> bool {
        self.task_handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Number of handlers registered under `instrument`
    pub fn subscriber_count(&self, instrument: &str) -> usize {
        self.registry
            .read()
            .get(instrument)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    pub fn has_subscribers(&self, instrument: &str) -> bool {
        self.subscriber_count(instrument) > 0
    }

    /// Instrument keys with at least one handler, sorted
    pub fn instruments(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get distributor statistics
    pub fn get_stats(&self) -> TickDistributorStats {
        let registry = self.registry.read();

        let subscriptions: BTreeMap<String, Vec<String>> = registry
            .iter()
            .map(|(instrument, handlers)| {
                let names = handlers.iter().map(|h| h.name().to_string()).collect();
                (instrument.clone(), names)
            })
            .collect();

        TickDistributorStats {
            instrument_count: registry.len(),
            handler_count: registry.values().map(|h| h.len()).sum(),
            total_published: self.total_published.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            subscriptions,
        }
    }
}

impl Default for TickDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TickDistributor {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            total_published: Arc::clone(&self.total_published),
            total_delivered: Arc::clone(&self.total_delivered),
            total_failed: Arc::clone(&self.total_failed),
            unrouted: Arc::clone(&self.unrouted),
            task_handle: Arc::clone(&self.task_handle),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::handler::FnHandler;
    use std::sync::atomic::AtomicUsize;

    fn create_test_tick(instrument: &str) -> MarketTick {
        MarketTick::new(instrument, "NYSE", 100.0, 101.0, 10, 20).unwrap()
    }

    /// Handler that appends `label` to a shared log on every tick
    fn recorder(label: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn TickHandler> {
        let log = Arc::clone(log);
        let label = label.to_string();
        Arc::new(FnHandler::new(label.clone(), move |tick: &MarketTick| {
            log.lock().push(format!("{}:{}", label, tick.instrument()));
            Ok(())
        }))
    }

    fn failing(name: &str) -> Arc<dyn TickHandler> {
        Arc::new(FnHandler::new(name, |_tick: &MarketTick| {
            Err(HandlerError::Rejected("always fails".to_string()))
        }))
    }

    fn panicking(name: &str) -> Arc<dyn TickHandler> {
        Arc::new(FnHandler::new(name, |_tick: &MarketTick| -> Result<(), HandlerError> {
            panic!("handler exploded")
        }))
    }

    #[test]
    fn test_distributor_creation() {
        let distributor = TickDistributor::new();
        let stats = distributor.get_stats();

        assert_eq!(stats.instrument_count, 0);
        assert_eq!(stats.handler_count, 0);
        assert_eq!(stats.total_published, 0);
        assert!(stats.subscriptions.is_empty());
    }

    #[test]
    fn test_handlers_invoked_in_registration_order() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        distributor.subscribe("OIL", recorder("first", &log));
        distributor.subscribe("OIL", recorder("second", &log));
        distributor.subscribe("OIL", recorder("third", &log));

        let summary = distributor.publish(&create_test_tick("OIL"));

        assert_eq!(summary, DispatchSummary { delivered: 3, failed: 0 });
        assert_eq!(
            *log.lock(),
            vec!["first:OIL", "second:OIL", "third:OIL"]
        );
    }

    #[test]
    fn test_routing_by_instrument() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        distributor.subscribe("OIL", recorder("oil", &log));
        distributor.subscribe("GOLD", recorder("gold", &log));

        distributor.publish(&create_test_tick("GOLD"));

        assert_eq!(*log.lock(), vec!["gold:GOLD"]);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        distributor.subscribe("OIL", recorder("oil", &log));

        let summary = distributor.publish(&create_test_tick("GRAIN"));

        assert!(summary.is_noop());
        assert!(log.lock().is_empty());

        let stats = distributor.get_stats();
        assert_eq!(stats.total_published, 1);
        assert_eq!(stats.unrouted, 1);
        assert_eq!(stats.total_delivered, 0);
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        distributor.subscribe("OIL", recorder("before", &log));
        distributor.subscribe("OIL", failing("broken"));
        distributor.subscribe("OIL", recorder("after", &log));

        let summary = distributor.publish(&create_test_tick("OIL"));

        assert_eq!(summary, DispatchSummary { delivered: 2, failed: 1 });
        assert_eq!(*log.lock(), vec!["before:OIL", "after:OIL"]);
        assert_eq!(distributor.get_stats().total_failed, 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        distributor.subscribe("OIL", panicking("explodes"));
        distributor.subscribe("OIL", recorder("survivor", &log));

        let summary = distributor.publish(&create_test_tick("OIL"));
        assert_eq!(summary, DispatchSummary { delivered: 1, failed: 1 });

        // The distributor keeps working after a panic
        let summary = distributor.publish(&create_test_tick("OIL"));
        assert_eq!(summary, DispatchSummary { delivered: 1, failed: 1 });
        assert_eq!(*log.lock(), vec!["survivor:OIL", "survivor:OIL"]);
    }

    #[test]
    fn test_handler_may_subscribe_during_dispatch() {
        let distributor = TickDistributor::new();
        let inner = distributor.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);

        distributor.subscribe(
            "OIL",
            Arc::new(FnHandler::new("self-registering", move |_tick: &MarketTick| {
                calls_in_handler.fetch_add(1, Ordering::SeqCst);
                inner.subscribe("GOLD", failing("late"));
                Ok(())
            })),
        );

        distributor.publish(&create_test_tick("OIL"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(distributor.subscriber_count("GOLD"), 1);
    }

    #[test]
    fn test_stats_report_subscriptions() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        distributor.subscribe("OIL", recorder("a", &log));
        distributor.subscribe("OIL", recorder("b", &log));
        distributor.subscribe("GOLD", recorder("c", &log));

        let stats = distributor.get_stats();
        assert_eq!(stats.instrument_count, 2);
        assert_eq!(stats.handler_count, 3);
        assert_eq!(stats.subscriptions["OIL"], vec!["a", "b"]);
        assert_eq!(distributor.instruments(), vec!["GOLD", "OIL"]);
        assert!(distributor.has_subscribers("OIL"));
        assert!(!distributor.has_subscribers("GRAIN"));
    }

    #[tokio::test]
    async fn test_ingress_loop_publishes() {
        let distributor = TickDistributor::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        distributor.subscribe(
            "OIL",
            Arc::new(FnHandler::new("forward", move |tick: &MarketTick| {
                tx.send(tick.market_place().to_string())
                    .map_err(|e| HandlerError::SinkClosed(e.to_string()))
            })),
        );

        let tick_tx = distributor.start().unwrap();
        assert!(distributor.is_running());

        for market in ["NYSE", "NASDAQ", "AMEX"] {
            let tick = MarketTick::new("OIL", market, 1.0, 2.0, 1, 1).unwrap();
            tick_tx.send(tick).unwrap();
        }

        for expected in ["NYSE", "NASDAQ", "AMEX"] {
            let received = tokio::time::timeout(
                tokio::time::Duration::from_millis(100),
                rx.recv(),
            )
            .await
            .unwrap()
            .unwrap();
            assert_eq!(received, expected);
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let distributor = TickDistributor::new();
        assert!(!distributor.is_running());

        let _tx = distributor.start().unwrap();
        assert_eq!(
            distributor.clone().start().unwrap_err(),
            DistributorError::AlreadyStarted
        );
    }

    #[tokio::test]
    async fn test_restart_after_senders_dropped() {
        let distributor = TickDistributor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        distributor.subscribe("OIL", recorder("oil", &log));

        let tx = distributor.start().unwrap();
        drop(tx);

        tokio::time::timeout(tokio::time::Duration::from_secs(1), async {
            while distributor.is_running() {
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let tx = distributor.start().unwrap();
        assert!(distributor.is_running());
        tx.send(create_test_tick("OIL")).unwrap();

        tokio::time::timeout(tokio::time::Duration::from_secs(1), async {
            while log.lock().is_empty() {
                tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*log.lock(), vec!["oil:OIL"]);
    }
}
