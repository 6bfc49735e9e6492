pub mod producer;

pub use producer::{ProducerConfig, ProducerStats, TickProducer};
