//! Collaborators: market data, order execution, model persistence, notification

pub mod csv_archive;
pub mod file_store;
pub mod memory;
pub mod notifier;
pub mod traits;

pub use csv_archive::CsvCandleArchive;
pub use file_store::JsonFileModelStore;
pub use memory::{InMemoryModelStore, PaperExecution, StaticMarketData};
pub use notifier::LogNotifier;
pub use traits::{notify_quietly, MarketDataSource, ModelStore, Notifier, OrderExecution, TimeRange};

#[cfg(test)]
pub use traits::{MockMarketDataSource, MockModelStore, MockNotifier, MockOrderExecution};
