pub mod aggregator;

pub use aggregator::FinanceAggregator;
