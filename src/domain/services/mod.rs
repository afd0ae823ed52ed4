pub mod calendar;
pub mod instrument_resolver;
pub mod metrics;
pub mod order_normalizer;
pub mod position_grouper;
