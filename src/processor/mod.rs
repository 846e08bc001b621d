pub mod ride_aggregator;
pub mod ride_enricher;
pub mod state;

pub use ride_aggregator::{RideAggregationService, ServiceSettings, PAGE_SIZE};
pub use state::RideListState;
