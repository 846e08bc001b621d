pub mod calendar;
pub mod config;
pub mod errors;
pub mod models;
pub mod processor;
pub mod store;

#[cfg(test)]
mod test_support;

pub use calendar::CalendarGridBuilder;
pub use errors::{RideError, StoreError};
pub use processor::{RideAggregationService, RideListState, ServiceSettings, PAGE_SIZE};
pub use store::{DocumentStore, InMemoryStore};
