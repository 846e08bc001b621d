use chrono::NaiveDate;

use crate::models::Ride;

/// What the ride list screen renders. Published as a whole on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct RideListState {
    pub driver_id: Option<String>,
    pub selected_date: NaiveDate,
    pub rides: Vec<Ride>,
    pub is_loading: bool,
    pub can_load_more: bool,
    pub error_message: Option<String>,
}

impl RideListState {
    pub fn new(selected_date: NaiveDate) -> Self {
        Self {
            driver_id: None,
            selected_date,
            rides: Vec::new(),
            is_loading: false,
            can_load_more: false,
            error_message: None,
        }
    }

    pub fn total_charges(&self) -> f64 {
        self.rides.iter().map(Ride::total_charges).sum()
    }
}
