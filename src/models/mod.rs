pub mod document;
pub mod inspection;
pub mod ride;
pub mod trip_charges;

pub use document::Document;
pub use inspection::{Defects, Inspection, Remarks};
pub use ride::{MaintenanceStatus, Ride, RideStatus};
pub use trip_charges::TripCharges;
