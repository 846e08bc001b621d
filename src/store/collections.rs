pub const TRIPS: &str = "trips";

pub const PRE_INSPECTION: &str = "preInspection";
pub const POST_INSPECTION: &str = "postInspection";
pub const TRIP_CHARGES: &str = "tripCharges";

pub const FIELD_DRIVER_ID: &str = "driverId";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_END_TIME: &str = "endTime";
