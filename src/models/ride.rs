use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::document::{
    deserialize_count, deserialize_timestamp, deserialize_timestamp_option, Document,
};
use super::inspection::Inspection;
use super::trip_charges::TripCharges;
use crate::errors::RideError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Pending,
    Active,
    Completed,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Active => "active",
            RideStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStatus {
    Cleared,
    InMaintenance,
    TicketRaised,
}

impl MaintenanceStatus {
    /// Maps the post-inspection status field. Anything we don't recognize is
    /// treated as an open ticket.
    pub fn from_check_status(status: Option<&str>) -> Self {
        let normalized = status.map(|s| s.trim().to_lowercase());
        match normalized.as_deref() {
            Some("ok" | "passed" | "approved" | "cleared") => MaintenanceStatus::Cleared,
            Some("in maintenance" | "in_maintenance" | "in progress" | "in_progress") => {
                MaintenanceStatus::InMaintenance
            }
            _ => MaintenanceStatus::TicketRaised,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MaintenanceStatus::Cleared => "cleared",
            MaintenanceStatus::InMaintenance => "in maintenance",
            MaintenanceStatus::TicketRaised => "ticket raised",
        }
    }
}

/// Base trip record as stored under `trips/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripRecord {
    driver_id: String,
    #[serde(default, deserialize_with = "deserialize_count")]
    passengers: u32,
    start_location: String,
    end_location: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_timestamp_option")]
    end_time: Option<DateTime<Utc>>,
    status: RideStatus,
}

/// A completed trip joined with its inspection and charge sub-records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub id: String,
    pub driver_id: String,
    pub passengers: u32,
    pub start_location: String,
    pub end_location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RideStatus,
    pub pre_inspection: Option<Inspection>,
    pub post_inspection: Option<Inspection>,
    pub trip_charges: Option<TripCharges>,
}

impl Ride {
    /// Decodes the base record. Sub-records are attached later.
    pub fn from_document(doc: &Document) -> Result<Self, RideError> {
        let record: TripRecord = doc
            .decode()
            .map_err(|e| RideError::decode("trip", &doc.id, e))?;

        let end_time = match record.end_time {
            Some(end) if end < record.start_time => {
                warn!(
                    "Trip {} ends before it starts ({} < {}), clamping end time",
                    doc.id, end, record.start_time
                );
                record.start_time
            }
            Some(end) => end,
            None => record.start_time,
        };

        Ok(Self {
            id: doc.id.clone(),
            driver_id: record.driver_id,
            passengers: record.passengers,
            start_location: record.start_location,
            end_location: record.end_location,
            start_time: record.start_time,
            end_time,
            status: record.status,
            pre_inspection: None,
            post_inspection: None,
            trip_charges: None,
        })
    }

    pub fn duration(&self) -> Duration {
        (self.end_time - self.start_time).max(Duration::zero())
    }

    pub fn total_charges(&self) -> f64 {
        self.trip_charges.as_ref().map_or(0.0, TripCharges::total)
    }

    pub fn maintenance_status(&self) -> MaintenanceStatus {
        MaintenanceStatus::from_check_status(
            self.post_inspection.as_ref().map(|i| i.status.as_str()),
        )
    }
}
