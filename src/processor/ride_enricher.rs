use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::RideError;
use crate::models::{Document, Inspection, Ride, TripCharges};
use crate::store::collections::{POST_INSPECTION, PRE_INSPECTION, TRIPS, TRIP_CHARGES};
use crate::store::DocumentStore;

/// A ride with whatever sub-records could be loaded, plus what went wrong
/// loading the rest.
#[derive(Debug)]
pub struct Enrichment {
    pub ride: Ride,
    pub errors: Vec<RideError>,
}

async fn fetch_subcollection(
    store: &dyn DocumentStore,
    ride_id: &str,
    name: &'static str,
    timeout: Duration,
) -> Result<Vec<Document>, RideError> {
    match tokio::time::timeout(timeout, store.get_subcollection(TRIPS, ride_id, name)).await {
        Ok(Ok(docs)) => Ok(docs),
        Ok(Err(e)) => Err(RideError::Fetch {
            what: name,
            id: ride_id.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Err(RideError::Timeout {
            what: name,
            id: ride_id.to_string(),
        }),
    }
}

/// Loads one inspection sub-collection. Normally it holds a single document;
/// if there are more, the most recent one wins.
async fn fetch_inspection(
    store: &dyn DocumentStore,
    ride_id: &str,
    name: &'static str,
    timeout: Duration,
) -> (Option<Inspection>, Vec<RideError>) {
    let docs = match fetch_subcollection(store, ride_id, name, timeout).await {
        Ok(docs) => docs,
        Err(e) => return (None, vec![e]),
    };

    let mut errors = Vec::new();
    let mut latest: Option<Inspection> = None;
    for doc in &docs {
        match Inspection::from_document(doc) {
            Ok(inspection) => {
                if latest
                    .as_ref()
                    .map_or(true, |cur| inspection.timestamp > cur.timestamp)
                {
                    latest = Some(inspection);
                }
            }
            Err(e) => {
                warn!("Skipping {} {} of ride {}: {}", name, doc.id, ride_id, e);
                errors.push(e);
            }
        }
    }
    (latest, errors)
}

async fn fetch_trip_charges(
    store: &dyn DocumentStore,
    ride_id: &str,
    timeout: Duration,
) -> (Option<TripCharges>, Vec<RideError>) {
    let docs = match fetch_subcollection(store, ride_id, TRIP_CHARGES, timeout).await {
        Ok(docs) => docs,
        Err(e) => return (None, vec![e]),
    };

    let mut errors = Vec::new();
    let mut charges = Vec::with_capacity(docs.len());
    for doc in &docs {
        match TripCharges::from_document(doc) {
            Ok(c) => charges.push(c),
            Err(e) => {
                warn!("Skipping charge {} of ride {}: {}", doc.id, ride_id, e);
                errors.push(e);
            }
        }
    }

    if charges.is_empty() {
        (None, errors)
    } else {
        (Some(TripCharges::aggregate(&charges)), errors)
    }
}

/// Runs the three sub-fetches of a ride concurrently and attaches whatever
/// came back. Never fails as a whole.
pub async fn enrich_ride(store: &dyn DocumentStore, mut ride: Ride, timeout: Duration) -> Enrichment {
    let ((pre, pre_errors), (post, post_errors), (charges, charge_errors)) = futures::join!(
        fetch_inspection(store, &ride.id, PRE_INSPECTION, timeout),
        fetch_inspection(store, &ride.id, POST_INSPECTION, timeout),
        fetch_trip_charges(store, &ride.id, timeout),
    );

    ride.pre_inspection = pre;
    ride.post_inspection = post;
    ride.trip_charges = charges;

    let errors: Vec<RideError> = pre_errors
        .into_iter()
        .chain(post_errors)
        .chain(charge_errors)
        .collect();
    debug!(
        "Enriched ride {} (pre: {}, post: {}, charges: {}, errors: {})",
        ride.id,
        ride.pre_inspection.is_some(),
        ride.post_inspection.is_some(),
        ride.trip_charges.is_some(),
        errors.len()
    );

    Enrichment { ride, errors }
}

/// One-shot load of a single trip with its sub-records. `Ok(None)` if the trip
/// does not exist.
pub async fn load_ride(
    store: &dyn DocumentStore,
    ride_id: &str,
    timeout: Duration,
) -> Result<Option<Enrichment>, RideError> {
    let doc = match tokio::time::timeout(timeout, store.get_document(TRIPS, ride_id)).await {
        Ok(Ok(Some(doc))) => doc,
        Ok(Ok(None)) => return Ok(None),
        Ok(Err(e)) => {
            return Err(RideError::Fetch {
                what: "trip",
                id: ride_id.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(RideError::Timeout {
                what: "trip",
                id: ride_id.to_string(),
            })
        }
    };

    let ride = Ride::from_document(&doc)?;
    Ok(Some(enrich_ride(store, ride, timeout).await))
}
