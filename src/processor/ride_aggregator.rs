use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ride_enricher::{enrich_ride, load_ride};
use super::state::RideListState;
use crate::calendar::local_day;
use crate::errors::RideError;
use crate::models::{Ride, RideStatus};
use crate::store::collections::{FIELD_DRIVER_ID, FIELD_END_TIME, FIELD_STATUS, TRIPS};
use crate::store::{Cursor, DocumentStore, Query, Snapshot, Subscription};

pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Upper bound for each sub-fetch and single-document read.
    pub subfetch_timeout: Duration,
    /// Offset used to decide which calendar day a ride ended on.
    pub utc_offset: FixedOffset,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            subfetch_timeout: Duration::from_secs(10),
            utc_offset: Utc.fix(),
        }
    }
}

/// Completed trips of one driver, newest first, one page at a time.
pub fn rides_query(driver_id: &str, cursor: Option<Cursor>) -> Query {
    Query::collection(TRIPS)
        .where_eq(FIELD_DRIVER_ID, driver_id)
        .where_eq(FIELD_STATUS, RideStatus::Completed.as_str())
        .order_by(FIELD_END_TIME, true)
        .limit(PAGE_SIZE)
        .start_after(cursor)
}

struct Inner {
    driver_id: Option<String>,
    selected_date: NaiveDate,
    cursor: Option<Cursor>,
    /// Filtered rides per fetched page, in page order.
    pages: Vec<Vec<Ride>>,
    /// Bumped on every fetch and reset; results tagged with an older value
    /// are dropped.
    generation: u64,
    is_loading: bool,
    can_load_more: bool,
    error: Option<RideError>,
    pump: Option<JoinHandle<()>>,
}

impl Inner {
    fn view(&self) -> RideListState {
        RideListState {
            driver_id: self.driver_id.clone(),
            selected_date: self.selected_date,
            rides: self.pages.iter().flatten().cloned().collect(),
            is_loading: self.is_loading,
            can_load_more: self.can_load_more,
            error_message: self.error.as_ref().map(ToString::to_string),
        }
    }

    fn stop_listening(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn reset(&mut self) {
        self.stop_listening();
        self.generation += 1;
        self.cursor = None;
        self.pages.clear();
        self.is_loading = false;
        self.can_load_more = false;
        self.error = None;
    }
}

struct Shared {
    store: Arc<dyn DocumentStore>,
    settings: ServiceSettings,
    inner: Mutex<Inner>,
    updates: watch::Sender<RideListState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.view());
    }

    /// Drives one live subscription until it ends or the task is aborted.
    async fn pump(self: Arc<Self>, mut subscription: Subscription, generation: u64, page_index: usize) {
        let mut delivered = false;
        while let Some(event) = subscription.next().await {
            match event {
                Ok(snapshot) => {
                    delivered = true;
                    self.handle_snapshot(generation, page_index, snapshot).await;
                }
                Err(e) => {
                    error!("Ride listener failed (generation {}): {}", generation, e);
                    self.fail_page(generation, e.into());
                    return;
                }
            }
        }
        if !delivered {
            // Nothing will ever settle this page; release the single-flight slot.
            warn!("Ride listener for generation {} closed before its first snapshot", generation);
            self.fail_page(generation, RideError::Query("listener closed".to_string()));
            return;
        }
        debug!("Ride listener for generation {} closed", generation);
    }

    fn fail_page(&self, generation: u64, err: RideError) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        inner.is_loading = false;
        inner.error = Some(err);
        self.publish(&inner);
    }

    async fn handle_snapshot(&self, generation: u64, page_index: usize, snapshot: Snapshot) {
        let raw_len = snapshot.documents.len();
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!("Ignoring snapshot of superseded generation {}", generation);
                return;
            }
            if let Some(last) = snapshot.documents.last() {
                inner.cursor = Some(Cursor::from_document(last, Some(FIELD_END_TIME)));
            }
        }

        let mut errors = Vec::new();
        let mut rides = Vec::with_capacity(raw_len);
        for doc in &snapshot.documents {
            match Ride::from_document(doc) {
                Ok(ride) => rides.push(ride),
                Err(e) => {
                    warn!("Skipping trip {}: {}", doc.id, e);
                    errors.push(e);
                }
            }
        }

        let timeout = self.settings.subfetch_timeout;
        let store = self.store.as_ref();
        let enriched = join_all(rides.into_iter().map(|ride| enrich_ride(store, ride, timeout))).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(
                "Discarding page {} of superseded generation {} ({} trips)",
                page_index,
                generation,
                enriched.len()
            );
            return;
        }

        let day = inner.selected_date;
        let offset = self.settings.utc_offset;
        let mut page = Vec::new();
        for item in enriched {
            errors.extend(item.errors);
            if local_day(item.ride.end_time, offset) == day {
                page.push(item.ride);
            }
        }
        let kept = page.len();

        inner.pages.truncate(page_index);
        inner.pages.push(page);
        inner.can_load_more = raw_len == PAGE_SIZE;
        inner.is_loading = false;
        inner.error = if inner.pages.iter().all(Vec::is_empty) {
            Some(RideError::EmptyResult)
        } else {
            errors.pop()
        };

        info!(
            "Published page {} for {}: {} of {} trips on {}, can load more: {}",
            page_index,
            inner.driver_id.as_deref().unwrap_or("-"),
            kept,
            raw_len,
            day,
            inner.can_load_more
        );
        self.publish(&inner);
    }
}

/// Live, paginated list of a driver's completed rides for one selected day.
///
/// State changes are published through a `watch` channel; see [`subscribe`].
/// Dropping the service stops the live query.
///
/// [`subscribe`]: RideAggregationService::subscribe
pub struct RideAggregationService {
    shared: Arc<Shared>,
}

impl RideAggregationService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        settings: ServiceSettings,
        selected_date: NaiveDate,
    ) -> Self {
        let (updates, _) = watch::channel(RideListState::new(selected_date));
        let inner = Inner {
            driver_id: None,
            selected_date,
            cursor: None,
            pages: Vec::new(),
            generation: 0,
            is_loading: false,
            can_load_more: false,
            error: None,
            pump: None,
        };
        Self {
            shared: Arc::new(Shared {
                store,
                settings,
                inner: Mutex::new(inner),
                updates,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RideListState> {
        self.shared.updates.subscribe()
    }

    pub fn state(&self) -> RideListState {
        self.shared.updates.borrow().clone()
    }

    pub async fn set_driver(&self, driver_id: &str) {
        let driver_id = driver_id.trim();
        {
            let mut inner = self.shared.lock();
            if driver_id.is_empty() {
                warn!("Rejected empty driver id");
                inner.error = Some(RideError::Validation);
                self.shared.publish(&inner);
                return;
            }
            if inner.driver_id.as_deref() == Some(driver_id) {
                debug!("Driver {} already selected", driver_id);
                return;
            }
            info!("Loading rides for driver {}", driver_id);
            inner.reset();
            inner.driver_id = Some(driver_id.to_string());
            self.shared.publish(&inner);
        }
        self.fetch_page().await;
    }

    /// Re-queries from the first page and keeps only rides that ended on
    /// `date`. The query itself is not narrowed to the day, so rides of a
    /// quiet day can sit several pages deep.
    pub async fn set_selected_date(&self, date: NaiveDate) {
        {
            let mut inner = self.shared.lock();
            info!("Selected date {}", date);
            inner.reset();
            inner.selected_date = date;
            self.shared.publish(&inner);
            if inner.driver_id.is_none() {
                debug!("No driver selected yet, date stored for the first fetch");
                return;
            }
        }
        self.fetch_page().await;
    }

    /// Starts (or continues from the cursor) the live query for the next
    /// page. No-op while another page is loading.
    pub async fn fetch_page(&self) {
        let shared = &self.shared;
        let (query, generation, page_index) = {
            let mut inner = shared.lock();
            if inner.is_loading {
                debug!("Fetch already in flight, ignoring");
                return;
            }
            let Some(driver_id) = inner.driver_id.clone() else {
                warn!("Fetch requested without a driver");
                inner.error = Some(RideError::Validation);
                shared.publish(&inner);
                return;
            };

            inner.stop_listening();
            inner.generation += 1;
            inner.is_loading = true;
            shared.publish(&inner);

            let page_index = if inner.cursor.is_none() {
                0
            } else {
                inner.pages.len()
            };
            (
                rides_query(&driver_id, inner.cursor.clone()),
                inner.generation,
                page_index,
            )
        };

        debug!(
            "Subscribing to page {} (generation {}, after {:?})",
            page_index,
            generation,
            query.start_after.as_ref().map(|c| c.id.as_str())
        );
        let subscription = match shared.store.subscribe(query).await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!("Could not start ride query: {}", e);
                shared.fail_page(generation, e.into());
                return;
            }
        };

        let pump = tokio::spawn(Arc::clone(shared).pump(subscription, generation, page_index));
        let mut inner = shared.lock();
        if inner.generation == generation {
            inner.pump = Some(pump);
        } else {
            pump.abort();
        }
    }

    pub async fn load_more(&self) {
        let ready = {
            let inner = self.shared.lock();
            inner.can_load_more && !inner.is_loading
        };
        if !ready {
            debug!("Nothing more to load");
            return;
        }
        self.fetch_page().await;
    }

    /// Loads a single ride with its sub-records, independent of the list.
    pub async fn ride_details(&self, ride_id: &str) -> Result<Option<Ride>, RideError> {
        let loaded = load_ride(
            self.shared.store.as_ref(),
            ride_id,
            self.shared.settings.subfetch_timeout,
        )
        .await?;
        Ok(loaded.map(|e| {
            for err in &e.errors {
                warn!("Ride {} loaded partially: {}", ride_id, err);
            }
            e.ride
        }))
    }

    /// Stops the live query. The published list stays as it is.
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        inner.stop_listening();
        inner.generation += 1;
        if inner.is_loading {
            inner.is_loading = false;
            self.shared.publish(&inner);
        }
    }
}

impl Drop for RideAggregationService {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.stop_listening();
        inner.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::collections::{POST_INSPECTION, TRIP_CHARGES};
    use crate::store::InMemoryStore;
    use crate::test_support::{fields, seed_trip, ScriptedStore};
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service(store: &Arc<ScriptedStore>, day: NaiveDate) -> RideAggregationService {
        let settings = ServiceSettings {
            subfetch_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        RideAggregationService::new(store.clone(), settings, day)
    }

    async fn settled(rx: &mut watch::Receiver<RideListState>) -> RideListState {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| !s.is_loading))
            .await
            .expect("timed out waiting for the page")
            .expect("service gone")
            .clone()
    }

    fn seed_day(store: &ScriptedStore, driver: &str, count: usize) {
        for i in 0..count {
            let end = format!("2024-05-10T{:02}:{:02}:00Z", 8 + i / 10, (i % 10) * 5);
            seed_trip(&store.inner, &format!("{}-trip-{:02}", driver, i), driver, &end);
        }
    }

    #[tokio::test]
    async fn test_empty_driver_is_validation_error() {
        let store = Arc::new(ScriptedStore::default());
        let svc = service(&store, date(2024, 5, 10));

        svc.set_driver("   ").await;
        let state = svc.state();
        assert_eq!(state.error_message.as_deref(), Some("driver id is required"));
        assert!(state.driver_id.is_none());
        assert_eq!(store.subscribe_calls(), 0);

        svc.fetch_page().await;
        assert_eq!(store.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_paginates_twenty_five_rides() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 25);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        svc.set_driver("D1").await;
        let first = settled(&mut rx).await;
        assert_eq!(first.rides.len(), 20);
        assert!(first.can_load_more);
        assert_eq!(first.error_message, None);
        // Newest first.
        assert_eq!(first.rides[0].id, "D1-trip-24");

        svc.load_more().await;
        let second = settled(&mut rx).await;
        assert_eq!(second.rides.len(), 25);
        assert!(!second.can_load_more);
        assert_eq!(second.rides[24].id, "D1-trip-00");
        let query = store.last_query().unwrap();
        assert_eq!(query.start_after.unwrap().id, "D1-trip-05");
        assert_eq!(query.limit, Some(PAGE_SIZE));

        svc.load_more().await;
        assert_eq!(store.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_is_single_flight() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 3);
        store.delay_subscribe(Duration::from_millis(50));
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        tokio::join!(svc.set_driver("D1"), svc.fetch_page(), svc.fetch_page());
        let state = settled(&mut rx).await;
        assert_eq!(store.subscribe_calls(), 1);
        assert_eq!(state.rides.len(), 3);
        assert!(!state.can_load_more);
    }

    #[tokio::test]
    async fn test_same_driver_is_noop() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 2);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        svc.set_driver("D1").await;
        settled(&mut rx).await;
        svc.set_driver("D1").await;
        assert_eq!(store.subscribe_calls(), 1);
        assert_eq!(svc.state().rides.len(), 2);
    }

    #[tokio::test]
    async fn test_switching_driver_resets_cursor_and_list() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 25);
        seed_day(&store, "D2", 1);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        svc.set_driver("D1").await;
        settled(&mut rx).await;
        svc.load_more().await;
        settled(&mut rx).await;

        svc.set_driver("D2").await;
        let query = store.last_query().unwrap();
        assert!(query.start_after.is_none());
        assert!(query.filters.iter().any(|f| f.value == json!("D2")));

        let state = settled(&mut rx).await;
        assert_eq!(state.driver_id.as_deref(), Some("D2"));
        assert_eq!(state.rides.len(), 1);
        assert!(state.rides.iter().all(|r| r.driver_id == "D2"));
    }

    #[tokio::test]
    async fn test_only_rides_of_selected_day_are_published() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "a", "D1", "2024-05-10T08:00:00Z");
        seed_trip(&store.inner, "b", "D1", "2024-05-09T23:59:59Z");
        seed_trip(&store.inner, "c", "D1", "2024-05-10T23:59:59Z");
        seed_trip(&store.inner, "d", "D1", "2024-05-11T00:00:00Z");
        let mut pending = fields(json!({
            "driverId": "D1", "startLocation": "x", "endLocation": "y",
            "startTime": "2024-05-10T10:00:00Z", "status": "active"
        }));
        pending.insert("endTime".to_string(), json!("2024-05-10T11:00:00Z"));
        store.inner.set_document(TRIPS, "e", pending);

        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;

        let ids: Vec<&str> = state.rides.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert!(state
            .rides
            .iter()
            .all(|r| local_day(r.end_time, Utc.fix()) == date(2024, 5, 10)));
    }

    #[tokio::test]
    async fn test_selected_day_follows_offset() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "late", "D1", "2024-05-10T23:30:00Z");
        let settings = ServiceSettings {
            subfetch_timeout: Duration::from_millis(200),
            utc_offset: FixedOffset::east_opt(2 * 3600).unwrap(),
        };
        let svc = RideAggregationService::new(store.clone(), settings, date(2024, 5, 11));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        assert_eq!(settled(&mut rx).await.rides.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_trip_is_skipped_and_reported() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 3);
        store.inner.set_document(
            TRIPS,
            "broken",
            fields(json!({
                "driverId": "D1", "startLocation": "x", "endLocation": "y",
                "startTime": "2024-05-10T07:00:00Z", "endTime": "half past seven",
                "status": "completed"
            })),
        );

        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;

        assert_eq!(state.rides.len(), 3);
        assert!(state.rides.iter().all(|r| r.id != "broken"));
        let message = state.error_message.unwrap();
        assert!(message.contains("broken"), "{}", message);
    }

    #[tokio::test]
    async fn test_no_rides_on_date_sets_message() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 5);
        let svc = service(&store, date(2024, 6, 1));
        let mut rx = svc.subscribe();

        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;
        assert!(state.rides.is_empty());
        assert_eq!(state.error_message.as_deref(), Some("no rides found on this date"));
        assert!(!state.can_load_more);
    }

    #[tokio::test]
    async fn test_changing_date_refetches_from_start() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 4);
        seed_trip(&store.inner, "next-day", "D1", "2024-05-11T09:00:00Z");
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        svc.set_driver("D1").await;
        assert_eq!(settled(&mut rx).await.rides.len(), 4);

        svc.set_selected_date(date(2024, 5, 11)).await;
        assert!(store.last_query().unwrap().start_after.is_none());
        let state = settled(&mut rx).await;
        assert_eq!(state.selected_date, date(2024, 5, 11));
        assert_eq!(state.rides.len(), 1);
        assert_eq!(state.rides[0].id, "next-day");
        assert_eq!(store.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_rides_are_enriched_before_publication() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "t1", "D1", "2024-05-10T09:00:00Z");
        store.inner.set_subdocument(
            TRIPS,
            "t1",
            POST_INSPECTION,
            "p",
            fields(json!({"status": "approved"})),
        );
        store.inner.set_subdocument(
            TRIPS,
            "t1",
            TRIP_CHARGES,
            "c",
            fields(json!({"fuel": 10, "toll": 2})),
        );

        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;

        let ride = &state.rides[0];
        assert_eq!(ride.total_charges(), 12.0);
        assert_eq!(ride.maintenance_status(), crate::models::MaintenanceStatus::Cleared);
        assert!(ride.pre_inspection.is_none());
        assert_eq!(state.total_charges(), 12.0);
    }

    #[tokio::test]
    async fn test_hanging_sub_fetch_times_out_and_page_still_publishes() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 2);
        store.hang_subcollection(TRIP_CHARGES);

        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;

        assert_eq!(state.rides.len(), 2);
        assert!(state.rides.iter().all(|r| r.trip_charges.is_none()));
        assert!(state.error_message.unwrap().starts_with("timed out"));
    }

    #[tokio::test]
    async fn test_superseded_page_is_discarded() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "slow", "D1", "2024-05-10T09:00:00Z");
        seed_trip(&store.inner, "fast", "D2", "2024-05-10T10:00:00Z");
        store.slow_ride("slow", Duration::from_millis(150));

        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        // Let the D1 page reach its sub-fetches before switching.
        tokio::time::sleep(Duration::from_millis(20)).await;
        svc.set_driver("D2").await;
        let state = settled(&mut rx).await;
        assert_eq!(state.rides.len(), 1);
        assert_eq!(state.rides[0].id, "fast");

        tokio::time::sleep(Duration::from_millis(300)).await;
        let state = svc.state();
        assert_eq!(state.driver_id.as_deref(), Some("D2"));
        let ids: Vec<&str> = state.rides.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["fast"]);
    }

    #[tokio::test]
    async fn test_live_change_republishes_page() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 2);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        assert_eq!(settled(&mut rx).await.rides.len(), 2);

        seed_trip(&store.inner, "late-arrival", "D1", "2024-05-10T20:00:00Z");
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.rides.len() == 3),
        )
        .await
        .expect("no republish")
        .expect("service gone")
        .clone();
        assert_eq!(state.rides[0].id, "late-arrival");
        assert_eq!(store.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_keeps_published_list() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 25);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        assert_eq!(settled(&mut rx).await.rides.len(), 20);

        store.fail_subscribe(true);
        svc.load_more().await;
        let state = settled(&mut rx).await;
        assert_eq!(state.rides.len(), 20);
        assert!(state
            .error_message
            .unwrap()
            .starts_with("could not load rides"));

        // The user retries once the backend is back.
        store.fail_subscribe(false);
        svc.load_more().await;
        let state = settled(&mut rx).await;
        assert_eq!(state.rides.len(), 25);
        assert_eq!(state.error_message, None);
    }

    #[tokio::test]
    async fn test_listener_closing_without_snapshot_allows_retry() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 3);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        store.close_subscribe(true);
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;
        assert!(state.rides.is_empty());
        assert_eq!(
            state.error_message.as_deref(),
            Some("could not load rides: listener closed")
        );

        store.close_subscribe(false);
        svc.fetch_page().await;
        let state = settled(&mut rx).await;
        assert_eq!(state.rides.len(), 3);
        assert_eq!(state.error_message, None);
        assert_eq!(store.subscribe_calls(), 2);
    }

    #[tokio::test]
    async fn test_date_before_driver_is_stored_without_fetching() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "next-day", "D1", "2024-05-11T09:00:00Z");
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();

        svc.set_selected_date(date(2024, 5, 11)).await;
        let state = svc.state();
        assert_eq!(state.selected_date, date(2024, 5, 11));
        assert_eq!(state.error_message, None);
        assert!(!state.is_loading);
        assert_eq!(store.subscribe_calls(), 0);

        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;
        assert_eq!(state.rides.len(), 1);
        assert_eq!(state.rides[0].id, "next-day");
    }

    #[tokio::test]
    async fn test_drop_cancels_live_query() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 1);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        settled(&mut rx).await;
        assert_eq!(store.inner.listener_count(), 1);

        drop(svc);
        tokio::time::timeout(Duration::from_secs(1), async {
            while store.inner.listener_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener still registered");
    }

    #[tokio::test]
    async fn test_loading_next_page_replaces_listener() {
        let store = Arc::new(ScriptedStore::default());
        seed_day(&store, "D1", 25);
        let svc = service(&store, date(2024, 5, 10));
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        settled(&mut rx).await;
        svc.load_more().await;
        settled(&mut rx).await;

        tokio::time::timeout(Duration::from_secs(1), async {
            while store.inner.listener_count() > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("old listener still registered");
        assert_eq!(store.inner.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_ride_details() {
        let store = Arc::new(ScriptedStore::default());
        seed_trip(&store.inner, "t1", "D1", "2024-05-10T09:00:00Z");
        store.inner.set_subdocument(TRIPS, "t1", TRIP_CHARGES, "c", fields(json!({"misc": 3})));
        let svc = service(&store, date(2024, 5, 10));

        let ride = svc.ride_details("t1").await.unwrap().unwrap();
        assert_eq!(ride.total_charges(), 3.0);
        assert!(svc.ride_details("missing").await.unwrap().is_none());
        assert_eq!(store.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_sample_seed_data() {
        let raw = include_str!("../../data/rides.sample.json");
        let store = InMemoryStore::from_seed_json(raw).unwrap();
        let svc = RideAggregationService::new(
            Arc::new(store),
            ServiceSettings::default(),
            date(2024, 5, 10),
        );
        let mut rx = svc.subscribe();
        svc.set_driver("D1").await;
        let state = settled(&mut rx).await;

        assert_eq!(state.rides.len(), 4);
        assert_eq!(state.error_message, None);
        let by_id = |id: &str| state.rides.iter().find(|r| r.id == id).unwrap();
        assert_eq!(
            by_id("trip-002").maintenance_status(),
            crate::models::MaintenanceStatus::TicketRaised
        );
        assert_eq!(by_id("trip-001").maintenance_status().label(), "cleared");
        assert!(by_id("trip-003").pre_inspection.as_ref().unwrap().has_defects());
        assert_eq!(by_id("trip-001").total_charges(), 25.5);
        assert_eq!(by_id("trip-001").duration().num_minutes(), 45);
    }
}
