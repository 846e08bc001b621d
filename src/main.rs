use std::sync::Arc;
use std::time::Duration;

use siscom_rides::config::AppConfig;
use siscom_rides::{CalendarGridBuilder, InMemoryStore, RideAggregationService, RideListState};
use tokio::sync::watch;
use tracing::{info, warn};

async fn wait_for_page(rx: &mut watch::Receiver<RideListState>) -> anyhow::Result<RideListState> {
    let state = tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|s| !s.is_loading))
        .await??
        .clone();
    Ok(state)
}

fn print_month(calendar: &CalendarGridBuilder, rides: &[siscom_rides::models::Ride]) {
    println!("{:^35}", calendar.month_title());
    println!(
        "{}",
        calendar
            .weekday_symbols()
            .iter()
            .map(|s| format!("{:>5}", s))
            .collect::<String>()
    );
    for week in calendar.current_grid() {
        let row: String = week
            .iter()
            .map(|cell| match cell {
                Some(day) if calendar.has_entries(*day, rides) => {
                    format!("{:>4}*", day.format("%-d"))
                }
                Some(day) => format!("{:>5}", day.format("%-d")),
                None => "     ".to_string(),
            })
            .collect();
        println!("{}", row);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Siscom Rides...");

    let store = InMemoryStore::from_seed_file(&config.seed_file)?;
    info!("Loaded seed data from {}", config.seed_file);

    let service = RideAggregationService::new(
        Arc::new(store),
        config.service_settings(),
        config.selected_date,
    );
    let mut updates = service.subscribe();

    service.set_driver(&config.driver_id).await;
    let mut state = service.state();
    if state.driver_id.is_some() {
        state = wait_for_page(&mut updates).await?;
        while state.can_load_more {
            service.load_more().await;
            state = wait_for_page(&mut updates).await?;
        }
    }

    if let Some(message) = &state.error_message {
        warn!("{}", message);
    }

    for ride in &state.rides {
        info!(
            "{} | {} -> {} | {} passengers | {} min | charges {:.2} | {}",
            ride.id,
            ride.start_location,
            ride.end_location,
            ride.passengers,
            ride.duration().num_minutes(),
            ride.total_charges(),
            ride.maintenance_status().label()
        );
    }
    info!(
        "{} rides on {}, total charges {:.2}",
        state.rides.len(),
        state.selected_date,
        state.total_charges()
    );

    let calendar = CalendarGridBuilder::new(
        config.selected_date,
        config.first_weekday,
        config.utc_offset,
    );
    print_month(&calendar, &state.rides);

    service.stop();
    Ok(())
}
