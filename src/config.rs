use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Local, NaiveDate, Weekday};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::processor::ServiceSettings;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub driver_id: String,
    pub selected_date: NaiveDate,
    pub utc_offset: FixedOffset,
    pub first_weekday: Weekday,
    pub subfetch_timeout: Duration,
    pub seed_file: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let driver_id = env::var("DRIVER_ID").unwrap_or_default();

        let selected_date = match env::var("SELECTED_DATE") {
            Ok(raw) if !raw.trim().is_empty() => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .with_context(|| format!("SELECTED_DATE must be YYYY-MM-DD, got '{}'", raw))?,
            _ => Local::now().date_naive(),
        };

        let offset_minutes: i32 = env::var("UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES out of range: {}", offset_minutes))?;

        let first_weekday = env::var("FIRST_WEEKDAY")
            .unwrap_or_else(|_| "sunday".to_string())
            .parse::<Weekday>()
            .map_err(|_| anyhow!("FIRST_WEEKDAY must be a weekday name"))?;

        let subfetch_timeout_ms: u64 = env::var("SUBFETCH_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        let seed_file =
            env::var("RIDES_SEED_FILE").unwrap_or_else(|_| "data/rides.sample.json".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            driver_id,
            selected_date,
            utc_offset,
            first_weekday,
            subfetch_timeout: Duration::from_millis(subfetch_timeout_ms),
            seed_file,
            log_level,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            subfetch_timeout: self.subfetch_timeout,
            utc_offset: self.utc_offset,
        }
    }
}
