use std::fs;
use std::path::Path;
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::day_window::{is_complete, select_day};
use crate::models::{PriceRow, SpotPriceSeries};

#[derive(Serialize, Deserialize)]
struct StoredRow {
    start: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    saved_at: DateTime<Utc>,
    rows: Vec<StoredRow>,
}

impl SpotPriceSeries {
    /// Sorts flat rows into yesterday, today and tomorrow buckets relative to `now`
    ///
    /// Rows outside the three days are dropped. If two rows share a start, the later one in
    /// `rows` wins.
    ///
    /// # Arguments
    ///
    /// * 'rows' - price rows in any order
    /// * 'now' - the reference time, in the market time zone
    pub fn from_rows(rows: &[PriceRow], now: &DateTime<Tz>) -> SpotPriceSeries {
        let mut sorted: Vec<PriceRow> = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            if !sorted.iter().any(|r| r.start == row.start) {
                sorted.push(row.clone());
            }
        }
        sorted.sort_by(|a, b| a.start.cmp(&b.start));

        SpotPriceSeries {
            yesterday: select_day(&sorted, now, -1),
            today: select_day(&sorted, now, 0),
            tomorrow: select_day(&sorted, now, 1),
        }
    }

    /// Tells whether the snapshot can't answer queries for `now`: today is incomplete or
    /// `now` falls outside today's span
    ///
    /// # Arguments
    ///
    /// * 'now' - current time
    pub fn is_stale(&self, now: &DateTime<Tz>) -> bool {
        if !is_complete(&self.today) {
            return true;
        }
        match (self.today.first(), self.today.last()) {
            (Some(first), Some(last)) => *now < first.start || *now >= last.start + TimeDelta::hours(1),
            _ => true,
        }
    }

    /// Tells whether tomorrow's prices should be published but are not in the snapshot
    ///
    /// # Arguments
    ///
    /// * 'now' - current time
    /// * 'publication_hour' - local hour from which tomorrow's prices are expected
    pub fn expects_tomorrow(&self, now: &DateTime<Tz>, publication_hour: u32) -> bool {
        now.hour() >= publication_hour && !is_complete(&self.tomorrow)
    }
}

/// Saves a snapshot to disk as JSON, timestamps in UTC
///
/// # Arguments
///
/// * 'path' - path to the cache file
/// * 'series' - the snapshot to save
pub fn save_series(path: &str, series: &SpotPriceSeries) -> Result<(), CacheError> {
    let cache = CacheFile {
        saved_at: Utc::now(),
        rows: series.flatten()
            .into_iter()
            .map(|r| StoredRow { start: r.start.with_timezone(&Utc), price: r.price })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&cache)
        .map_err(|e| CacheError::Save(format!("error serializing cache: {}", e)))?;

    fs::write(path, json)
        .map_err(|e| CacheError::Save(format!("error writing cache to {}: {}", path, e)))?;

    info!("Price cache saved to {}", path);

    Ok(())
}

/// Loads a snapshot saved by `save_series`, sliced for `now`
///
/// Slicing for `now` rolls the buckets over when the snapshot was saved on an earlier day.
/// Returns None if there is no cache file yet.
///
/// # Arguments
///
/// * 'path' - path to the cache file
/// * 'now' - the reference time, in the market time zone
pub fn load_series(path: &str, now: &DateTime<Tz>) -> Result<Option<SpotPriceSeries>, CacheError> {
    if !Path::new(path).exists() {
        debug!("No price cache at {}", path);
        return Ok(None);
    }

    let json = fs::read_to_string(path)
        .map_err(|e| CacheError::Load(format!("error reading cache from {}: {}", path, e)))?;
    let cache: CacheFile = serde_json::from_str(&json)
        .map_err(|e| CacheError::Load(format!("error deserializing cache: {}", e)))?;

    let tz = now.timezone();
    let rows = cache.rows
        .into_iter()
        .map(|r| PriceRow { start: r.start.with_timezone(&tz), price: r.price })
        .collect::<Vec<PriceRow>>();

    debug!("Loaded {} cached rows saved at {}", rows.len(), cache.saved_at);

    Ok(Some(SpotPriceSeries::from_rows(&rows, now)))
}

/// Error depicting errors that occur while persisting the price cache
///
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("error while saving cache: {0}")]
    Save(String),
    #[error("error while loading cache: {0}")]
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Helsinki;
    use rust_decimal_macros::dec;

    /// Rows for 2024-01-01 .. 2024-01-03 local time, prices in steps of 0.001
    fn three_days() -> Vec<PriceRow> {
        let start = Helsinki.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..72)
            .map(|h| PriceRow { start: start + TimeDelta::hours(h), price: Decimal::from(h) / dec!(1000) })
            .collect()
    }

    #[test]
    fn buckets_rows_per_local_day() {
        let now = Helsinki.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let series = SpotPriceSeries::from_rows(&three_days(), &now);

        assert_eq!(series.yesterday.len(), 24);
        assert_eq!(series.today.len(), 24);
        assert_eq!(series.tomorrow.len(), 24);
        assert_eq!(series.today[0].price, dec!(0.024));
        assert!(!series.is_stale(&now));
    }

    #[test]
    fn duplicates_keep_latest_row() {
        let now = Helsinki.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let mut rows = three_days();
        rows.push(PriceRow { start: rows[30].start, price: dec!(9) });

        let series = SpotPriceSeries::from_rows(&rows, &now);
        assert_eq!(series.today.len(), 24);
        assert_eq!(series.today[6].price, dec!(9));
    }

    #[test]
    fn midnight_makes_snapshot_stale_until_reloaded() {
        let before = Helsinki.with_ymd_and_hms(2024, 1, 2, 23, 30, 0).unwrap();
        let after = Helsinki.with_ymd_and_hms(2024, 1, 3, 0, 5, 0).unwrap();
        let series = SpotPriceSeries::from_rows(&three_days(), &before);

        assert!(!series.is_stale(&before));
        assert!(series.is_stale(&after));

        let path = std::env::temp_dir().join(format!("spot_hours_midnight_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();
        save_series(&path, &series).unwrap();
        let rolled = load_series(&path, &after).unwrap().unwrap();
        let _ = fs::remove_file(&path);
        assert!(!rolled.is_stale(&after));
        assert_eq!(rolled.yesterday.len(), 24);
        assert!(rolled.tomorrow.is_empty());
    }

    #[test]
    fn tomorrow_expected_after_publication() {
        let morning = Helsinki.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let afternoon = Helsinki.with_ymd_and_hms(2024, 1, 3, 15, 0, 0).unwrap();
        let series = SpotPriceSeries::from_rows(&three_days(), &morning);

        assert!(!series.expects_tomorrow(&morning, 14));
        assert!(series.expects_tomorrow(&afternoon, 14));
    }

    #[test]
    fn saved_cache_loads_back() {
        let now = Helsinki.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let series = SpotPriceSeries::from_rows(&three_days(), &now);
        let path = std::env::temp_dir().join(format!("spot_hours_cache_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();

        save_series(&path, &series).unwrap();
        let loaded = load_series(&path, &now).unwrap().unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.flatten(), series.flatten());
    }

    #[test]
    fn missing_cache_is_none() {
        let now = Helsinki.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        assert!(load_series("/nonexistent/spot_hours.json", &now).unwrap().is_none());
    }
}
