use std::str::FromStr;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{error, info, warn};
use anyhow::Result;
use rust_decimal::Decimal;
use thiserror::Error;
use crate::cache::{load_series, save_series};
use crate::config::Config;
use crate::day_window::day_bounds;
use crate::errors::QueryError;
use crate::initialization::{Mgr, QueryArgs};
use crate::models::{PriceRow, QuerySelection, SpotPriceSeries, TransferPrices};
use crate::query::{Mode, QueryEngine, QueryRequest};
use crate::retry;

/// Runs a refresh cycle and returns the snapshot to answer queries from
///
/// # Arguments
///
/// * 'config' - configuration
/// * 'mgr' - struct with configured managers
/// * 'now' - current time in the market time zone
pub fn refresh(config: &Config, mgr: &Mgr, now: &DateTime<Tz>) -> Result<SpotPriceSeries, WorkerError> {
    refresh_series(
        |from, to| mgr.provider.get_prices(from, to),
        &config.files.cache_file,
        config.provider.retries,
        config.market.publication_hour,
        now,
    )
}

/// Refreshes the cached snapshot unless it is still good for `now`
///
/// Prices are fetched for yesterday through tomorrow. If fetching fails, the cached snapshot
/// is kept as long as it still covers today.
///
/// # Arguments
///
/// * 'fetch' - fetches price rows for a UTC period (end non-inclusive)
/// * 'cache_file' - path to the cache file
/// * 'retries' - number of extra fetch attempts
/// * 'publication_hour' - local hour from which tomorrow's prices are expected
/// * 'now' - current time in the market time zone
fn refresh_series<F>(fetch: F, cache_file: &str, retries: u32, publication_hour: u32, now: &DateTime<Tz>) -> Result<SpotPriceSeries, WorkerError>
where
    F: Fn(DateTime<Utc>, DateTime<Utc>) -> Result<Vec<PriceRow>>,
{
    let cached = match load_series(cache_file, now) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("ignoring unreadable price cache: {}", e);
            None
        }
    };

    if let Some(series) = &cached {
        if !series.is_stale(now) && !series.expects_tomorrow(now, publication_hour) {
            info!("Cached prices are up to date");
            return Ok(series.clone());
        }
    }

    let (from, _) = day_bounds(now, -1);
    let (_, to) = day_bounds(now, 1);
    let from = from.with_timezone(&Utc);
    let to = to.with_timezone(&Utc);

    match retry!(retries; || fetch(from, to)) {
        Ok(rows) => {
            info!("Fetched {} price rows for {} - {}", rows.len(), from, to);
            let mut all = cached.map(|c| c.flatten()).unwrap_or_default();
            all.extend(rows);

            let series = SpotPriceSeries::from_rows(&all, now);
            if series.is_stale(now) {
                return Err(WorkerError::IncompleteError(format!("{} rows for today", series.today.len())));
            }
            save_series(cache_file, &series)
                .map_err(|e| WorkerError::SaveCacheError(e.to_string()))?;

            Ok(series)
        }
        Err(e) => {
            error!("error fetching prices: {}", e);
            match cached {
                Some(series) if !series.is_stale(now) => {
                    warn!("Keeping cached prices, {} rows for tomorrow", series.tomorrow.len());
                    Ok(series)
                }
                _ => Err(WorkerError::FetchError(e.to_string())),
            }
        }
    }
}

/// Answers a query from the command line, any failure gives the unavailable answer
///
/// # Arguments
///
/// * 'engine' - the query engine
/// * 'series' - snapshot to answer from
/// * 'query' - raw query arguments
/// * 'now' - current time in the market time zone
pub fn answer(engine: &QueryEngine, series: &SpotPriceSeries, query: &QueryArgs, now: &DateTime<Tz>) -> QuerySelection {
    let result = build_request(query, now)
        .and_then(|request| engine.get_hours(series, &request, now));

    match result {
        Ok(selection) => selection,
        Err(e) => {
            warn!("query unavailable: {}", e);
            QuerySelection::unavailable()
        }
    }
}

/// Turns raw query arguments into a request. Missing bounds default to the start of
/// yesterday and the end of tomorrow.
fn build_request(query: &QueryArgs, now: &DateTime<Tz>) -> Result<QueryRequest, QueryError> {
    let mode = Mode::from_str(&query.mode)?;

    let number_of_hours = match (&query.hours, mode.needs_window_length()) {
        (Some(hours), true) => Some(Decimal::from_str(hours.trim())
            .map_err(|e| QueryError::InvalidWindowSize(format!("{}: {}", hours, e)))?),
        _ => None,
    };

    let tz = now.timezone();
    let start = match &query.start {
        Some(text) => parse_time(text, &tz)?,
        None => day_bounds(now, -1).0,
    };
    let end = match &query.end {
        Some(text) => parse_time(text, &tz)?,
        None => day_bounds(now, 1).1,
    };

    let transfer = match (&query.peak, &query.off_peak) {
        (Some(peak), Some(off_peak)) => Some(TransferPrices {
            peak_transfer: parse_decimal(peak)?,
            off_peak_transfer: parse_decimal(off_peak)?,
        }),
        (None, None) => None,
        _ => return Err(QueryError::InvalidArgument("peak and off-peak transfer must be given together".to_string())),
    };

    Ok(QueryRequest { number_of_hours, start, end, mode, transfer })
}

/// Parses epoch seconds or an RFC 3339 timestamp
fn parse_time(text: &str, tz: &Tz) -> Result<DateTime<Tz>, QueryError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.with_timezone(tz))
            .ok_or(QueryError::InvalidArgument(format!("timestamp {} out of range", secs)));
    }

    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(tz))
        .map_err(|e| QueryError::InvalidArgument(format!("time '{}': {}", text, e)))
}

fn parse_decimal(text: &str) -> Result<Decimal, QueryError> {
    Decimal::from_str(text.trim())
        .map_err(|e| QueryError::InvalidArgument(format!("'{}': {}", text, e)))
}

/// Error depicting errors that occur while refreshing prices
///
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("error while fetching prices: {0:?}")]
    FetchError(String),
    #[error("error while saving price cache: {0:?}")]
    SaveCacheError(String),
    #[error("prices for today are incomplete: {0:?}")]
    IncompleteError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use chrono::{TimeDelta, TimeZone, Timelike};
    use chrono_tz::Europe::Helsinki;
    use rust_decimal_macros::dec;
    use crate::query::SelectionStrategy;

    fn now() -> DateTime<Tz> {
        Helsinki.with_ymd_and_hms(2024, 1, 2, 10, 15, 0).unwrap()
    }

    /// Hourly rows for the requested UTC period, cheapest at 03:00 local each day
    fn rows_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<PriceRow> {
        let mut rows = Vec::new();
        let mut t = from;
        while t < to {
            let start = t.with_timezone(&Helsinki);
            let price = if start.hour() == 3 { dec!(0.001) } else { dec!(0.1) };
            rows.push(PriceRow { start, price });
            t += TimeDelta::hours(1);
        }
        rows
    }

    fn cache_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("spot_hours_{}_{}.json", name, std::process::id()))
            .to_string_lossy()
            .to_string()
    }

    fn query(mode: &str, hours: Option<&str>) -> QueryArgs {
        QueryArgs { mode: mode.to_string(), hours: hours.map(|h| h.to_string()), ..QueryArgs::default() }
    }

    #[test]
    fn refresh_fetches_and_caches() {
        let path = cache_path("fetch");
        let calls = Cell::new(0);
        let fetch = |from: DateTime<Utc>, to: DateTime<Utc>| -> Result<Vec<PriceRow>> {
            calls.set(calls.get() + 1);
            Ok(rows_between(from, to))
        };

        let series = refresh_series(&fetch, &path, 0, 14, &now()).unwrap();
        assert_eq!(series.today.len(), 24);
        assert_eq!(series.tomorrow.len(), 24);

        let again = refresh_series(&fetch, &path, 0, 14, &now()).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(calls.get(), 1);
        assert_eq!(again.flatten(), series.flatten());
    }

    #[test]
    fn failed_fetch_keeps_usable_cache() {
        let path = cache_path("keep");
        let good = |from: DateTime<Utc>, to: DateTime<Utc>| -> Result<Vec<PriceRow>> { Ok(rows_between(from, to)) };
        let down = |_: DateTime<Utc>, _: DateTime<Utc>| -> Result<Vec<PriceRow>> { Err(anyhow::anyhow!("upstream down")) };

        let series = refresh_series(&good, &path, 0, 14, &now()).unwrap();
        let later = Helsinki.with_ymd_and_hms(2024, 1, 3, 15, 0, 0).unwrap();
        let kept = refresh_series(&down, &path, 0, 14, &later).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(kept.today, series.tomorrow);
        assert!(kept.tomorrow.is_empty());
    }

    #[test]
    fn failed_fetch_without_cache_is_an_error() {
        let path = cache_path("none");
        let down = |_: DateTime<Utc>, _: DateTime<Utc>| -> Result<Vec<PriceRow>> { Err(anyhow::anyhow!("upstream down")) };
        assert!(matches!(refresh_series(&down, &path, 0, 14, &now()), Err(WorkerError::FetchError(_))));
    }

    #[test]
    fn answers_from_snapshot() {
        let (from, _) = day_bounds(&now(), -1);
        let (_, to) = day_bounds(&now(), 1);
        let series = SpotPriceSeries::from_rows(&rows_between(from.with_timezone(&Utc), to.with_timezone(&Utc)), &now());
        let engine = QueryEngine::new(SelectionStrategy::Hourly);

        let mut q = query("LowestPrices", Some("1"));
        q.start = Some(Helsinki.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap().timestamp().to_string());
        q.end = Some("2024-01-03T00:00:00+02:00".to_string());

        let selection = answer(&engine, &series, &q, &now());
        assert_eq!(selection.hours, vec!["3 Tue"]);
        assert_eq!(selection.info.unwrap().min, dec!(0.001));
    }

    #[test]
    fn bad_queries_are_unavailable() {
        let series = SpotPriceSeries::default();
        let engine = QueryEngine::new(SelectionStrategy::Hourly);

        assert!(answer(&engine, &series, &query("CheapestHours", Some("3")), &now()).is_unavailable());
        assert!(answer(&engine, &series, &query("LowestPrices", Some("three")), &now()).is_unavailable());

        let mut half_transfer = query("LowestPrices", Some("3"));
        half_transfer.peak = Some("0.04".to_string());
        assert!(matches!(build_request(&half_transfer, &now()), Err(QueryError::InvalidArgument(_))));
    }

    #[test]
    fn default_bounds_cover_three_days() {
        let request = build_request(&query("AboveAveragePrices", Some("3")), &now()).unwrap();
        assert_eq!(request.start, Helsinki.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(request.end, Helsinki.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap());
        assert_eq!(request.number_of_hours, None);
    }
}
