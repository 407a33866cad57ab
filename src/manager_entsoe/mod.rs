pub mod errors;
mod models;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use log::{debug, warn};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use crate::config::ProviderParameters;
use crate::manager_entsoe::errors::EntsoeError;
use crate::manager_entsoe::models::{Period, PublicationMarketDocument};
use crate::models::PriceRow;
use crate::normalizer::Normalizer;

const REQUEST_URL: &str = "https://web-api.tp.entsoe.eu/api";

/// Nominal number of hourly positions in one period
const HOURS_PER_PERIOD: u32 = 24;

/// Struct for fetching and decoding day-ahead prices from the ENTSO-E transparency platform
pub struct Entsoe {
    client: Client,
    token: String,
    domain: String,
    normalizer: Normalizer,
}

impl Entsoe {
    /// Returns a new Entsoe struct
    ///
    /// # Arguments
    ///
    /// * 'config' - provider configuration
    /// * 'normalizer' - normalizer for the market the prices belong to
    pub fn new(config: &ProviderParameters, normalizer: Normalizer) -> Result<Entsoe, EntsoeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Entsoe {
            client,
            token: config.entsoe_token.clone(),
            domain: config.entsoe_domain.clone(),
            normalizer,
        })
    }

    /// Retrieves day-ahead prices (document type A44) for the configured bidding zone
    ///
    /// # Arguments
    ///
    /// * 'from' - start of the period to get prices for
    /// * 'to' - end of the period (non-inclusive)
    pub fn get_prices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PriceRow>, EntsoeError> {
        let period_start = format!("{}", from.format("%Y%m%d%H%M"));
        let period_end = format!("{}", to.format("%Y%m%d%H%M"));

        let response = self.client
            .get(REQUEST_URL)
            .query(&vec![
                ("securityToken", self.token.as_str()),
                ("documentType", "A44"),
                ("in_Domain", self.domain.as_str()),
                ("out_Domain", self.domain.as_str()),
                ("periodStart", period_start.as_str()),
                ("periodEnd", period_end.as_str()),
            ])
            .send()?;

        if !response.status().is_success() {
            debug!("ENTSO-E answered {}", response.status());
            return Err(EntsoeError::NoContent);
        }

        let xml = response.text()?;
        parse_document(&xml, &self.normalizer)
    }
}

/// Decodes a Publication_MarketDocument into price rows
///
/// Every period yields one row per position in its time interval, 23 or 25 on DST days, or
/// the nominal 24 hours when the interval has no end. A position missing in the document
/// carries the price of the position before it.
///
/// # Arguments
///
/// * 'xml' - the document as text
/// * 'normalizer' - applies VAT, unit conversion and rounding
pub fn parse_document(xml: &str, normalizer: &Normalizer) -> Result<Vec<PriceRow>, EntsoeError> {
    let document: PublicationMarketDocument = quick_xml::de::from_str(xml)
        .map_err(|e| EntsoeError::Parse(e.to_string()))?;

    let mut rows: Vec<PriceRow> = Vec::new();
    for period in document.time_series.iter().flat_map(|ts| ts.periods.iter()) {
        rows.extend(period_rows(period, normalizer)?);
    }

    if rows.is_empty() {
        return Err(EntsoeError::NoContent);
    }

    Ok(rows)
}

/// Expands one period into hourly rows
///
/// Positions are counted in absolute time from the period start, so a period crossing a DST
/// switch still maps every position to a distinct instant.
fn period_rows(period: &Period, normalizer: &Normalizer) -> Result<Vec<PriceRow>, EntsoeError> {
    let start = parse_instant(&period.time_interval.start)?;
    let slot = resolution(period.resolution.as_deref())?;
    let positions = match &period.time_interval.end {
        Some(end) => interval_positions(start, parse_instant(end)?, slot)?,
        None => HOURS_PER_PERIOD * (60 / slot.num_minutes() as u32),
    };

    let mut prices: HashMap<u32, Decimal> = HashMap::new();
    for point in period.points.iter() {
        if point.position < 1 || point.position > positions {
            warn!("ignoring position {} outside period starting {}", point.position, start);
            continue;
        }
        let price = Decimal::from_str(point.price_amount.trim())
            .map_err(|e| EntsoeError::Parse(format!("price.amount '{}': {}", point.price_amount, e)))?;
        prices.insert(point.position, price);
    }

    let mut last: Option<Decimal> = None;
    let mut entries: Vec<(DateTime<Utc>, Decimal)> = Vec::with_capacity(positions as usize);
    for position in 1..=positions {
        let price = match prices.get(&position) {
            Some(price) => *price,
            None => last.ok_or_else(|| EntsoeError::MissingFirstPosition(start.to_rfc3339()))?,
        };
        last = Some(price);
        entries.push((start + slot * (position - 1) as i32, price));
    }

    Ok(normalizer.hourly_rows(&entries)?)
}

/// Number of positions between interval start and end, which must be a whole number of slots
fn interval_positions(start: DateTime<Utc>, end: DateTime<Utc>, slot: TimeDelta) -> Result<u32, EntsoeError> {
    let minutes = (end - start).num_minutes();
    let slot_minutes = slot.num_minutes();

    if minutes <= 0 || minutes % slot_minutes != 0 {
        return Err(EntsoeError::Parse(format!("timeInterval {} - {} is not a whole number of {} minute slots",
                                              start, end, slot_minutes)));
    }

    Ok((minutes / slot_minutes) as u32)
}

/// Parses the ISO instants used in ENTSO-E documents, e.g. `2024-01-01T23:00Z`
fn parse_instant(text: &str) -> Result<DateTime<Utc>, EntsoeError> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%MZ")
        .map(|dt| dt.and_utc())
        .map_err(|e| EntsoeError::Parse(format!("timeInterval '{}': {}", text, e)))
}

fn resolution(resolution: Option<&str>) -> Result<TimeDelta, EntsoeError> {
    match resolution.map(str::trim) {
        None | Some("PT60M") => Ok(TimeDelta::hours(1)),
        Some("PT15M") => Ok(TimeDelta::minutes(15)),
        Some(other) => Err(EntsoeError::UnsupportedResolution(other.to_string())),
    }
}
