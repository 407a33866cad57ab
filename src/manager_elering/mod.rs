mod models;

use std::time::Duration;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use thiserror::Error;
use crate::config::ProviderParameters;
use crate::manager_elering::models::PriceResponse;
use crate::models::PriceRow;
use crate::normalizer::{NormalizeError, Normalizer};

const REQUEST_URL: &str = "https://dashboard.elering.ee/api/nps/price";

/// Struct for fetching Nord Pool day-ahead prices through the Elering dashboard API
pub struct Elering {
    client: Client,
    area: String,
    normalizer: Normalizer,
}

impl Elering {
    /// Returns a new Elering struct
    ///
    /// # Arguments
    ///
    /// * 'config' - provider configuration
    /// * 'normalizer' - normalizer for the market the prices belong to
    pub fn new(config: &ProviderParameters, normalizer: Normalizer) -> Result<Elering, EleringError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Elering { client, area: config.elering_area.to_lowercase(), normalizer })
    }

    /// Retrieves day-ahead prices for the configured area
    ///
    /// # Arguments
    ///
    /// * 'from' - start of the period to get prices for
    /// * 'to' - end of the period (non-inclusive)
    pub fn get_prices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PriceRow>, EleringError> {
        let start = from.to_rfc3339_opts(SecondsFormat::Millis, true);
        let end = to.to_rfc3339_opts(SecondsFormat::Millis, true);

        let response = self.client
            .get(REQUEST_URL)
            .query(&vec![("start", start.as_str()), ("end", end.as_str())])
            .send()?;

        if response.status() == 204 {
            return Err(EleringError::NoContent);
        }

        let json = response.text()?;
        let rows = self.parse_response(&json)?;

        Ok(rows
            .into_iter()
            .filter(|r| r.start.with_timezone(&Utc) >= from && r.start.with_timezone(&Utc) < to)
            .collect())
    }

    /// Decodes a price response into hourly rows
    ///
    /// # Arguments
    ///
    /// * 'json' - the response body
    pub fn parse_response(&self, json: &str) -> Result<Vec<PriceRow>, EleringError> {
        let response: PriceResponse = serde_json::from_str(json)?;
        if !response.success {
            return Err(EleringError::Unsuccessful);
        }

        let entries = response.data
            .get(&self.area)
            .ok_or_else(|| EleringError::UnknownArea(self.area.clone()))?;
        if entries.is_empty() {
            return Err(EleringError::NoContent);
        }

        let entries = entries.iter()
            .map(|e| DateTime::from_timestamp(e.timestamp, 0)
                .map(|ts| (ts, e.price))
                .ok_or(EleringError::Timestamp(e.timestamp)))
            .collect::<Result<Vec<(DateTime<Utc>, Decimal)>, EleringError>>()?;

        Ok(self.normalizer.hourly_rows(&entries)?)
    }
}

#[derive(Error, Debug)]
pub enum EleringError {
    #[error("DocumentError: {0}")]
    Document(#[from] serde_json::Error),
    #[error("NetworkError: {0}")]
    Network(#[from] reqwest::Error),
    #[error("NormalizeError: {0}")]
    Normalize(#[from] NormalizeError),
    #[error("TimestampError: {0}")]
    Timestamp(i64),
    #[error("UnknownAreaError: {0}")]
    UnknownArea(String),
    #[error("UnsuccessfulError")]
    Unsuccessful,
    #[error("NoContentError")]
    NoContent,
}
