use std::env;
use chrono::{DateTime, Utc};
use log::info;
use anyhow::Result;
use thiserror::Error;
use crate::config::{load_config, Config, LoadConfigurationError, PriceSource};
use crate::logging::{setup_logger, LoggerError};
use crate::manager_elering::{Elering, EleringError};
use crate::manager_entsoe::Entsoe;
use crate::manager_entsoe::errors::EntsoeError;
use crate::models::PriceRow;
use crate::normalizer::Normalizer;
use crate::query::QueryEngine;

/// The configured upstream price provider
pub enum PriceProvider {
    Entsoe(Entsoe),
    Elering(Elering),
}

impl PriceProvider {
    /// Retrieves normalized prices for the given period from whichever provider is configured
    ///
    /// # Arguments
    ///
    /// * 'from' - start of the period
    /// * 'to' - end of the period (non-inclusive)
    pub fn get_prices(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PriceRow>> {
        let rows = match self {
            PriceProvider::Entsoe(entsoe) => entsoe.get_prices(from, to)?,
            PriceProvider::Elering(elering) => elering.get_prices(from, to)?,
        };

        Ok(rows)
    }
}

pub struct Mgr {
    pub provider: PriceProvider,
    pub engine: QueryEngine,
}

/// Raw query arguments as given on the command line
#[derive(Default, Debug)]
pub struct QueryArgs {
    pub mode: String,
    pub hours: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub peak: Option<String>,
    pub off_peak: Option<String>,
}

/// Initializes and returns configuration, a Mgr struct holding initialized managers and
/// an optional query to answer
///
pub fn init() -> Result<(Config, Mgr, Option<QueryArgs>), InitializationError> {
    let args: Vec<String> = env::args().collect();
    let config_path = arg_value(&args, "config")
        .ok_or(InitializationError::ArgumentError("--config=<path> is required".to_string()))?;

    // Load configuration
    let config = load_config(&config_path)?;

    // Setup logging
    let _ = setup_logger(&config.general.log_path, config.general.log_level, config.general.log_to_stdout)?;

    // Print version
    info!("starting spot hours version: {}", env!("CARGO_PKG_VERSION"));

    // Instantiate structs
    let normalizer = Normalizer::new(config.market.time_zone, config.market.vat_factor);
    let provider = match config.provider.source {
        PriceSource::Entsoe => PriceProvider::Entsoe(Entsoe::new(&config.provider, normalizer)?),
        PriceSource::Elering => PriceProvider::Elering(Elering::new(&config.provider, normalizer)?),
    };
    let engine = QueryEngine::new(config.query.strategy);

    let query = query_args(&args);

    Ok((config, Mgr { provider, engine }, query))
}

/// Collects query arguments, if a mode is given
///
/// # Arguments
///
/// * 'args' - command line arguments
fn query_args(args: &[String]) -> Option<QueryArgs> {
    let mode = arg_value(args, "mode")?;

    Some(QueryArgs {
        mode,
        hours: arg_value(args, "hours"),
        start: arg_value(args, "start"),
        end: arg_value(args, "end"),
        peak: arg_value(args, "peak"),
        off_peak: arg_value(args, "off-peak"),
    })
}

/// Returns the value of a `--name=value` argument
fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("--{}=", name);
    args.iter()
        .find_map(|a| a.strip_prefix(&prefix))
        .map(|v| v.to_string())
}

/// Error depicting errors that occur while initializing
///
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("ArgumentError: {0}")]
    ArgumentError(String),
    #[error("ConfigurationError: {0}")]
    ConfigurationError(#[from] LoadConfigurationError),
    #[error("SetupLoggerError: {0}")]
    SetupLoggerError(#[from] LoggerError),
    #[error("EntsoeSetupError: {0}")]
    EntsoeSetupError(#[from] EntsoeError),
    #[error("EleringSetupError: {0}")]
    EleringSetupError(#[from] EleringError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn query_needs_a_mode() {
        assert!(query_args(&args(&["spot_hours", "--config=c.toml", "--hours=3"])).is_none());
    }

    #[test]
    fn collects_query_arguments() {
        let q = query_args(&args(&["spot_hours", "--mode=LowestPrices", "--hours=3", "--off-peak=0.02", "--peak=0.04"])).unwrap();
        assert_eq!(q.mode, "LowestPrices");
        assert_eq!(q.hours.as_deref(), Some("3"));
        assert_eq!(q.peak.as_deref(), Some("0.04"));
        assert_eq!(q.off_peak.as_deref(), Some("0.02"));
        assert!(q.start.is_none());
    }
}
