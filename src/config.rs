use std::fs;
use chrono_tz::Tz;
use log::LevelFilter;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use crate::query::SelectionStrategy;

#[derive(Deserialize)]
pub struct General {
    pub log_path: String,
    pub log_level: LevelFilter,
    pub log_to_stdout: bool,
}

#[derive(Deserialize)]
pub struct MarketParameters {
    pub time_zone: Tz,
    pub vat_factor: Decimal,
    pub publication_hour: u32,
}

/// Upstream providers prices can be fetched from
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Entsoe,
    Elering,
}

#[derive(Deserialize)]
pub struct ProviderParameters {
    pub source: PriceSource,
    #[serde(default)]
    pub entsoe_token: String,
    #[serde(default)]
    pub entsoe_domain: String,
    #[serde(default)]
    pub elering_area: String,
    pub retries: u32,
}

#[derive(Deserialize)]
pub struct QueryParameters {
    pub strategy: SelectionStrategy,
}

#[derive(Deserialize)]
pub struct Files {
    pub cache_file: String,
}

#[derive(Deserialize)]
pub struct Config {
    pub general: General,
    pub market: MarketParameters,
    pub provider: ProviderParameters,
    pub query: QueryParameters,
    pub files: Files,
}

/// Loads the configuration file and returns a struct with all configuration items
///
/// # Arguments
///
/// * 'config_path' - path to the configuration file
pub fn load_config(config_path: &str) -> Result<Config, LoadConfigurationError> {
    let toml = fs::read_to_string(config_path)
        .map_err(|e| LoadConfigurationError::Read(format!("{}: {}", config_path, e)))?;
    let config: Config = toml::from_str(&toml)?;

    if config.market.publication_hour > 23 {
        return Err(LoadConfigurationError::Value(format!("publication_hour {} is not an hour of the day", config.market.publication_hour)));
    }
    if config.provider.source == PriceSource::Entsoe && config.provider.entsoe_token.is_empty() {
        return Err(LoadConfigurationError::Value("entsoe_token is required for the entsoe source".to_string()));
    }

    Ok(config)
}

/// Error depicting errors that occur while loading the configuration
///
#[derive(Debug, Error)]
pub enum LoadConfigurationError {
    #[error("ReadError: {0}")]
    Read(String),
    #[error("ParseError: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("ValueError: {0}")]
    Value(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Helsinki;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [general]
        log_path = "/tmp/spot_hours.log"
        log_level = "info"
        log_to_stdout = true

        [market]
        time_zone = "Europe/Helsinki"
        vat_factor = 1.24
        publication_hour = 14

        [provider]
        source = "elering"
        elering_area = "fi"
        retries = 3

        [query]
        strategy = "quarter_hour"

        [files]
        cache_file = "/tmp/spot_hours.json"
    "#;

    #[test]
    fn parses_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.general.log_level, LevelFilter::Info);
        assert_eq!(config.market.time_zone, Helsinki);
        assert_eq!(config.market.vat_factor, dec!(1.24));
        assert_eq!(config.provider.source, PriceSource::Elering);
        assert!(config.provider.entsoe_token.is_empty());
        assert_eq!(config.query.strategy, SelectionStrategy::QuarterHour);
    }
}
