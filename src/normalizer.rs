use std::collections::HashMap;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;
use crate::models::PriceRow;

/// Decimal places kept in stored prices and averages
pub const PRICE_DECIMALS: u32 = 5;

/// Upstream prices are quoted per MWh, rows carry prices per kWh
const MWH_TO_KWH: Decimal = Decimal::ONE_THOUSAND;

/// Turns raw upstream (timestamp, price) pairs into price rows in the market time zone
pub struct Normalizer {
    time_zone: Tz,
    vat_factor: Decimal,
}

impl Normalizer {
    /// Returns a new Normalizer
    ///
    /// # Arguments
    ///
    /// * 'time_zone' - the market time zone rows are expressed in
    /// * 'vat_factor' - multiplier applied to non-negative prices, e.g. 1.24
    pub fn new(time_zone: Tz, vat_factor: Decimal) -> Normalizer {
        Normalizer { time_zone, vat_factor }
    }

    /// Normalizes one upstream price
    ///
    /// The timestamp is truncated to the start of its hour. Prices are converted from per MWh to
    /// per kWh, VAT is added to non-negative prices only, and the result is rounded to
    /// five decimals.
    ///
    /// # Arguments
    ///
    /// * 'timestamp' - start of the delivery period
    /// * 'raw_price' - spot price per MWh excluding VAT
    pub fn normalize(&self, timestamp: DateTime<Utc>, raw_price: Decimal) -> Result<PriceRow, NormalizeError> {
        let start = timestamp
            .duration_trunc(TimeDelta::hours(1))
            .map_err(|e| NormalizeError::Timestamp(format!("{}: {}", timestamp, e)))?
            .with_timezone(&self.time_zone);

        Ok(PriceRow { start, price: self.price(raw_price) })
    }

    /// Normalizes a set of possibly sub-hourly prices into hourly rows
    ///
    /// Entries falling into the same hour are averaged before VAT and rounding are applied. The
    /// result is sorted by start time.
    ///
    /// # Arguments
    ///
    /// * 'entries' - (delivery start, price per MWh) pairs in any order
    pub fn hourly_rows(&self, entries: &[(DateTime<Utc>, Decimal)]) -> Result<Vec<PriceRow>, NormalizeError> {
        let mut map: HashMap<DateTime<Utc>, (Decimal, Decimal)> = HashMap::new();

        for (timestamp, raw_price) in entries {
            let hour = timestamp
                .duration_trunc(TimeDelta::hours(1))
                .map_err(|e| NormalizeError::Timestamp(format!("{}: {}", timestamp, e)))?;
            map
                .entry(hour)
                .and_modify(|v| { v.0 += *raw_price; v.1 += Decimal::ONE; })
                .or_insert((*raw_price, Decimal::ONE));
        }

        let mut rows = map
            .into_iter()
            .map(|(hour, (sum, count))| self.normalize(hour, sum / count))
            .collect::<Result<Vec<PriceRow>, NormalizeError>>()?;
        rows.sort_by(|a, b| a.start.cmp(&b.start));

        Ok(rows)
    }

    fn price(&self, raw_price: Decimal) -> Decimal {
        let per_kwh = raw_price / MWH_TO_KWH;
        let with_vat = if per_kwh.is_sign_negative() { per_kwh } else { per_kwh * self.vat_factor };

        round_price(with_vat)
    }
}

/// Rounds a price to the stored precision
///
/// # Arguments
///
/// * 'price' - the price to round
pub fn round_price(price: Decimal) -> Decimal {
    price.round_dp_with_strategy(PRICE_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("TimestampError: {0}")]
    Timestamp(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use chrono_tz::Europe::Helsinki;
    use rust_decimal_macros::dec;

    fn normalizer() -> Normalizer {
        Normalizer::new(Helsinki, dec!(1.24))
    }

    #[test]
    fn applies_vat_and_unit_conversion() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let row = normalizer().normalize(ts, dec!(50.00)).unwrap();
        assert_eq!(row.price, dec!(0.062));
        assert_eq!(row.start.hour(), 12);
    }

    #[test]
    fn negative_prices_skip_vat() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let row = normalizer().normalize(ts, dec!(-2.86)).unwrap();
        assert_eq!(row.price, dec!(-0.00286));
    }

    #[test]
    fn rounds_to_five_decimals() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let row = normalizer().normalize(ts, dec!(12.345)).unwrap();
        // 0.012345 * 1.24 = 0.0153078
        assert_eq!(row.price, dec!(0.01531));
    }

    #[test]
    fn truncates_to_the_hour() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 10, 45, 12).unwrap();
        let row = normalizer().normalize(ts, dec!(10)).unwrap();
        assert_eq!(row.start, Helsinki.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap());
    }

    #[test]
    fn averages_quarter_hours_into_hours() {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        let entries: Vec<(DateTime<Utc>, Decimal)> = [dec!(10), dec!(20), dec!(30), dec!(40), dec!(100)]
            .into_iter()
            .enumerate()
            .map(|(i, p)| (base + TimeDelta::minutes(15 * i as i64), p))
            .collect();

        let rows = normalizer().hourly_rows(&entries).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, dec!(0.031));
        assert_eq!(rows[1].price, dec!(0.124));
        assert!(rows[0].start < rows[1].start);
    }
}
