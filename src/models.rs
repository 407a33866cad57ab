use std::collections::HashMap;
use chrono::{DateTime, Datelike, Timelike};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// One hourly spot price, VAT and unit already applied
#[derive(Clone, PartialEq, Debug)]
pub struct PriceRow {
    pub start: DateTime<Tz>,
    pub price: Decimal,
}

/// A price row decorated with the transfer fee that applies to its hour
#[derive(Clone, PartialEq, Debug)]
pub struct PriceRowWithTransfer {
    pub start: DateTime<Tz>,
    pub price: Decimal,
    pub price_with_transfer: Option<Decimal>,
}

impl PriceRowWithTransfer {
    /// The price used when ranking rows against each other
    ///
    pub fn selection_price(&self) -> Decimal {
        self.price_with_transfer.unwrap_or(self.price)
    }
}

/// Peak and off-peak transfer fees to add on top of the spot price
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct TransferPrices {
    pub peak_transfer: Decimal,
    pub off_peak_transfer: Decimal,
}

/// Snapshot of the price cache, one bucket per local day
#[derive(Clone, Default, Debug)]
pub struct SpotPriceSeries {
    pub yesterday: Vec<PriceRow>,
    pub today: Vec<PriceRow>,
    pub tomorrow: Vec<PriceRow>,
}

impl SpotPriceSeries {
    /// Returns all rows, yesterday first
    ///
    pub fn flatten(&self) -> Vec<PriceRow> {
        self.yesterday.iter()
            .chain(self.today.iter())
            .chain(self.tomorrow.iter())
            .cloned()
            .collect()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct SelectionInfo {
    pub now: bool,
    pub min: Decimal,
    pub max: Decimal,
    pub avg: Decimal,
}

/// Answer to a price query
///
/// An empty `hours` list is the unavailable answer. It serializes as `{"hours":[]}` and both
/// `{"hours":[]}` and `{"hours":{}}` are read back as unavailable.
#[derive(Clone, PartialEq, Serialize, Deserialize, Debug)]
pub struct QuerySelection {
    #[serde(deserialize_with = "hours_or_empty_map")]
    pub hours: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<SelectionInfo>,
}

impl QuerySelection {
    pub fn unavailable() -> QuerySelection {
        QuerySelection { hours: Vec::new(), info: None }
    }

    pub fn is_unavailable(&self) -> bool {
        self.hours.is_empty()
    }
}

/// Formats the label used for an hour in query answers, e.g. `3 Tue`
///
/// # Arguments
///
/// * 'date_time' - any time within the hour
pub fn hour_label(date_time: &DateTime<Tz>) -> String {
    format!("{} {}", date_time.hour(), date_time.weekday())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HoursRepr {
    List(Vec<String>),
    Map(HashMap<String, String>),
}

fn hours_or_empty_map<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match HoursRepr::deserialize(deserializer)? {
        HoursRepr::List(hours) => Ok(hours),
        HoursRepr::Map(map) if map.is_empty() => Ok(Vec::new()),
        HoursRepr::Map(_) => Err(serde::de::Error::custom("hours must be a list")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Europe::Helsinki;
    use rust_decimal_macros::dec;

    #[test]
    fn label_uses_local_hour_and_short_weekday() {
        let dt = Helsinki.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(hour_label(&dt), "3 Tue");
    }

    #[test]
    fn unavailable_serializes_without_info() {
        let json = serde_json::to_string(&QuerySelection::unavailable()).unwrap();
        assert_eq!(json, r#"{"hours":[]}"#);
    }

    #[test]
    fn both_unavailable_shapes_are_accepted() {
        let list: QuerySelection = serde_json::from_str(r#"{"hours":[]}"#).unwrap();
        let map: QuerySelection = serde_json::from_str(r#"{"hours":{}}"#).unwrap();
        assert!(list.is_unavailable());
        assert_eq!(list, map);
    }

    #[test]
    fn selection_price_falls_back_to_price() {
        let start = Helsinki.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        let plain = PriceRowWithTransfer { start, price: dec!(0.1), price_with_transfer: None };
        let adjusted = PriceRowWithTransfer { start, price: dec!(0.1), price_with_transfer: Some(dec!(0.15)) };
        assert_eq!(plain.selection_price(), dec!(0.1));
        assert_eq!(adjusted.selection_price(), dec!(0.15));
    }
}
