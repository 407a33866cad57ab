use chrono::{DateTime, Timelike};
use chrono_tz::Tz;
use crate::models::{PriceRow, PriceRowWithTransfer, TransferPrices};

/// Local hour when the peak tariff starts
const PEAK_START_HOUR: u32 = 7;
/// Local hour when the off-peak tariff starts
const OFF_PEAK_START_HOUR: u32 = 22;

/// Tells whether an hour falls in the off-peak tariff period, 22:00 - 06:59 local time
///
/// # Arguments
///
/// * 'start' - start of the hour
pub fn is_off_peak(start: &DateTime<Tz>) -> bool {
    let hour = start.hour();
    hour >= OFF_PEAK_START_HOUR || hour < PEAK_START_HOUR
}

/// Decorates rows with transfer adjusted prices
///
/// Without transfer prices the rows keep their plain price as selection price.
///
/// # Arguments
///
/// * 'rows' - the rows inside the query window
/// * 'transfer' - optional peak/off-peak transfer fees
pub fn adjust(rows: &[PriceRow], transfer: Option<&TransferPrices>) -> Vec<PriceRowWithTransfer> {
    rows.iter()
        .map(|r| PriceRowWithTransfer {
            start: r.start,
            price: r.price,
            price_with_transfer: transfer.map(|t| {
                if is_off_peak(&r.start) {
                    r.price + t.off_peak_transfer
                } else {
                    r.price + t.peak_transfer
                }
            }),
        })
        .collect()
}
