use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use crate::models::PriceRow;

/// Minimum rows for a day bucket to count as complete; a spring forward day has 23 hours
pub const MIN_DAY_ROWS: usize = 23;

/// Returns the start and end (non-inclusive) of a local day.
/// For DST switch days (summer to winter time and vice versa), the length of the day
/// will be either 23 hours (in the spring) or 25 hours (in the autumn).
///
/// # Arguments
///
/// * 'date_time' - date time whose local day the offset is counted from
/// * 'offset_days' - 0 is the same day, -1 is yesterday, 1 is tomorrow, etc.
pub fn day_bounds(date_time: &DateTime<Tz>, offset_days: i64) -> (DateTime<Tz>, DateTime<Tz>) {
    let date = shift_date(date_time.date_naive(), offset_days);
    let tz = date_time.timezone();

    (start_of_day(&tz, date), start_of_day(&tz, shift_date(date, 1)))
}

/// Picks out the rows belonging to one local day
///
/// # Arguments
///
/// * 'rows' - flat price rows in any order
/// * 'now' - the reference time, in the market time zone
/// * 'offset_days' - 0 is today, -1 is yesterday, 1 is tomorrow
pub fn select_day(rows: &[PriceRow], now: &DateTime<Tz>, offset_days: i64) -> Vec<PriceRow> {
    let (start, end) = day_bounds(now, offset_days);

    rows.iter()
        .filter(|r| r.start >= start && r.start < end)
        .cloned()
        .collect()
}

/// Tells whether a day bucket holds enough rows to be queried
///
/// # Arguments
///
/// * 'bucket' - rows of one local day
pub fn is_complete(bucket: &[PriceRow]) -> bool {
    bucket.len() >= MIN_DAY_ROWS
}

fn shift_date(date: NaiveDate, offset_days: i64) -> NaiveDate {
    let shifted = if offset_days >= 0 {
        date.checked_add_days(Days::new(offset_days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(offset_days.unsigned_abs()))
    };

    shifted.unwrap_or(date)
}

/// First existing instant of a local date. A few zones switch DST at midnight, so the
/// wall clock may jump past 00:00; the first valid hour after it is used then.
fn start_of_day(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    (0..3)
        .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
        .find_map(|t| tz.from_local_datetime(&date.and_time(t)).earliest())
        .unwrap_or_else(|| tz.from_utc_datetime(&date.and_time(NaiveTime::default())))
}
