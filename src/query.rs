use std::fmt;
use std::fmt::Formatter;
use std::str::FromStr;
use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use crate::errors::QueryError;
use crate::models::{hour_label, PriceRowWithTransfer, QuerySelection, SelectionInfo, SpotPriceSeries, TransferPrices};
use crate::normalizer::round_price;
use crate::transfer;

/// Available selection modes
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    LowestPrices,
    HighestPrices,
    WeightedPrices,
    LowestAverage,
    HighestAverage,
    AboveAveragePrices,
}

impl Mode {
    /// Whether the mode selects a fixed number of hours
    pub fn needs_window_length(&self) -> bool {
        !matches!(self, Mode::AboveAveragePrices)
    }
}

impl FromStr for Mode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LowestPrices" => Ok(Mode::LowestPrices),
            "HighestPrices" => Ok(Mode::HighestPrices),
            "WeightedPrices" => Ok(Mode::WeightedPrices),
            "LowestAverage" => Ok(Mode::LowestAverage),
            "HighestAverage" => Ok(Mode::HighestAverage),
            "AboveAveragePrices" => Ok(Mode::AboveAveragePrices),
            _ => Err(QueryError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Mode::LowestPrices => write!(f, "LowestPrices"),
            Mode::HighestPrices => write!(f, "HighestPrices"),
            Mode::WeightedPrices => write!(f, "WeightedPrices"),
            Mode::LowestAverage => write!(f, "LowestAverage"),
            Mode::HighestAverage => write!(f, "HighestAverage"),
            Mode::AboveAveragePrices => write!(f, "AboveAveragePrices"),
        }
    }
}

/// Slot granularity the engine selects in
#[derive(Clone, Copy, PartialEq, Eq, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// One slot per hour, integer weights
    Hourly,
    /// Four slots per hour, weights decaying from 10
    QuarterHour,
}

impl SelectionStrategy {
    pub fn slots_per_hour(&self) -> u32 {
        match self {
            SelectionStrategy::Hourly => 1,
            SelectionStrategy::QuarterHour => 4,
        }
    }

    fn slot_length(&self) -> TimeDelta {
        TimeDelta::minutes(60 / self.slots_per_hour() as i64)
    }

    /// Linearly decaying weights for a window of `num_slots` slots, heaviest first
    ///
    /// # Arguments
    ///
    /// * 'num_slots' - window length in slots
    fn weights(&self, num_slots: usize) -> Vec<Decimal> {
        let n = Decimal::from(num_slots);
        match self {
            SelectionStrategy::Hourly => (0..num_slots)
                .map(|k| Decimal::from(num_slots - k))
                .collect(),
            SelectionStrategy::QuarterHour => (0..num_slots)
                .map(|k| Decimal::TEN * Decimal::from(num_slots - k) / n)
                .collect(),
        }
    }
}

/// A price query against a price series snapshot
#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub number_of_hours: Option<Decimal>,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub mode: Mode,
    pub transfer: Option<TransferPrices>,
}

#[derive(Clone, Debug)]
struct Slot {
    start: DateTime<Tz>,
    hour_start: DateTime<Tz>,
    price: Decimal,
    selection_price: Decimal,
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

impl Extreme {
    fn beats(&self, candidate: Decimal, best: Decimal) -> bool {
        match self {
            Extreme::Min => candidate < best,
            Extreme::Max => candidate > best,
        }
    }
}

/// Selects hour windows from a price series
pub struct QueryEngine {
    strategy: SelectionStrategy,
}

impl QueryEngine {
    /// Returns a new QueryEngine
    ///
    /// # Arguments
    ///
    /// * 'strategy' - the slot granularity to select in
    pub fn new(strategy: SelectionStrategy) -> QueryEngine {
        QueryEngine { strategy }
    }

    /// Answers a price query
    ///
    /// Rows with a start in `[request.start, request.end)` are considered. Windows that don't
    /// fit in the filtered rows give an empty (unavailable) selection rather than an error,
    /// while sliding-window modes over an empty range fail with `NoWindowFound`.
    ///
    /// # Arguments
    ///
    /// * 'series' - snapshot of the cached prices
    /// * 'request' - what to select
    /// * 'now' - current time, used to flag whether the current hour is selected
    pub fn get_hours(&self, series: &SpotPriceSeries, request: &QueryRequest, now: &DateTime<Tz>) -> Result<QuerySelection, QueryError> {
        let rows = series.flatten()
            .into_iter()
            .filter(|r| r.start >= request.start && r.start < request.end)
            .collect::<Vec<_>>();
        let adjusted = transfer::adjust(&rows, request.transfer.as_ref());
        let slots = self.slots(&adjusted);

        let selected = match request.mode {
            Mode::LowestPrices => top_slots(slots, self.num_slots(request)?, Extreme::Min),
            Mode::HighestPrices => top_slots(slots, self.num_slots(request)?, Extreme::Max),
            Mode::WeightedPrices => {
                let weights = self.strategy.weights(self.num_slots(request)?);
                best_window(slots, &weights, Extreme::Min)?
            }
            Mode::LowestAverage => {
                let weights = vec![Decimal::ONE; self.num_slots(request)?];
                best_window(slots, &weights, Extreme::Min)?
            }
            Mode::HighestAverage => {
                let weights = vec![Decimal::ONE; self.num_slots(request)?];
                best_window(slots, &weights, Extreme::Max)?
            }
            Mode::AboveAveragePrices => above_average(slots),
        };

        Ok(summarize(&selected, now))
    }

    /// Converts the requested number of hours into a whole, positive number of slots
    fn num_slots(&self, request: &QueryRequest) -> Result<usize, QueryError> {
        let hours = request.number_of_hours
            .ok_or(QueryError::InvalidWindowSize(format!("{} needs a number of hours", request.mode)))?;
        let slots = hours * Decimal::from(self.strategy.slots_per_hour());

        if slots <= Decimal::ZERO || !slots.fract().is_zero() {
            return Err(QueryError::InvalidWindowSize(format!("{} hours is not a whole number of slots", hours)));
        }

        slots.to_usize()
            .ok_or(QueryError::InvalidWindowSize(format!("{} hours is out of range", hours)))
    }

    /// Splits hourly rows into the strategy's slots
    fn slots(&self, rows: &[PriceRowWithTransfer]) -> Vec<Slot> {
        let length = self.strategy.slot_length();

        rows.iter()
            .flat_map(|r| {
                (0..self.strategy.slots_per_hour()).map(move |i| Slot {
                    start: r.start + length * i as i32,
                    hour_start: r.start,
                    price: r.price,
                    selection_price: r.selection_price(),
                })
            })
            .collect()
    }
}

/// Picks the `count` cheapest (or dearest) slots, equal prices in chronological order
fn top_slots(mut slots: Vec<Slot>, count: usize, extreme: Extreme) -> Vec<Slot> {
    match extreme {
        Extreme::Min => slots.sort_by(|a, b| a.selection_price.cmp(&b.selection_price)),
        Extreme::Max => slots.sort_by(|a, b| b.selection_price.cmp(&a.selection_price)),
    }
    slots.truncate(count);
    slots.sort_by(|a, b| a.start.cmp(&b.start));

    slots
}

/// Slides a weighted window over the slots and returns the one with the extreme score.
/// The earliest window wins ties. Too few slots give an empty selection, no slots at all
/// give `NoWindowFound`.
fn best_window(slots: Vec<Slot>, weights: &[Decimal], extreme: Extreme) -> Result<Vec<Slot>, QueryError> {
    if !slots.is_empty() && slots.len() < weights.len() {
        return Ok(Vec::new());
    }

    let (index, _) = slots
        .windows(weights.len())
        .map(|w| w.iter().zip(weights).map(|(s, k)| s.selection_price * k).sum::<Decimal>())
        .enumerate()
        .fold(None, |best: Option<(usize, Decimal)>, (i, score)| match best {
            Some((_, best_score)) if !extreme.beats(score, best_score) => best,
            _ => Some((i, score)),
        })
        .ok_or(QueryError::NoWindowFound)?;

    Ok(slots[index..index + weights.len()].to_vec())
}

/// Keeps the slots priced above the average of all slots
fn above_average(slots: Vec<Slot>) -> Vec<Slot> {
    if slots.is_empty() {
        return slots;
    }
    let avg = slots.iter().map(|s| s.selection_price).sum::<Decimal>() / Decimal::from(slots.len());

    slots.into_iter().filter(|s| s.selection_price > avg).collect()
}

/// Builds the query answer from chronologically ordered slots
fn summarize(selected: &[Slot], now: &DateTime<Tz>) -> QuerySelection {
    if selected.is_empty() {
        return QuerySelection::unavailable();
    }

    let mut hours: Vec<String> = Vec::new();
    let mut last_hour: Option<DateTime<Tz>> = None;
    for s in selected {
        if last_hour != Some(s.hour_start) {
            hours.push(hour_label(&s.hour_start));
            last_hour = Some(s.hour_start);
        }
    }

    let min = selected.iter().map(|s| s.price).min().unwrap_or_default();
    let max = selected.iter().map(|s| s.price).max().unwrap_or_default();
    let sum = selected.iter().map(|s| s.price).sum::<Decimal>();
    let avg = round_price(sum / Decimal::from(selected.len()));
    let now = hours.contains(&hour_label(now));

    QuerySelection { hours, info: Some(SelectionInfo { now, min, max, avg }) }
}
