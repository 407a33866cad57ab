use anyhow::Result;
use chrono::Utc;
use log::{error, info};
use crate::initialization::init;
use crate::worker::{answer, refresh};

mod cache;
mod config;
mod day_window;
mod errors;
mod initialization;
mod logging;
mod macros;
mod manager_elering;
mod manager_entsoe;
pub mod models;
mod normalizer;
mod query;
mod transfer;
mod worker;

fn main() -> Result<()> {
    // Load config and set up all managers. If initialization fails, we are pretty much out of luck
    // and can't even log.
    let (config, mgr, query) = init()?;

    let now = Utc::now().with_timezone(&config.market.time_zone);

    // Make sure the snapshot covers today, fetching from upstream if needed
    let series = match refresh(&config, &mgr, &now) {
        Ok(series) => series,
        Err(e) => {
            error!("Refresh failed: {}", e);
            return Err(e)?;
        }
    };
    info!("Prices available: yesterday {}, today {}, tomorrow {}",
        series.yesterday.len(), series.today.len(), series.tomorrow.len());

    if let Some(query) = query {
        let selection = answer(&mgr.engine, &series, &query, &now);
        if selection.is_unavailable() {
            info!("No hours selected for {:?}", query);
        }
        println!("{}", serde_json::to_string(&selection)?);
    }

    Ok(())
}
