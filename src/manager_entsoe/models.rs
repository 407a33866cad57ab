use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct PublicationMarketDocument {
    #[serde(rename = "TimeSeries", default)]
    pub time_series: Vec<TimeSeries>,
}

#[derive(Deserialize, Debug)]
pub struct TimeSeries {
    #[serde(rename = "Period", default)]
    pub periods: Vec<Period>,
}

#[derive(Deserialize, Debug)]
pub struct Period {
    #[serde(rename = "timeInterval")]
    pub time_interval: TimeInterval,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(rename = "Point", default)]
    pub points: Vec<Point>,
}

#[derive(Deserialize, Debug)]
pub struct TimeInterval {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Point {
    pub position: u32,
    #[serde(rename = "price.amount")]
    pub price_amount: String,
}
